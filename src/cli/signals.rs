//! Operator interrupts.
//!
//! SIGINT and SIGTERM are blocked in every thread and received synchronously
//! on one dedicated thread, which triggers the run's [`Interrupt`]. Analyzer
//! children get a clean signal mask when they are spawned.

use std::io;

use crate::cancel::Interrupt;

/// Starts the signal thread. Must run before any worker thread is spawned so
/// the blocked mask is inherited.
///
/// # Errors
/// Returns error if the signal mask cannot be changed or the thread cannot start.
#[cfg(unix)]
pub fn install(interrupt: Interrupt) -> io::Result<()> {
    use std::thread;

    // SAFETY: the set is initialised by sigemptyset before use and only
    // standard signal numbers are added.
    let set = unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGINT);
        libc::sigaddset(&mut set, libc::SIGTERM);
        let rc = libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
        set
    };

    thread::Builder::new()
        .name("ctupipe-signals".into())
        .spawn(move || loop {
            let mut signal: libc::c_int = 0;
            // SAFETY: `set` is a valid, initialised signal set owned by this thread.
            let rc = unsafe { libc::sigwait(&set, &mut signal) };
            if rc != 0 {
                tracing::debug!("sigwait failed: {}", io::Error::from_raw_os_error(rc));
                return;
            }
            tracing::warn!(signal, "received termination signal");
            interrupt.trigger();
        })?;
    Ok(())
}

#[cfg(not(unix))]
pub fn install(interrupt: Interrupt) -> io::Result<()> {
    drop(interrupt);
    tracing::debug!("signal forwarding is not available on this platform");
    Ok(())
}
