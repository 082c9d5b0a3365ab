//! Subprocess execution: process groups, output capture, timeouts.

mod group;
mod runner;
mod timeout;

pub use group::{KillSignal, ProcessHandle};
pub use runner::ProcessRunner;
pub use timeout::TimeoutWatcher;
