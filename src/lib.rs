pub mod analysis;
pub mod analyzers;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod ctu;
pub mod error;
pub mod exit;
pub mod logging;
pub mod metadata;
pub mod pool;
pub mod pre_analysis;
pub mod process;
pub mod progress;
pub mod skiplist;
pub mod stats;
pub mod types;
