pub mod arch;
pub mod builders;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod fsutil;
pub mod host;
pub mod log;
pub mod log_sanitize;
pub mod metadata;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod workspace;

pub use error::{Error, ErrorKind, Result};
