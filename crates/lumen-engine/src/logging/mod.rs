//! Logging utilities.
//!
//! Centralizes logger initialization. Library code only uses the `log`
//! facade; binaries call [`init_logging`] once.

mod init;

pub use init::{DEFAULT_FILTER, LoggingConfig, init_logging};
