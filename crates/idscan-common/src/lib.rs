//! # ID Scanner Common
//!
//! Logging configuration shared by the offline proxy crates.
//!
//! Every crate in the workspace logs through `tracing`; binaries call
//! [`init_logging`] once at startup to install a subscriber.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LoggingError};
