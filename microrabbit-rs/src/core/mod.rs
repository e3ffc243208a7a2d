//! Core: errors, configuration, logging.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{AckMode, BusConfig};
pub use error::{BusError, HandlerError};
pub use logging::{init_tracing, LogFormat};
