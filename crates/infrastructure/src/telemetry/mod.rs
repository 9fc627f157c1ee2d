//! Logging infrastructure

mod logging;

pub use logging::{LogFormat, LoggingConfig, TelemetryError, init_logging};
