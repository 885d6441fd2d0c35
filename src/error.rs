//! Custom error types for the bench library.
//!
//! This module defines the primary error type, `BenchError`, for the entire
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different failure classes that can occur
//! while driving the instruments:
//!
//! - **`Config`** / **`Configuration`**: file-level and semantic settings
//!   problems (bad TOML, invalid endpoint, malformed test matrix entries).
//! - **`Io`**: standard `std::io::Error`, covering socket and file I/O.
//! - **`Connection`**: the instrument is unreachable, the identity query
//!   fails at session creation, or a closed session is reused. Fatal to the
//!   test family being initialized.
//! - **`Timeout`**: a read exceeded the session read timeout. Fatal to the
//!   current operation; never retried.
//! - **`Validation`**: a waveform/setup file name fails the naming grammar.
//!   Fatal at driver construction.
//! - **`Protocol`**: the instrument answered where a number was expected
//!   with something that does not parse. Frequency-critical paths propagate
//!   this; EVM capture degrades it to NaN at the driver.
//! - **`Measurement`**: a read-back is structurally unusable (spur list
//!   count mismatch, short ACLR string). Degrades to an empty/null value
//!   for that measurement only.
//!
//! By using `#[from]`, `BenchError` can be seamlessly created from
//! underlying error types, simplifying error handling throughout the crate
//! with the `?` operator.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type BenchResult<T> = std::result::Result<T, BenchError>;

/// Failure classes raised by the bench core.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Instrument read timed out after {0:?}")]
    Timeout(Duration),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Measurement error: {0}")]
    Measurement(String),

    #[error("Report error: {0}")]
    Report(String),
}
