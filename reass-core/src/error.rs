#![forbid(unsafe_code)]

//! Common error type for the reassembly crates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReassError {
    /// I/O related failures.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parsing failures.
    #[error("Config parse error: {0}")]
    ConfigParse(toml::de::Error),

    /// Filesystem watch errors.
    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    /// Configuration values that parse but cannot be used.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Convenient alias for results throughout the reassembly crates.
pub type ReassResult<T> = Result<T, ReassError>;
