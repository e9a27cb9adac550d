//! Configuration error type shared by the workspace

use thiserror::Error;

/// Errors raised while loading gateway configuration
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid setting; the message names the key
    #[error("Configuration error: {0}")]
    Config(String),

    /// Config or secret file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias over the configuration [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
