//! Error types for tunbridge

use thiserror::Error;

/// Main error type for tunbridge
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Interface error: {0}")]
    Interface(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type alias for tunbridge
pub type Result<T> = std::result::Result<T, Error>;
