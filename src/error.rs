//! Error types for the signing agent client

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Unexpected status {status} for {method} {url}")]
    Status {
        method: String,
        url: String,
        status: u16,
    },

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
