//! Error types for the Spring '83 keypair generator

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeygenError>;

#[derive(Error, Debug)]
pub enum KeygenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid {kind} pattern {pattern:?}: {source}")]
    InvalidPattern {
        kind: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Random source failure: {0}")]
    Entropy(String),

    #[error("All {workers} workers stopped before any found a matching key")]
    SearchExhausted { workers: usize },

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

impl From<rand::Error> for KeygenError {
    fn from(err: rand::Error) -> Self {
        KeygenError::Entropy(err.to_string())
    }
}
