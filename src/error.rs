//! Error types for propcov

use thiserror::Error;

/// Result type for propcov operations
pub type Result<T> = std::result::Result<T, PropcovError>;

/// Errors that can occur while extracting per-test properties
#[derive(Error, Debug)]
pub enum PropcovError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The source file could not be turned into a usable AST
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Analysis started without the state it needs, or a setting is invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No front-end for source file: {0}")]
    UnsupportedLanguage(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}
