use std::path::PathBuf;

use thiserror::Error;

/// Main error type for mock-builder operations
#[derive(Error, Debug)]
pub enum MockBuilderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parser error: {0}")]
    Parser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Inheritance cycle detected at {name}")]
    InheritanceCycle { name: String },

    #[error("Graph cache error: {0}")]
    Cache(String),
}

pub type Result<T> = std::result::Result<T, MockBuilderError>;
