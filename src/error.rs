//! Error types for RepoGraph.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepoGraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Root path does not exist: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RepoGraphError>;
