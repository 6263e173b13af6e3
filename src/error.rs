use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("invalid workflow name: {0}")]
    InvalidWorkflowName(String),

    #[error("invalid variant name: {0}")]
    InvalidVariantName(String),

    #[error("missing config file simfetch.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("storage request failed: {0}")]
    StorageHttp(String),

    #[error("storage returned status {status}: {message}")]
    StorageStatus { status: u16, message: String },

    #[error("transfer of {path} failed: {message}")]
    Transfer { path: String, message: String },

    #[error("workflow metadata unavailable: {0}")]
    MetadataMissing(String),

    #[error("failed to parse workflow metadata: {0}")]
    MetadataParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
