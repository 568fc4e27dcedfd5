//! Error types for lightning operations

use serde::Serialize;
use std::path::PathBuf;

/// Structured error payload printed by the CLI in `--json` mode.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LightningError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No lightning data directory at {}. Run 'lightning init' first.", .0.display())]
    NotInitialized(PathBuf),

    #[error("Config already exists at {}", .0.display())]
    ConfigExists(PathBuf),

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Glob pattern error: {0}")]
    GlobPattern(String),

    #[error("Schema version mismatch: database is v{found}, expected v{expected}. Delete the index and run 'lightning index' again.")]
    SchemaVersionMismatch { found: i32, expected: i32 },

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl LightningError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Io(_) => "io",
            Self::NotInitialized(_) => "not_initialized",
            Self::ConfigExists(_) => "config_exists",
            Self::ConfigParse(_) => "config_parse",
            Self::GlobPattern(_) => "glob_pattern",
            Self::SchemaVersionMismatch { .. } => "schema_mismatch",
            Self::TaskFailed(_) => "task_failed",
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::new(self.code(), self.to_string())
    }
}

impl From<tokio::task::JoinError> for LightningError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskFailed(err.to_string())
    }
}
