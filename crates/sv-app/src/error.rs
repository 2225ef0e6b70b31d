//! Error types for the sv-app service layer.

use std::path::PathBuf;

use sv_core::CoreError;
use sv_store::StoreError;

/// Application error type shared by every front end.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Malformed input at row {row}: {message}")]
    MalformedInput { row: usize, message: String },

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    #[error(
        "Run {run_id} has only {available} samples of {variable}; sample #{needed} is required"
    )]
    InsufficientSamples {
        run_id: String,
        variable: String,
        needed: usize,
        available: usize,
    },

    #[error("Store inconsistency in run {run_id}: {message}")]
    StructuralMismatch { run_id: String, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to read settings file: {path}")]
    SettingsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid settings: {0}")]
    Settings(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Layout error: {0}")]
    Layout(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sv-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::EmptyInput { what } => AppError::EmptyInput(what.to_string()),
            other => AppError::Layout(other.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RunNotFound { run_id } => AppError::RunNotFound(run_id),
            StoreError::VariableNotFound { variable } => AppError::VariableNotFound(variable),
            StoreError::InsufficientSamples {
                run_id,
                variable,
                needed,
                available,
            } => AppError::InsufficientSamples {
                run_id,
                variable,
                needed,
                available,
            },
            StoreError::StructuralMismatch { run_id, message } => {
                AppError::StructuralMismatch { run_id, message }
            }
            StoreError::Io(e) => AppError::Io(e),
            other => AppError::Store(other.to_string()),
        }
    }
}
