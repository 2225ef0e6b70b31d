//! sv-store: per-run columnar storage for simulation sweeps.

use std::path::PathBuf;

pub mod hash;
pub mod store;
pub mod types;
pub mod writer;

pub use hash::digest;
pub use store::RunStore;
pub use types::*;
pub use writer::{StoreWriter, WriterOptions};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Run already exists: {run_id}")]
    RunExists { run_id: String },

    #[error("Variable not found: {variable}")]
    VariableNotFound { variable: String },

    #[error("Invalid run id: {run_id:?}")]
    InvalidRunId { run_id: String },

    #[error(
        "Run {run_id} has {available} samples of {variable}, sample #{needed} requested"
    )]
    InsufficientSamples {
        run_id: String,
        variable: String,
        needed: usize,
        available: usize,
    },

    #[error("Store inconsistency in run {run_id}: {message}")]
    StructuralMismatch { run_id: String, message: String },

    #[error("Schema cannot change after {runs} runs were written")]
    SchemaFixed { runs: usize },

    #[error("Corrupt store file {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Store already exists: {path}")]
    AlreadyExists { path: PathBuf },

    #[error("Store is locked by a writer: {path}")]
    Locked { path: PathBuf },

    #[error("Store was never finalized: {path}")]
    NotFinalized { path: PathBuf },
}
