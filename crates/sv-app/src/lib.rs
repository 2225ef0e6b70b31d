//! Shared application service layer for simviz.
//!
//! Converts BehaviorSpace-style sweep tables into a per-run store, builds
//! the tiled heatmap summary of a store and serves per-run drill-downs.
//! The CLI (and any other front end) only talks to this crate.

pub mod convert;
pub mod error;
pub mod heatmap;
pub mod progress;
pub mod settings;
pub mod worker;

pub use convert::{
    ConvertOptions, ConvertSummary, TableConverter, TableLayout, TableRecords, TableSchema,
    VariableColumn, count_rows, default_store_path, ensure_csv_path,
};
pub use error::{AppError, AppResult};
pub use heatmap::{
    HeatmapCell, HeatmapSummary, REPRESENTATIVE_SAMPLE_INDEX, RunDetail, SeriesData,
    build_summary, drill_down, list_variables,
};
pub use progress::{ConvertProgress, ConvertStage};
pub use settings::Settings;
pub use worker::{
    ConvertWorker, JobHandle, WorkerMessage, spawn_drill_down, spawn_job, spawn_summary,
};
