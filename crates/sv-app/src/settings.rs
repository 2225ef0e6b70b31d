//! User settings, loaded from a YAML file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sv_core::{ColorRamp, Palette};
use sv_store::WriterOptions;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Heatmap palette stops, coldest first, components in `[0, 1]`.
    pub palette: Vec<[f64; 3]>,
    /// Extension given to stores derived from a table path.
    pub store_extension: String,
    /// Runs whose series files stay open during conversion.
    pub max_open_runs: usize,
    /// How often a front end polls a background worker.
    pub poll_interval_ms: u64,
    /// Replace an existing store instead of failing.
    pub overwrite: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            palette: Palette::COLD_TO_HOT.to_vec(),
            store_extension: "svstore".to_string(),
            max_open_runs: WriterOptions::default().max_open_runs,
            poll_interval_ms: 100,
            overwrite: false,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| AppError::SettingsRead {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load_or_default(path: Option<&Path>) -> AppResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        Palette::new(self.palette.clone()).map_err(|e| AppError::Settings(e.to_string()))?;
        if self.store_extension.trim().is_empty() {
            return Err(AppError::Settings(
                "store_extension must not be empty".to_string(),
            ));
        }
        if self.max_open_runs == 0 {
            return Err(AppError::Settings(
                "max_open_runs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ramp(&self) -> AppResult<ColorRamp> {
        let palette =
            Palette::new(self.palette.clone()).map_err(|e| AppError::Settings(e.to_string()))?;
        Ok(ColorRamp::new(palette))
    }

    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            max_open_runs: self.max_open_runs,
            overwrite: self.overwrite,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
