//! Heatmap summary of a store and per-run drill-down.

use rayon::prelude::*;
use serde::Serialize;
use sv_core::{ColorRamp, ColorbarEntry, GridLayout, Rgb, plan};
use sv_store::{Attribute, RunStore, Sample};

use crate::error::{AppError, AppResult};

/// Sample (0-based) whose value colours a run's tile.
pub const REPRESENTATIVE_SAMPLE_INDEX: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapCell {
    pub row: usize,
    pub column: usize,
    pub run_id: String,
    pub value: f64,
    pub color: Rgb,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeatmapSummary {
    pub variable: String,
    pub layout: GridLayout,
    /// Filled tiles only, row-major.
    pub cells: Vec<HeatmapCell>,
    pub min: f64,
    pub max: f64,
    /// All runs share one value; every tile is the palette's bottom colour.
    pub degenerate: bool,
}

impl HeatmapSummary {
    /// Row view of the tiles, `None` for padding.
    pub fn grid(&self) -> Vec<Vec<Option<&HeatmapCell>>> {
        let columns = self.layout.column_count();
        let mut grid = vec![vec![None; columns]; self.layout.row_count()];
        for cell in &self.cells {
            grid[cell.row][cell.column] = Some(cell);
        }
        grid
    }

    /// Tile selection: the run shown at `(row, column)`, if any.
    pub fn cell_at(&self, row: usize, column: usize) -> Option<&HeatmapCell> {
        self.cells
            .iter()
            .find(|c| c.row == row && c.column == column)
    }

    pub fn colorbar(&self, ramp: &ColorRamp) -> AppResult<Vec<ColorbarEntry>> {
        if self.degenerate {
            return Ok(vec![ColorbarEntry {
                value: self.min,
                color: ramp.bottom(),
            }]);
        }
        Ok(ramp.colorbar(self.min, self.max)?)
    }
}

fn normalize_variable(variable_path: &str) -> &str {
    variable_path.trim_start_matches('/')
}

/// Variables available for colouring the heatmap.
pub fn list_variables(store: &RunStore) -> Vec<String> {
    store.variables().to_vec()
}

/// Colour one tile per run by the run's representative sample of `variable_path`.
///
/// Runs are placed in store order, which is the order they were created in.
pub fn build_summary(
    store: &RunStore,
    variable_path: &str,
    ramp: &ColorRamp,
) -> AppResult<HeatmapSummary> {
    let variable = normalize_variable(variable_path);
    if !store.variables().iter().any(|v| v == variable) {
        return Err(AppError::VariableNotFound(variable.to_string()));
    }

    let run_ids = store.run_ids();
    if run_ids.is_empty() {
        return Err(AppError::EmptyInput(format!(
            "store {} has no runs",
            store.path().display()
        )));
    }

    tracing::info!(variable, runs = run_ids.len(), "building heatmap summary");

    let reads: Vec<_> = run_ids
        .par_iter()
        .map(|run_id| store.sample_at(run_id, variable, REPRESENTATIVE_SAMPLE_INDEX))
        .collect();

    // report the first failing run in store order
    let mut values = Vec::with_capacity(reads.len());
    for (run_id, read) in run_ids.iter().zip(reads) {
        let sample = read?;
        if !sample.value.is_finite() {
            return Err(AppError::InvalidInput(format!(
                "run {run_id} has non-finite {variable} value {}",
                sample.value
            )));
        }
        values.push(sample.value);
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let degenerate = min == max;
    if degenerate {
        tracing::debug!(variable, value = min, "degenerate range; flattening colours");
    }

    let layout = plan(values.len())?;
    let mut cells = Vec::with_capacity(values.len());
    for slot in layout.slots() {
        let Some(item) = slot.item else { continue };
        let value = values[item];
        let color = if degenerate {
            ramp.bottom()
        } else {
            ramp.color(value, min, max)?
        };
        cells.push(HeatmapCell {
            row: slot.row,
            column: slot.column,
            run_id: run_ids[item].clone(),
            value,
            color,
        });
    }

    Ok(HeatmapSummary {
        variable: variable.to_string(),
        layout,
        cells,
        min,
        max,
        degenerate,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesData {
    pub variable: String,
    pub samples: Vec<Sample>,
}

/// Everything recorded for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunDetail {
    pub run_id: String,
    pub attributes: Vec<Attribute>,
    /// In store variable order.
    pub series: Vec<SeriesData>,
}

impl RunDetail {
    pub fn series(&self, variable: &str) -> Option<&[Sample]> {
        let variable = normalize_variable(variable);
        self.series
            .iter()
            .find(|s| s.variable == variable)
            .map(|s| s.samples.as_slice())
    }

    /// Samples per series.
    pub fn sample_count(&self) -> usize {
        self.series.first().map(|s| s.samples.len()).unwrap_or(0)
    }

    /// `name: value` lines, one per attribute.
    pub fn attribute_text(&self) -> String {
        self.attributes
            .iter()
            .map(|a| format!("{}: {}\n", a.name, a.value))
            .collect()
    }
}

/// Every series of `run_id`, unmodified and in append order.
pub fn drill_down(store: &RunStore, run_id: &str) -> AppResult<RunDetail> {
    if !store.has_run(run_id) {
        return Err(AppError::RunNotFound(run_id.to_string()));
    }

    let (attributes, series) = store.read_run(run_id)?;
    let series = series
        .into_iter()
        .map(|(variable, samples)| SeriesData { variable, samples })
        .collect();

    tracing::debug!(run_id, "loaded run detail");
    Ok(RunDetail {
        run_id: run_id.to_string(),
        attributes: attributes.attributes,
        series,
    })
}
