//! Exclusive, append-only store writer.
//!
//! A writer owns the store directory from `create` until `finish` or
//! `discard`; a `writer.lock` file marks the store as unreadable meanwhile.
//! Each series grows by appending one fixed-size record, earlier records are
//! never rewritten.

use crate::store::{
    ATTRIBUTES_FILE, LOCK_FILE, MANIFEST_FILE, RUNS_DIR, SERIES_DIR, run_dir, series_path,
};
use crate::types::{
    Attribute, FORMAT_VERSION, RunAttributes, RunId, Sample, StoreManifest, StoreSchema,
    is_valid_run_id,
};
use crate::{StoreError, StoreResult};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Upper bound on runs whose series files are kept open at once.
    pub max_open_runs: usize,
    /// Replace an existing finalized store at the target path.
    pub overwrite: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            max_open_runs: 64,
            overwrite: false,
        }
    }
}

struct OpenRun {
    series: Vec<BufWriter<File>>,
    last_used: u64,
}

impl OpenRun {
    fn flush(&mut self) -> io::Result<()> {
        for writer in &mut self.series {
            writer.flush()?;
        }
        Ok(())
    }
}

pub struct StoreWriter {
    root_dir: PathBuf,
    source_file: String,
    schema: StoreSchema,
    options: WriterOptions,
    runs: Vec<RunId>,
    known: HashSet<RunId>,
    open: HashMap<RunId, OpenRun>,
    clock: u64,
    finished: bool,
}

impl StoreWriter {
    pub fn create(
        root_dir: impl Into<PathBuf>,
        source_file: impl Into<String>,
        schema: StoreSchema,
        options: WriterOptions,
    ) -> StoreResult<Self> {
        let root_dir = root_dir.into();
        prepare_root(&root_dir, options.overwrite)?;

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(root_dir.join(LOCK_FILE))
        {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::Locked { path: root_dir });
            }
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = fs::create_dir_all(root_dir.join(RUNS_DIR)) {
            remove_partial(&root_dir);
            return Err(e.into());
        }

        tracing::debug!(store = %root_dir.display(), "store writer created");
        Ok(Self {
            root_dir,
            source_file: source_file.into(),
            schema,
            options,
            runs: Vec::new(),
            known: HashSet::new(),
            open: HashMap::new(),
            clock: 0,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root_dir
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    /// Replace the column layout. Only allowed before the first run exists.
    pub fn set_schema(&mut self, schema: StoreSchema) -> StoreResult<()> {
        if !self.runs.is_empty() {
            return Err(StoreError::SchemaFixed {
                runs: self.runs.len(),
            });
        }
        self.schema = schema;
        Ok(())
    }

    pub fn has_run(&self, run_id: &str) -> bool {
        self.known.contains(run_id)
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Create a run with its fixed attributes and the first sample of every variable.
    pub fn create_run(
        &mut self,
        run_id: &str,
        attributes: Vec<Attribute>,
        tick: i64,
        values: &[f64],
    ) -> StoreResult<()> {
        if !is_valid_run_id(run_id) {
            return Err(StoreError::InvalidRunId {
                run_id: run_id.to_string(),
            });
        }
        if self.known.contains(run_id) {
            return Err(StoreError::RunExists {
                run_id: run_id.to_string(),
            });
        }
        self.check_width(run_id, values)?;

        let dir = run_dir(&self.root_dir, run_id);
        fs::create_dir_all(dir.join(SERIES_DIR))?;

        let record = RunAttributes {
            run_id: run_id.to_string(),
            attributes,
            variables: self.schema.variables.clone(),
        };
        fs::write(
            dir.join(ATTRIBUTES_FILE),
            serde_json::to_string_pretty(&record)?,
        )?;

        let mut series = Vec::with_capacity(values.len());
        for index in 0..values.len() {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(series_path(&self.root_dir, run_id, index))?;
            series.push(BufWriter::new(file));
        }

        self.make_room()?;
        self.clock += 1;
        let mut handle = OpenRun {
            series,
            last_used: self.clock,
        };
        write_samples(&mut handle, tick, values)?;
        self.open.insert(run_id.to_string(), handle);

        self.runs.push(run_id.to_string());
        self.known.insert(run_id.to_string());
        tracing::debug!(run_id, "created run");
        Ok(())
    }

    /// Append one `(tick, value)` record to every series of an existing run.
    pub fn append(&mut self, run_id: &str, tick: i64, values: &[f64]) -> StoreResult<()> {
        if !self.known.contains(run_id) {
            return Err(StoreError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        self.check_width(run_id, values)?;

        if !self.open.contains_key(run_id) {
            let handle = self.reopen(run_id)?;
            self.make_room()?;
            self.open.insert(run_id.to_string(), handle);
        }

        self.clock += 1;
        let clock = self.clock;
        let handle = self
            .open
            .get_mut(run_id)
            .ok_or_else(|| StoreError::RunNotFound {
                run_id: run_id.to_string(),
            })?;
        handle.last_used = clock;
        write_samples(handle, tick, values)?;
        Ok(())
    }

    /// Flush everything, write the manifest and release the lock.
    ///
    /// If finalizing fails the partial store is removed.
    pub fn finish(mut self, rows_consumed: usize) -> StoreResult<StoreManifest> {
        match self.finalize(rows_consumed) {
            Ok(manifest) => Ok(manifest),
            Err(err) => {
                self.open.clear();
                self.finished = true;
                remove_partial(&self.root_dir);
                Err(err)
            }
        }
    }

    fn finalize(&mut self, rows_consumed: usize) -> StoreResult<StoreManifest> {
        for handle in self.open.values_mut() {
            handle.flush()?;
        }
        self.open.clear();

        let manifest = StoreManifest {
            format_version: FORMAT_VERSION,
            source_file: self.source_file.clone(),
            attribute_names: self.schema.attribute_names.clone(),
            variables: self.schema.variables.clone(),
            runs: std::mem::take(&mut self.runs),
            rows_consumed,
        };
        fs::write(
            self.root_dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?,
        )?;
        fs::remove_file(self.root_dir.join(LOCK_FILE))?;
        self.finished = true;

        tracing::debug!(
            store = %self.root_dir.display(),
            runs = manifest.runs.len(),
            "store finalized"
        );
        Ok(manifest)
    }

    /// Drop everything written so far, including the store directory.
    pub fn discard(mut self) -> StoreResult<()> {
        self.open.clear();
        self.finished = true;
        fs::remove_dir_all(&self.root_dir)?;
        Ok(())
    }

    fn check_width(&self, run_id: &str, values: &[f64]) -> StoreResult<()> {
        if values.len() != self.schema.variables.len() {
            return Err(StoreError::StructuralMismatch {
                run_id: run_id.to_string(),
                message: format!(
                    "{} values for {} variables",
                    values.len(),
                    self.schema.variables.len()
                ),
            });
        }
        Ok(())
    }

    fn reopen(&self, run_id: &str) -> StoreResult<OpenRun> {
        let mut series = Vec::with_capacity(self.schema.variables.len());
        for index in 0..self.schema.variables.len() {
            let file = OpenOptions::new()
                .append(true)
                .open(series_path(&self.root_dir, run_id, index))?;
            series.push(BufWriter::new(file));
        }
        Ok(OpenRun {
            series,
            last_used: self.clock,
        })
    }

    /// Close the least recently used run if the handle budget is spent.
    fn make_room(&mut self) -> StoreResult<()> {
        let budget = self.options.max_open_runs.max(1);
        while self.open.len() >= budget {
            let Some(oldest) = self
                .open
                .iter()
                .min_by_key(|(_, h)| h.last_used)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            if let Some(mut handle) = self.open.remove(&oldest) {
                handle.flush()?;
                tracing::debug!(run_id = %oldest, "closed idle run");
            }
        }
        Ok(())
    }
}

impl Drop for StoreWriter {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                store = %self.root_dir.display(),
                "store writer dropped before finish; store stays locked"
            );
        }
    }
}

fn write_samples(handle: &mut OpenRun, tick: i64, values: &[f64]) -> io::Result<()> {
    for (writer, &value) in handle.series.iter_mut().zip(values) {
        writer.write_all(&Sample::new(tick, value).to_bytes())?;
    }
    Ok(())
}

fn remove_partial(root_dir: &Path) {
    if let Err(e) = fs::remove_dir_all(root_dir) {
        tracing::warn!(error = %e, store = %root_dir.display(), "could not remove partial store");
    }
}

/// Make sure `root_dir` is free for a new store.
fn prepare_root(root_dir: &Path, overwrite: bool) -> StoreResult<()> {
    if !root_dir.exists() {
        fs::create_dir_all(root_dir)?;
        return Ok(());
    }
    if root_dir.join(LOCK_FILE).exists() {
        return Err(StoreError::Locked {
            path: root_dir.to_path_buf(),
        });
    }

    let is_store = root_dir.join(MANIFEST_FILE).exists();
    let is_empty = fs::read_dir(root_dir)?.next().is_none();
    if is_empty {
        return Ok(());
    }
    if is_store && overwrite {
        fs::remove_dir_all(root_dir)?;
        fs::create_dir_all(root_dir)?;
        return Ok(());
    }
    Err(StoreError::AlreadyExists {
        path: root_dir.to_path_buf(),
    })
}
