//! Read-only access to a finalized store.

use crate::types::{
    FORMAT_VERSION, RunAttributes, RunId, SAMPLE_BYTES, Sample, StoreManifest,
};
use crate::{StoreError, StoreResult};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

pub(crate) const MANIFEST_FILE: &str = "manifest.json";
pub(crate) const LOCK_FILE: &str = "writer.lock";
pub(crate) const RUNS_DIR: &str = "runs";
pub(crate) const ATTRIBUTES_FILE: &str = "attributes.json";
pub(crate) const SERIES_DIR: &str = "series";

pub(crate) fn run_dir(root_dir: &Path, run_id: &str) -> PathBuf {
    root_dir.join(RUNS_DIR).join(run_id)
}

pub(crate) fn series_path(root_dir: &Path, run_id: &str, variable_index: usize) -> PathBuf {
    run_dir(root_dir, run_id)
        .join(SERIES_DIR)
        .join(format!("{variable_index}.bin"))
}

#[derive(Clone, Debug)]
pub struct RunStore {
    root_dir: PathBuf,
    manifest: StoreManifest,
}

impl RunStore {
    /// Open a store for reading. Fails while a writer still holds it.
    pub fn open(root_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let root_dir = root_dir.into();
        if !root_dir.is_dir() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no store at {}", root_dir.display()),
            )));
        }
        if root_dir.join(LOCK_FILE).exists() {
            return Err(StoreError::Locked { path: root_dir });
        }

        let manifest_path = root_dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(StoreError::NotFinalized { path: root_dir });
        }

        let content = fs::read_to_string(&manifest_path)?;
        let manifest: StoreManifest = serde_json::from_str(&content)?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(StoreError::Corrupt {
                path: manifest_path,
                message: format!(
                    "unsupported format version {} (expected {})",
                    manifest.format_version, FORMAT_VERSION
                ),
            });
        }

        tracing::debug!(
            store = %root_dir.display(),
            runs = manifest.runs.len(),
            "opened store"
        );
        Ok(Self { root_dir, manifest })
    }

    pub fn path(&self) -> &Path {
        &self.root_dir
    }

    pub fn manifest(&self) -> &StoreManifest {
        &self.manifest
    }

    /// Run ids in the order the runs were created.
    pub fn run_ids(&self) -> &[RunId] {
        &self.manifest.runs
    }

    pub fn run_count(&self) -> usize {
        self.manifest.runs.len()
    }

    pub fn variables(&self) -> &[String] {
        &self.manifest.variables
    }

    pub fn has_run(&self, run_id: &str) -> bool {
        self.manifest.runs.iter().any(|id| id == run_id)
    }

    fn ensure_run(&self, run_id: &str) -> StoreResult<()> {
        if self.has_run(run_id) {
            Ok(())
        } else {
            Err(StoreError::RunNotFound {
                run_id: run_id.to_string(),
            })
        }
    }

    fn variable_index(&self, variable: &str) -> StoreResult<usize> {
        self.manifest
            .variables
            .iter()
            .position(|v| v == variable)
            .ok_or_else(|| StoreError::VariableNotFound {
                variable: variable.to_string(),
            })
    }

    pub fn attributes(&self, run_id: &str) -> StoreResult<RunAttributes> {
        self.ensure_run(run_id)?;
        let path = run_dir(&self.root_dir, run_id).join(ATTRIBUTES_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::StructuralMismatch {
                    run_id: run_id.to_string(),
                    message: "attributes file is missing".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let attributes: RunAttributes = serde_json::from_str(&content)?;

        if attributes.run_id != run_id {
            return Err(StoreError::StructuralMismatch {
                run_id: run_id.to_string(),
                message: format!("attributes belong to run {}", attributes.run_id),
            });
        }
        if attributes.variables != self.manifest.variables {
            return Err(StoreError::StructuralMismatch {
                run_id: run_id.to_string(),
                message: format!(
                    "variables {:?} differ from store variables {:?}",
                    attributes.variables, self.manifest.variables
                ),
            });
        }
        Ok(attributes)
    }

    fn open_series(&self, run_id: &str, variable: &str) -> StoreResult<(File, usize)> {
        self.ensure_run(run_id)?;
        let index = self.variable_index(variable)?;
        let path = series_path(&self.root_dir, run_id, index);

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::StructuralMismatch {
                    run_id: run_id.to_string(),
                    message: format!("series for {variable} is missing"),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata()?.len() as usize;
        if len % SAMPLE_BYTES != 0 {
            return Err(StoreError::Corrupt {
                path,
                message: format!("length {len} is not a multiple of {SAMPLE_BYTES}"),
            });
        }
        Ok((file, len / SAMPLE_BYTES))
    }

    /// Number of samples recorded for one variable of one run.
    pub fn series_len(&self, run_id: &str, variable: &str) -> StoreResult<usize> {
        let (_, count) = self.open_series(run_id, variable)?;
        Ok(count)
    }

    /// Full series, in append order.
    pub fn series(&self, run_id: &str, variable: &str) -> StoreResult<Vec<Sample>> {
        let (mut file, count) = self.open_series(run_id, variable)?;
        let mut bytes = Vec::with_capacity(count * SAMPLE_BYTES);
        file.read_to_end(&mut bytes)?;

        Ok(bytes
            .chunks_exact(SAMPLE_BYTES)
            .map(|chunk| {
                let mut buf = [0u8; SAMPLE_BYTES];
                buf.copy_from_slice(chunk);
                Sample::from_bytes(buf)
            })
            .collect())
    }

    /// Random access to the `index`-th sample (0-based) without reading the series.
    pub fn sample_at(&self, run_id: &str, variable: &str, index: usize) -> StoreResult<Sample> {
        let (mut file, count) = self.open_series(run_id, variable)?;
        if index >= count {
            return Err(StoreError::InsufficientSamples {
                run_id: run_id.to_string(),
                variable: variable.to_string(),
                needed: index + 1,
                available: count,
            });
        }

        file.seek(SeekFrom::Start((index * SAMPLE_BYTES) as u64))?;
        let mut buf = [0u8; SAMPLE_BYTES];
        file.read_exact(&mut buf)?;
        Ok(Sample::from_bytes(buf))
    }

    /// Attributes and every series of a run, series in store variable order.
    ///
    /// All series of a run grow together, so differing lengths are reported
    /// as a structural mismatch.
    pub fn read_run(
        &self,
        run_id: &str,
    ) -> StoreResult<(RunAttributes, Vec<(String, Vec<Sample>)>)> {
        let attributes = self.attributes(run_id)?;
        let mut out = Vec::with_capacity(attributes.variables.len());
        for variable in &attributes.variables {
            out.push((variable.clone(), self.series(run_id, variable)?));
        }

        if let Some((first_var, first)) = out.first()
            && let Some((var, series)) = out.iter().find(|(_, s)| s.len() != first.len())
        {
            return Err(StoreError::StructuralMismatch {
                run_id: run_id.to_string(),
                message: format!(
                    "{var} has {} samples but {first_var} has {}",
                    series.len(),
                    first.len()
                ),
            });
        }
        Ok((attributes, out))
    }
}
