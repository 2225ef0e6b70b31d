//! Background workers.
//!
//! Conversion runs on its own thread and streams progress over a channel
//! that the front end polls. Drill-downs (and summary builds) are one-shot
//! jobs whose single result is handed over exactly once. Neither can be
//! cancelled; dropping a handle abandons the thread.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};

use sv_core::ColorRamp;
use sv_store::RunStore;

use crate::convert::{ConvertOptions, ConvertSummary, TableConverter};
use crate::error::{AppError, AppResult};
use crate::heatmap::{self, HeatmapSummary, RunDetail};
use crate::progress::ConvertProgress;

static WORKER_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn worker_name(kind: &str) -> String {
    format!("sv-{kind}-{}", WORKER_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Clone)]
pub enum WorkerMessage {
    Progress(ConvertProgress),
    Complete(ConvertSummary),
    Failed { message: String },
}

impl WorkerMessage {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerMessage::Progress(_))
    }
}

pub struct ConvertWorker {
    name: String,
    progress_rx: Receiver<WorkerMessage>,
    finished: bool,
    _handle: JoinHandle<()>,
}

impl ConvertWorker {
    pub fn start(
        converter: TableConverter,
        csv_path: &Path,
        store_path: &Path,
        options: ConvertOptions,
    ) -> AppResult<Self> {
        let (tx, rx) = mpsc::channel();
        let csv_path = csv_path.to_path_buf();
        let store_path = store_path.to_path_buf();
        let name = worker_name("convert");

        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let progress_tx = tx.clone();
            let mut on_progress = |event: ConvertProgress| {
                let _ = progress_tx.send(WorkerMessage::Progress(event));
            };
            let message =
                match converter.convert_file(&csv_path, &store_path, &options, Some(&mut on_progress)) {
                    Ok(summary) => WorkerMessage::Complete(summary),
                    Err(e) => WorkerMessage::Failed {
                        message: e.to_string(),
                    },
                };
            let _ = tx.send(message);
        })?;

        tracing::debug!(worker = %name, "conversion worker started");
        Ok(Self {
            name,
            progress_rx: rx,
            finished: false,
            _handle: handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drain pending messages without blocking and return the newest one.
    ///
    /// The completion or failure message is always the last one sent, so it
    /// is never skipped.
    pub fn poll(&mut self) -> Option<WorkerMessage> {
        let mut latest = None;
        loop {
            match self.progress_rx.try_recv() {
                Ok(message) => latest = Some(message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if latest.is_none() && !self.finished {
                        latest = Some(WorkerMessage::Failed {
                            message: format!("{} exited without a result", self.name),
                        });
                    }
                    break;
                }
            }
        }
        if latest.as_ref().is_some_and(WorkerMessage::is_terminal) {
            self.finished = true;
        }
        latest
    }

    /// Block until the conversion ends.
    pub fn wait(mut self) -> AppResult<ConvertSummary> {
        loop {
            let message = self
                .progress_rx
                .recv()
                .map_err(|_| AppError::Worker(format!("{} exited without a result", self.name)))?;
            match message {
                WorkerMessage::Progress(_) => continue,
                WorkerMessage::Complete(summary) => {
                    self.finished = true;
                    return Ok(summary);
                }
                WorkerMessage::Failed { message } => {
                    self.finished = true;
                    return Err(AppError::Worker(message));
                }
            }
        }
    }
}

/// One-shot background job with a single result.
pub struct JobHandle<T> {
    name: String,
    result_rx: Receiver<AppResult<T>>,
    taken: bool,
    _handle: JoinHandle<()>,
}

impl<T> JobHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The result, once it is ready. Yields `Some` at most once.
    pub fn try_take(&mut self) -> Option<AppResult<T>> {
        if self.taken {
            return None;
        }
        match self.result_rx.try_recv() {
            Ok(result) => {
                self.taken = true;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.taken = true;
                Some(Err(AppError::Worker(format!(
                    "{} exited without a result",
                    self.name
                ))))
            }
        }
    }

    pub fn wait(self) -> AppResult<T> {
        if self.taken {
            return Err(AppError::Worker(format!(
                "result of {} was already taken",
                self.name
            )));
        }
        self.result_rx
            .recv()
            .map_err(|_| AppError::Worker(format!("{} exited without a result", self.name)))?
    }
}

pub fn spawn_job<T, F>(kind: &str, job: F) -> AppResult<JobHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> AppResult<T> + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    let name = worker_name(kind);
    let handle = thread::Builder::new().name(name.clone()).spawn(move || {
        let _ = tx.send(job());
    })?;

    tracing::debug!(worker = %name, "job started");
    Ok(JobHandle {
        name,
        result_rx: rx,
        taken: false,
        _handle: handle,
    })
}

/// Read one run in the background. The store is opened read-only inside the job.
pub fn spawn_drill_down(store_path: &Path, run_id: &str) -> AppResult<JobHandle<RunDetail>> {
    let store_path: PathBuf = store_path.to_path_buf();
    let run_id = run_id.to_string();
    spawn_job("drill", move || {
        let store = RunStore::open(&store_path)?;
        heatmap::drill_down(&store, &run_id)
    })
}

pub fn spawn_summary(
    store_path: &Path,
    variable: &str,
    ramp: ColorRamp,
) -> AppResult<JobHandle<HeatmapSummary>> {
    let store_path: PathBuf = store_path.to_path_buf();
    let variable = variable.to_string();
    spawn_job("summary", move || {
        let store = RunStore::open(&store_path)?;
        heatmap::build_summary(&store, &variable, &ramp)
    })
}
