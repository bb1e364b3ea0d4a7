use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pocketforge_av::EncoderBackend;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::job::ConversionJob;
use super::worker::Worker;
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::state::{JobStatus, ProgressSnapshot, SnapshotStore};

/// Errors returned when a job cannot be started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    #[error("no input files given")]
    NoInputFiles,

    #[error("a conversion is already running")]
    AlreadyRunning,
}

/// Handles to the worker of the most recent job.
struct JobHandle {
    id: Uuid,
    cancel: CancellationToken,
    /// Cancelled by the worker when it exits, however it exits.
    finished: CancellationToken,
}

impl JobHandle {
    fn is_active(&self) -> bool {
        !self.finished.is_cancelled()
    }
}

#[derive(Default)]
struct Control {
    /// Bumped on every accepted `start`.
    generation: u64,
    job: Option<JobHandle>,
}

/// State shared between the orchestrator handle and its workers.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) backend: Arc<dyn EncoderBackend>,
    pub(crate) diagnostics: Arc<Diagnostics>,
    pub(crate) store: SnapshotStore,
    control: Mutex<Control>,
}

impl Shared {
    /// After `delay`, apply `clear` to the snapshot unless a newer job has
    /// started in the meantime.
    pub(crate) fn clear_later(
        self: &Arc<Self>,
        generation: u64,
        delay: Duration,
        clear: impl FnOnce(&mut ProgressSnapshot) + Send + 'static,
    ) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.publish_if_current(generation, clear);
        });
    }

    fn publish_if_current(&self, generation: u64, f: impl FnOnce(&mut ProgressSnapshot)) {
        let control = self.control.lock();
        if control.generation == generation {
            self.store.update(f);
        } else {
            tracing::debug!(
                generation,
                current = control.generation,
                "Skipping stale snapshot clear"
            );
        }
    }
}

/// Runs batch conversions one job at a time and publishes their progress.
///
/// Cloning yields another handle to the same orchestrator. [`start`] and
/// [`cancel`] must be called from within a tokio runtime.
///
/// [`start`]: Orchestrator::start
/// [`cancel`]: Orchestrator::cancel
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        backend: Arc<dyn EncoderBackend>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                backend,
                diagnostics,
                store: SnapshotStore::new(),
                control: Mutex::new(Control::default()),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Start converting `inputs`, writing into `destination` or next to each
    /// input. Returns as soon as the worker is spawned.
    pub fn start(
        &self,
        inputs: Vec<PathBuf>,
        destination: Option<PathBuf>,
    ) -> Result<Uuid, ConvertError> {
        if inputs.is_empty() {
            return Err(ConvertError::NoInputFiles);
        }

        let mut control = self.shared.control.lock();
        if let Some(active) = control.job.as_ref().filter(|job| job.is_active()) {
            tracing::debug!(job_id = %active.id, "Rejecting start while a job is running");
            return Err(ConvertError::AlreadyRunning);
        }

        control.generation += 1;
        let job = ConversionJob::new(inputs, destination);
        let handle = JobHandle {
            id: job.id,
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
        };

        tracing::info!(
            job_id = %job.id,
            files = job.file_count(),
            generation = control.generation,
            "Starting conversion job"
        );

        self.shared.store.replace(ProgressSnapshot {
            job_id: Some(job.id),
            job_status: JobStatus::Running,
            is_running: true,
            total_files: job.file_count(),
            status_message: "Checking ffmpeg installation...".to_string(),
            ..ProgressSnapshot::default()
        });

        let job_id = job.id;
        let worker = Worker::new(
            Arc::clone(&self.shared),
            job,
            control.generation,
            handle.cancel.clone(),
            handle.finished.clone(),
        );
        control.job = Some(handle);
        drop(control);

        tokio::spawn(worker.run());
        Ok(job_id)
    }

    /// Cancel the running job and wait until its worker and encoder process
    /// are gone. Does nothing when no job is running.
    pub async fn cancel(&self) {
        let tokens = {
            let control = self.shared.control.lock();
            control
                .job
                .as_ref()
                .filter(|job| job.is_active())
                .map(|job| (job.id, job.cancel.clone(), job.finished.clone()))
        };

        let Some((job_id, cancel, finished)) = tokens else {
            tracing::debug!("Cancel requested with no running job");
            return;
        };

        tracing::info!(job_id = %job_id, "Cancelling conversion job");
        cancel.cancel();
        finished.cancelled().await;
    }

    /// Wait until the current job's worker exits. Returns immediately when
    /// no job is running.
    pub async fn wait(&self) {
        let finished = self
            .shared
            .control
            .lock()
            .job
            .as_ref()
            .map(|job| job.finished.clone());

        if let Some(finished) = finished {
            finished.cancelled().await;
        }
    }

    /// Whether a worker is active. A finished job still showing its summary
    /// does not count.
    pub fn is_running(&self) -> bool {
        self.shared
            .control
            .lock()
            .job
            .as_ref()
            .is_some_and(JobHandle::is_active)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.shared.store.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.shared.store.subscribe()
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.shared.diagnostics
    }
}
