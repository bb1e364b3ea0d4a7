//! Job and per-file state owned by the conversion worker.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use uuid::Uuid;

use crate::state::JobStatus;

/// One batch conversion request.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub id: Uuid,
    pub inputs: Vec<PathBuf>,
    pub destination: Option<PathBuf>,
    pub status: JobStatus,
    /// Produced files, in input order, one per successful input.
    pub outputs: Vec<PathBuf>,
}

impl ConversionJob {
    pub fn new(inputs: Vec<PathBuf>, destination: Option<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            inputs,
            destination,
            status: JobStatus::Idle,
            outputs: Vec::new(),
        }
    }

    pub fn file_count(&self) -> usize {
        self.inputs.len()
    }

    /// Final status line for a job that ran through its whole queue.
    pub fn summary(&self) -> String {
        let total = self.inputs.len();
        let done = self.outputs.len();
        if done == total {
            format!("All {done} of {total} files converted successfully!")
        } else {
            format!("Conversion completed with {done} of {total} files successful")
        }
    }
}

/// Tracking for the file currently being encoded.
#[derive(Debug, Clone)]
pub struct FileConversionState {
    pub index: usize,
    pub input: PathBuf,
    pub output: PathBuf,
    /// Zero until the encoder reports it.
    pub total_duration_secs: f64,
    pub position_secs: f64,
    pub started_at: Instant,
}

impl FileConversionState {
    pub fn new(index: usize, input: PathBuf, output: PathBuf) -> Self {
        Self {
            index,
            input,
            output,
            total_duration_secs: 0.0,
            position_secs: 0.0,
            started_at: Instant::now(),
        }
    }

    pub fn file_name(&self) -> String {
        display_name(&self.input)
    }

    /// Fraction of this file done, `None` while the duration is unknown.
    pub fn fraction(&self) -> Option<f64> {
        (self.total_duration_secs > 0.0)
            .then(|| (self.position_secs / self.total_duration_secs).clamp(0.0, 1.0))
    }

    /// Media seconds encoded per wall-clock second since launch.
    pub fn speed(&self) -> Option<f64> {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        (elapsed > 0.0 && self.position_secs > 0.0).then(|| self.position_secs / elapsed)
    }
}

/// Why a single file did not produce an output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileFailure {
    #[error("cannot read input file: {0}")]
    InputUnreadable(String),

    #[error("cannot write to output directory: {0}")]
    OutputDirUnwritable(String),

    #[error("failed to run encoder: {0}")]
    SpawnFailed(String),

    #[error("encoder exited with {}", exit_description(*.0))]
    NonZeroExit(Option<i32>),

    #[error("encoder finished but the output file is missing or empty")]
    OutputMissingOrEmpty,
}

fn exit_description(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Result of processing one queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Succeeded(PathBuf),
    Failed(FileFailure),
    TimedOut,
    Cancelled,
}

/// Computes output paths for a job.
///
/// Outputs are `<prefix><stem>.<extension>` in the destination directory,
/// or next to the input when there is none. When two inputs of the same job
/// map to the same path, later ones get `_2`, `_3`, ... appended to the
/// stem. Files already on disk from earlier runs are overwritten.
#[derive(Debug)]
pub struct OutputNamer {
    prefix: String,
    extension: String,
    destination: Option<PathBuf>,
    taken: HashSet<PathBuf>,
}

impl OutputNamer {
    pub fn new(prefix: &str, extension: &str, destination: Option<&Path>) -> Self {
        Self {
            prefix: prefix.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
            destination: destination.map(Path::to_path_buf),
            taken: HashSet::new(),
        }
    }

    pub fn output_for(&mut self, input: &Path) -> PathBuf {
        let dir = match &self.destination {
            Some(dir) => dir.clone(),
            None => input
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());

        let mut candidate = dir.join(format!("{}{}.{}", self.prefix, stem, self.extension));
        let mut n = 2;
        while self.taken.contains(&candidate) {
            candidate = dir.join(format!("{}{}_{}.{}", self.prefix, stem, n, self.extension));
            n += 1;
        }

        self.taken.insert(candidate.clone());
        candidate
    }
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
