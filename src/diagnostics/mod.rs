//! Append-only diagnostics log.
//!
//! Every encoder output line, parsed progress event and lifecycle
//! transition is recorded as a [`DiagnosticEntry`]. The most recent entries
//! are kept in memory for viewers, and each one is also emitted as a
//! `tracing` event on [`TARGET`]. The binary routes that target through
//! [`file_layer`] into a `tracing-appender` file, one JSON object per line,
//! which [`read_tail`] reads back.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, Layer, Registry};
use uuid::Uuid;

use crate::config::{DiagnosticsConfig, LogRotation};

/// Tracing target carrying diagnostics entries.
pub const TARGET: &str = "pocketforge::diagnostics::entry";

/// What an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Raw line from the encoder.
    EncoderOutput,
    /// Event extracted by the progress parser.
    ProgressEvent,
    /// Job or file state transition.
    Lifecycle,
    /// Per-file or job-level failure.
    Error,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::EncoderOutput => "encoder_output",
            EntryKind::ProgressEvent => "progress_event",
            EntryKind::Lifecycle => "lifecycle",
            EntryKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_index: Option<usize>,
    pub message: String,
}

macro_rules! emit {
    ($level:expr, $entry:expr) => {
        tracing::event!(
            target: TARGET,
            $level,
            kind = $entry.kind.as_str(),
            job_id = $entry.job_id.as_ref().map(tracing::field::display),
            file_index = $entry.file_index,
            "{}",
            $entry.message
        )
    };
}

/// Bounded in-memory log.
pub struct Diagnostics {
    max_entries: usize,
    entries: RwLock<VecDeque<DiagnosticEntry>>,
}

impl Diagnostics {
    pub fn new(config: &DiagnosticsConfig) -> Self {
        Self::with_capacity(config.max_entries)
    }

    /// Keep at most `max_entries` in memory.
    pub fn with_capacity(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            max_entries,
            entries: RwLock::new(VecDeque::with_capacity(max_entries.min(4096))),
        }
    }

    pub fn append(
        &self,
        kind: EntryKind,
        job_id: Option<Uuid>,
        file_index: Option<usize>,
        message: impl Into<String>,
    ) {
        let entry = DiagnosticEntry {
            timestamp: Utc::now(),
            kind,
            job_id,
            file_index,
            message: message.into(),
        };

        match kind {
            EntryKind::EncoderOutput => emit!(tracing::Level::TRACE, entry),
            EntryKind::ProgressEvent => emit!(tracing::Level::DEBUG, entry),
            EntryKind::Lifecycle => emit!(tracing::Level::INFO, entry),
            EntryKind::Error => emit!(tracing::Level::WARN, entry),
        }

        let mut entries = self.entries.write();
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// The `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<DiagnosticEntry> {
        let entries = self.entries.read();
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop the in-memory entries. The log file is left alone.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

/// Directory, file name prefix and extension of the configured log path.
fn split_log_path(path: &Path) -> Option<(PathBuf, String, Option<String>)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    let prefix = path.file_stem()?.to_string_lossy().into_owned();
    let suffix = path
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned());
    Some((dir, prefix, suffix))
}

/// Non-blocking writer for the configured log file, or `None` when
/// diagnostics stay in memory. The guard flushes pending lines on drop and
/// must outlive every event that should reach the file.
pub fn log_writer(config: &DiagnosticsConfig) -> Result<Option<(NonBlocking, WorkerGuard)>> {
    let Some(path) = &config.log_path else {
        return Ok(None);
    };
    let (dir, prefix, suffix) = split_log_path(path)
        .with_context(|| format!("Diagnostics log path {:?} has no file name", path))?;

    let rotation = match config.rotation {
        LogRotation::Never => Rotation::NEVER,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(prefix);
    if let Some(suffix) = suffix {
        builder = builder.filename_suffix(suffix);
    }
    if config.rotation != LogRotation::Never {
        builder = builder.max_log_files(config.max_log_files.max(1));
    }

    let appender = builder
        .build(&dir)
        .with_context(|| format!("Failed to open diagnostics log in {:?}", dir))?;
    Ok(Some(tracing_appender::non_blocking(appender)))
}

/// JSON layer writing only [`TARGET`] events, at every level, to `writer`.
/// It sits directly on the registry; other layers stack above it.
pub fn file_layer(writer: NonBlocking) -> impl Layer<Registry> {
    fmt::layer()
        .json()
        .flatten_event(true)
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(Targets::new().with_target(TARGET, tracing::Level::TRACE))
}

/// Log files written for `path`, oldest first. Rotated files carry a date
/// between the stem and the extension, which sorts chronologically.
pub fn log_files(path: &Path) -> io::Result<Vec<PathBuf>> {
    let Some((dir, prefix, suffix)) = split_log_path(path) else {
        return Ok(Vec::new());
    };
    let plain = match &suffix {
        Some(ext) => format!("{prefix}.{ext}"),
        None => prefix.clone(),
    };
    let dated_start = format!("{prefix}.");
    let dated_end = suffix.as_ref().map(|ext| format!(".{ext}"));

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let dated = name.starts_with(&dated_start)
            && dated_end.as_ref().map_or(true, |end| name.ends_with(end.as_str()));
        if (name == plain || dated) && entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Read the last `n` entries logged for `path`, across rotated files,
/// skipping lines that do not parse.
pub fn read_tail(path: &Path, n: usize) -> io::Result<Vec<DiagnosticEntry>> {
    let files = log_files(path)?;
    if files.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no diagnostics log at {}", path.display()),
        ));
    }

    if n == 0 {
        return Ok(Vec::new());
    }

    let mut entries = VecDeque::with_capacity(n.min(4096));
    for file in files {
        let content = std::fs::read_to_string(&file)?;
        for line in content.lines() {
            // Lines are flattened events; `level` and `target` are ignored.
            if let Ok(entry) = serde_json::from_str::<DiagnosticEntry>(line) {
                if entries.len() == n {
                    entries.pop_front();
                }
                entries.push_back(entry);
            }
        }
    }
    Ok(entries.into())
}
