use std::path::PathBuf;
use std::time::Duration;

use pocketforge_av::{EncodeProfile, ToolsConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub profile: EncodeProfile,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Prepended to the input's file stem (default: `converted_`).
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "converted_".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

/// Timeouts and the pauses that keep transient status messages readable.
///
/// All values are milliseconds; tests set the pauses to zero.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    /// Hard limit for a single file (default: 5 minutes).
    #[serde(default = "default_file_timeout")]
    pub file_timeout_ms: u64,

    /// How long the finished state stays visible (default: 15s).
    #[serde(default = "default_completion_cooldown")]
    pub completion_cooldown_ms: u64,

    /// How long the "encoder not found" error stays visible (default: 10s).
    #[serde(default = "default_not_found_grace")]
    pub not_found_grace_ms: u64,

    /// Pause after showing the encoder path (default: 2s).
    #[serde(default = "default_found_notice")]
    pub found_notice_ms: u64,

    /// Pause after "Starting conversion..." (default: 1s).
    #[serde(default = "default_start_notice")]
    pub start_notice_ms: u64,

    /// Pause after a file could not be started (default: 2s).
    #[serde(default = "default_failure_notice")]
    pub failure_notice_ms: u64,

    /// How long "Conversion cancelled" stays visible (default: 2s).
    #[serde(default = "default_cancel_notice")]
    pub cancel_notice_ms: u64,
}

fn default_file_timeout() -> u64 {
    300_000
}
fn default_completion_cooldown() -> u64 {
    15_000
}
fn default_not_found_grace() -> u64 {
    10_000
}
fn default_found_notice() -> u64 {
    2_000
}
fn default_start_notice() -> u64 {
    1_000
}
fn default_failure_notice() -> u64 {
    2_000
}
fn default_cancel_notice() -> u64 {
    2_000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            file_timeout_ms: default_file_timeout(),
            completion_cooldown_ms: default_completion_cooldown(),
            not_found_grace_ms: default_not_found_grace(),
            found_notice_ms: default_found_notice(),
            start_notice_ms: default_start_notice(),
            failure_notice_ms: default_failure_notice(),
            cancel_notice_ms: default_cancel_notice(),
        }
    }
}

impl TimingConfig {
    /// No pauses, short timeout. Useful for tests and scripted runs.
    pub fn immediate(file_timeout: Duration) -> Self {
        Self {
            file_timeout_ms: file_timeout.as_millis() as u64,
            completion_cooldown_ms: 0,
            not_found_grace_ms: 0,
            found_notice_ms: 0,
            start_notice_ms: 0,
            failure_notice_ms: 0,
            cancel_notice_ms: 0,
        }
    }

    pub fn file_timeout(&self) -> Duration {
        Duration::from_millis(self.file_timeout_ms)
    }

    pub fn completion_cooldown(&self) -> Duration {
        Duration::from_millis(self.completion_cooldown_ms)
    }

    pub fn not_found_grace(&self) -> Duration {
        Duration::from_millis(self.not_found_grace_ms)
    }

    pub fn found_notice(&self) -> Duration {
        Duration::from_millis(self.found_notice_ms)
    }

    pub fn start_notice(&self) -> Duration {
        Duration::from_millis(self.start_notice_ms)
    }

    pub fn failure_notice(&self) -> Duration {
        Duration::from_millis(self.failure_notice_ms)
    }

    pub fn cancel_notice(&self) -> Duration {
        Duration::from_millis(self.cancel_notice_ms)
    }
}

/// How often the diagnostics log file starts a new file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// A single file at `log_path`.
    #[default]
    Never,
    /// `<stem>.<YYYY-MM-DD-HH>.<ext>` next to `log_path`.
    Hourly,
    /// `<stem>.<YYYY-MM-DD>.<ext>` next to `log_path`.
    Daily,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiagnosticsConfig {
    /// JSON-lines log file; in-memory only when unset.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Entries kept in memory for viewers (default: 1000).
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Rotated files kept on disk before the oldest is deleted (default: 5).
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
}

fn default_max_entries() -> usize {
    1000
}
fn default_max_log_files() -> usize {
    5
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            max_entries: default_max_entries(),
            rotation: LogRotation::default(),
            max_log_files: default_max_log_files(),
        }
    }
}
