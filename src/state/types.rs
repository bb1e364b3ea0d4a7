use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Cancelled,
    Completed,
    /// The job never got to process a file (encoder missing).
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Cancelled | JobStatus::Completed | JobStatus::Failed
        )
    }
}

/// Immutable view of conversion progress.
///
/// A new value replaces the previous one on every update; readers never
/// see a partially applied change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: Option<Uuid>,
    pub job_status: JobStatus,
    pub is_running: bool,
    /// Whole-job progress in `[0, 1]`.
    pub overall_progress: f64,
    /// Progress of the current file; `None` while its duration is unknown.
    pub file_progress: Option<f64>,
    pub current_file_index: usize,
    pub current_file_name: String,
    pub total_files: usize,
    pub status_message: String,
    pub current_processing_time: String,
    pub total_video_duration: String,
    pub conversion_speed: String,
    pub converted_files: Vec<PathBuf>,
}

impl ProgressSnapshot {
    /// Clear the fields that only describe the file in flight.
    pub fn clear_file_fields(&mut self) {
        self.file_progress = None;
        self.current_file_name.clear();
        self.current_processing_time.clear();
        self.total_video_duration.clear();
        self.conversion_speed.clear();
    }
}
