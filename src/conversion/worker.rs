//! The task that runs one job to completion.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pocketforge_av::{EncoderProcess, ProgressEvent, ProgressParser};
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use super::job::{display_name, ConversionJob, FileConversionState, FileFailure, FileOutcome, OutputNamer};
use super::orchestrator::Shared;
use crate::diagnostics::EntryKind;
use crate::state::{format_clock, format_speed, JobStatus};

const NOT_FOUND_MESSAGE: &str =
    "ERROR: ffmpeg not found. Install it with 'brew install ffmpeg' or your package manager";
const CANCELLED_MESSAGE: &str = "Conversion cancelled";

/// What woke the per-file select loop.
enum Step<T> {
    Ready(T),
    Cancelled,
    TimedOut,
}

pub(crate) struct Worker {
    shared: Arc<Shared>,
    job: ConversionJob,
    generation: u64,
    cancel: CancellationToken,
    /// Highest overall progress published so far.
    overall: f64,
    _finished: DropGuard,
}

impl Worker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        job: ConversionJob,
        generation: u64,
        cancel: CancellationToken,
        finished: CancellationToken,
    ) -> Self {
        Self {
            shared,
            job,
            generation,
            cancel,
            overall: 0.0,
            _finished: finished.drop_guard(),
        }
    }

    pub(crate) async fn run(mut self) {
        self.job.status = JobStatus::Running;
        self.lifecycle(
            None,
            format!("Job started with {} file(s)", self.job.file_count()),
        );

        let encoder = match self.shared.backend.locate() {
            Ok(path) => path,
            Err(e) => {
                self.error(None, e.to_string());
                self.finish_not_found();
                return;
            }
        };

        self.lifecycle(None, format!("Using encoder {}", encoder.display()));
        self.publish_message(format!("Found ffmpeg at: {}", encoder.display()));
        if !self.pause(self.shared.config.timing.found_notice()).await {
            self.finish_cancelled();
            return;
        }

        self.publish_message("Starting conversion...");
        if !self.pause(self.shared.config.timing.start_notice()).await {
            self.finish_cancelled();
            return;
        }

        let mut namer = OutputNamer::new(
            &self.shared.config.output.prefix,
            &self.shared.config.profile.extension,
            self.job.destination.as_deref(),
        );
        let count = self.job.file_count();

        for index in 0..count {
            let outcome = self.convert_file(index, &encoder, &mut namer).await;
            let name = display_name(&self.job.inputs[index]);

            match outcome {
                FileOutcome::Cancelled => {
                    self.finish_cancelled();
                    return;
                }
                FileOutcome::Succeeded(output) => {
                    let message = format!("Successfully converted {name}");
                    self.lifecycle(Some(index), format!("{message}: {}", output.display()));
                    self.job.outputs.push(output);
                    let outputs = self.job.outputs.clone();
                    self.shared.store.update(|s| {
                        s.converted_files = outputs;
                        s.status_message = message;
                    });
                }
                FileOutcome::Failed(failure) => {
                    self.error(Some(index), format!("{name}: {failure}"));
                    self.publish_message(format!("Error converting {name}: {failure}"));
                    if !self.pause(self.shared.config.timing.failure_notice()).await {
                        self.finish_cancelled();
                        return;
                    }
                }
                FileOutcome::TimedOut => {
                    let limit = self.shared.config.timing.file_timeout();
                    self.error(
                        Some(index),
                        format!("{name}: timed out after {}", format_clock(limit.as_secs_f64())),
                    );
                    self.publish_message(format!("Conversion timed out for {name}"));
                    if !self.pause(self.shared.config.timing.failure_notice()).await {
                        self.finish_cancelled();
                        return;
                    }
                }
            }

            self.overall = self.overall.max((index + 1) as f64 / count as f64);
            let overall = self.overall;
            let done = index + 1;
            self.shared.store.update(|s| {
                s.overall_progress = overall;
                if done < count {
                    s.status_message =
                        format!("Completed {done} of {count} files. Moving to next...");
                }
            });
        }

        self.finish_completed();
    }

    async fn convert_file(
        &mut self,
        index: usize,
        encoder: &Path,
        namer: &mut OutputNamer,
    ) -> FileOutcome {
        let count = self.job.file_count();
        let input = self.job.inputs[index].clone();
        let output = namer.output_for(&input);
        let mut file = FileConversionState::new(index, input, output);

        let name = file.file_name();
        self.shared.store.update(|s| {
            s.clear_file_fields();
            s.current_file_index = index;
            s.current_file_name = name;
            s.status_message = format!("Converting file {} of {count}...", index + 1);
        });
        self.lifecycle(
            Some(index),
            format!("Converting {} -> {}", file.input.display(), file.output.display()),
        );

        if let Err(failure) = check_input(&file.input).await {
            return FileOutcome::Failed(failure);
        }
        if let Err(failure) = prepare_output_dir(&file.output).await {
            return FileOutcome::Failed(failure);
        }

        let args = self
            .shared
            .config
            .profile
            .build_arguments(&file.input, &file.output);
        let mut process = match self.shared.backend.spawn(encoder, &args).await {
            Ok(process) => process,
            Err(e) => return FileOutcome::Failed(FileFailure::SpawnFailed(e.to_string())),
        };
        file.started_at = Instant::now();

        let mut parser = ProgressParser::new();
        let cancel = self.cancel.clone();
        let deadline = tokio::time::sleep(self.shared.config.timing.file_timeout());
        tokio::pin!(deadline);

        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                _ = &mut deadline => Step::TimedOut,
                line = process.next_line() => Step::Ready(line),
            };

            match step {
                Step::Ready(Some(line)) => {
                    self.shared.diagnostics.append(
                        EntryKind::EncoderOutput,
                        Some(self.job.id),
                        Some(index),
                        line.as_str(),
                    );
                    for event in parser.feed_line(&line) {
                        self.apply_event(&mut file, event);
                    }
                }
                Step::Ready(None) => break,
                Step::Cancelled => {
                    self.kill(process.as_mut(), index).await;
                    return FileOutcome::Cancelled;
                }
                Step::TimedOut => {
                    self.kill(process.as_mut(), index).await;
                    return FileOutcome::TimedOut;
                }
            }
        }

        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Cancelled,
            _ = &mut deadline => Step::TimedOut,
            status = process.wait() => Step::Ready(status),
        };

        let code = match step {
            Step::Ready(Ok(code)) => code,
            Step::Ready(Err(e)) => {
                self.error(Some(index), format!("Failed to reap encoder: {e}"));
                None
            }
            Step::Cancelled => {
                self.kill(process.as_mut(), index).await;
                return FileOutcome::Cancelled;
            }
            Step::TimedOut => {
                self.kill(process.as_mut(), index).await;
                return FileOutcome::TimedOut;
            }
        };

        for event in parser.finish(code) {
            self.apply_event(&mut file, event);
        }

        if code != Some(0) {
            return FileOutcome::Failed(FileFailure::NonZeroExit(code));
        }

        match tokio::fs::metadata(&file.output).await {
            Ok(meta) if meta.len() > 0 => FileOutcome::Succeeded(file.output),
            _ => FileOutcome::Failed(FileFailure::OutputMissingOrEmpty),
        }
    }

    fn apply_event(&mut self, file: &mut FileConversionState, event: ProgressEvent) {
        let index = file.index;
        match event {
            ProgressEvent::DurationDiscovered(total) => {
                self.progress(index, format!("duration {total:.2}s"));
                file.total_duration_secs = total;
                let total_text = format_clock(total);
                self.shared
                    .store
                    .update(|s| s.total_video_duration = total_text);
            }
            ProgressEvent::PositionAdvanced(position) => {
                self.progress(index, format!("position {position:.2}s"));
                file.position_secs = position;

                let fraction = file.fraction();
                if let Some(fraction) = fraction {
                    let count = self.job.file_count() as f64;
                    self.overall = self.overall.max((index as f64 + fraction) / count);
                }

                let overall = self.overall;
                let processing = format_clock(position);
                let speed = file.speed().map(format_speed);
                self.shared.store.update(|s| {
                    s.file_progress = fraction;
                    s.overall_progress = overall;
                    s.current_processing_time = processing;
                    if let Some(speed) = speed {
                        s.conversion_speed = speed;
                    }
                });
            }
            ProgressEvent::ProcessExited { code } => {
                let text = match code {
                    Some(code) => format!("encoder exited with code {code}"),
                    None => "encoder terminated by signal".to_string(),
                };
                self.progress(index, text);
            }
        }
    }

    async fn kill(&self, process: &mut dyn EncoderProcess, index: usize) {
        match process.kill().await {
            Ok(()) => self.lifecycle(Some(index), "Encoder process killed"),
            Err(e) => self.error(Some(index), format!("Failed to kill encoder: {e}")),
        }
    }

    /// Sleep for `delay` unless cancelled first. Returns `false` on cancel.
    async fn pause(&self, delay: Duration) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if delay.is_zero() {
            return true;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn finish_not_found(&mut self) {
        self.job.status = JobStatus::Failed;
        self.shared.store.update(|s| {
            s.job_status = JobStatus::Failed;
            s.status_message = NOT_FOUND_MESSAGE.to_string();
        });
        self.shared.clear_later(
            self.generation,
            self.shared.config.timing.not_found_grace(),
            |s| {
                s.is_running = false;
                s.status_message.clear();
            },
        );
    }

    fn finish_cancelled(&mut self) {
        self.job.status = JobStatus::Cancelled;
        self.lifecycle(
            None,
            format!(
                "Job cancelled after {} of {} file(s)",
                self.job.outputs.len(),
                self.job.file_count()
            ),
        );
        self.shared.store.update(|s| {
            s.job_status = JobStatus::Cancelled;
            s.is_running = false;
            s.overall_progress = 0.0;
            s.current_file_index = 0;
            s.clear_file_fields();
            s.status_message = CANCELLED_MESSAGE.to_string();
        });
        self.shared.clear_later(
            self.generation,
            self.shared.config.timing.cancel_notice(),
            |s| s.status_message.clear(),
        );
    }

    fn finish_completed(&mut self) {
        self.job.status = JobStatus::Completed;
        let summary = self.job.summary();
        self.lifecycle(None, summary.clone());
        self.shared.store.update(|s| {
            s.job_status = JobStatus::Completed;
            s.overall_progress = 1.0;
            s.clear_file_fields();
            s.status_message = summary;
        });
        self.shared.clear_later(
            self.generation,
            self.shared.config.timing.completion_cooldown(),
            |s| {
                s.is_running = false;
                s.status_message.clear();
            },
        );
    }

    fn publish_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.shared.store.update(|s| s.status_message = message);
    }

    fn lifecycle(&self, file_index: Option<usize>, message: impl Into<String>) {
        self.shared
            .diagnostics
            .append(EntryKind::Lifecycle, Some(self.job.id), file_index, message);
    }

    fn progress(&self, file_index: usize, message: String) {
        self.shared.diagnostics.append(
            EntryKind::ProgressEvent,
            Some(self.job.id),
            Some(file_index),
            message,
        );
    }

    fn error(&self, file_index: Option<usize>, message: impl Into<String>) {
        self.shared
            .diagnostics
            .append(EntryKind::Error, Some(self.job.id), file_index, message);
    }
}

async fn check_input(path: &Path) -> Result<(), FileFailure> {
    tokio::fs::File::open(path)
        .await
        .map(drop)
        .map_err(|e| FileFailure::InputUnreadable(format!("{}: {e}", path.display())))
}

/// Create the output directory if needed and make sure we can write to it.
async fn prepare_output_dir(output: &Path) -> Result<(), FileFailure> {
    let dir: PathBuf = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let unwritable = |e: std::io::Error| {
        FileFailure::OutputDirUnwritable(format!("{}: {e}", dir.display()))
    };

    tokio::fs::create_dir_all(&dir).await.map_err(unwritable)?;

    let check = dir.join(format!(".pocketforge-write-check-{}", Uuid::new_v4()));
    tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&check)
        .await
        .map_err(unwritable)?;
    tokio::fs::remove_file(&check).await.map_err(unwritable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_input_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_input(&dir.path().join("missing.mov")).await.unwrap_err();
        assert!(matches!(err, FileFailure::InputUnreadable(_)));
    }

    #[tokio::test]
    async fn output_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested").join("deeper").join("converted_a.mp4");

        prepare_output_dir(&output).await.unwrap();

        assert!(output.parent().unwrap().is_dir());
        // The write check must not leave a file behind.
        let leftovers = std::fs::read_dir(output.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_dir_under_a_file_is_unwritable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let err = prepare_output_dir(&blocker.join("converted_a.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, FileFailure::OutputDirUnwritable(_)));
    }
}
