//! Shared test harness for integration tests.
//!
//! Provides [`FakeBackend`], a scripted stand-in for ffmpeg, and
//! [`TestHarness`] which wires it into an [`Orchestrator`] with zero pauses
//! and scratch input/output directories.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pocketforge::config::{Config, TimingConfig};
use pocketforge::{Diagnostics, Orchestrator, ProgressSnapshot};
use pocketforge_av::{EncoderBackend, EncoderProcess, Error, Result};
use tempfile::TempDir;

/// Behaviour of one fake encoder run.
#[derive(Debug, Clone)]
pub enum Script {
    /// Report `duration_secs`, advance in `steps` equal increments, write the
    /// output and exit 0.
    Linear { duration_secs: f64, steps: u32 },
    /// Report positions but never a duration, then succeed.
    NoDuration { steps: u32 },
    /// Print the banner, then never advance nor exit.
    Hang,
    /// Exit with the given code without writing output.
    Exit(i32),
    /// Exit 0 but leave an empty output file.
    EmptyOutput,
    /// Fail to start.
    SpawnError,
}

impl Script {
    pub fn linear() -> Self {
        Script::Linear {
            duration_secs: 10.0,
            steps: 5,
        }
    }
}

/// Scripted [`EncoderBackend`]. Each spawn takes the next queued script,
/// falling back to [`Script::linear`].
pub struct FakeBackend {
    found: bool,
    scripts: Mutex<VecDeque<Script>>,
    spawned: Mutex<Vec<Vec<String>>>,
    kills: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            found: true,
            scripts: Mutex::new(VecDeque::new()),
            spawned: Mutex::new(Vec::new()),
            kills: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A backend whose encoder lookup always fails.
    pub fn missing() -> Self {
        Self {
            found: false,
            ..Self::new()
        }
    }

    pub fn with_scripts(scripts: impl IntoIterator<Item = Script>) -> Self {
        let backend = Self::new();
        backend.scripts.lock().extend(scripts);
        backend
    }

    /// Argument lists of every spawn, in order.
    pub fn spawned(&self) -> Vec<Vec<String>> {
        self.spawned.lock().clone()
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EncoderBackend for FakeBackend {
    fn locate(&self) -> Result<PathBuf> {
        if self.found {
            Ok(PathBuf::from("/usr/local/bin/ffmpeg"))
        } else {
            Err(Error::encoder_not_found("ffmpeg", Vec::new()))
        }
    }

    async fn spawn(&self, program: &Path, args: &[String]) -> Result<Box<dyn EncoderProcess>> {
        self.spawned.lock().push(args.to_vec());
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(Script::linear);

        // The output path is always the last argument.
        let output = PathBuf::from(args.last().cloned().unwrap_or_default());
        let banner = "  Duration: 00:00:10.00, start: 0.000000, bitrate: 800 kb/s".to_string();

        let process = match script {
            Script::Linear {
                duration_secs,
                steps,
            } => {
                let mut lines = vec![format!(
                    "  Duration: {}, start: 0.000000, bitrate: 800 kb/s",
                    clock(duration_secs)
                )];
                lines.extend(positions(duration_secs, steps));
                lines.push("progress=end".to_string());
                FakeProcess::new(lines, output, &self.kills).succeeding(b"fake mp4 data")
            }
            Script::NoDuration { steps } => {
                let lines = positions(steps as f64, steps);
                FakeProcess::new(lines, output, &self.kills).succeeding(b"fake mp4 data")
            }
            Script::Hang => {
                let mut process = FakeProcess::new(vec![banner], output, &self.kills);
                process.hang = true;
                process
            }
            Script::Exit(code) => {
                let mut process = FakeProcess::new(vec![banner], output, &self.kills);
                process.exit_code = code;
                process
            }
            Script::EmptyOutput => {
                FakeProcess::new(vec![banner], output, &self.kills).succeeding(b"")
            }
            Script::SpawnError => {
                return Err(Error::spawn_failed(
                    program.to_string_lossy(),
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
                ))
            }
        };

        Ok(Box::new(process))
    }
}

struct FakeProcess {
    lines: VecDeque<String>,
    output: PathBuf,
    write_output: Option<Vec<u8>>,
    exit_code: i32,
    hang: bool,
    killed: bool,
    kills: Arc<AtomicUsize>,
}

impl FakeProcess {
    fn new(lines: Vec<String>, output: PathBuf, kills: &Arc<AtomicUsize>) -> Self {
        Self {
            lines: lines.into(),
            output,
            write_output: None,
            exit_code: 0,
            hang: false,
            killed: false,
            kills: Arc::clone(kills),
        }
    }

    fn succeeding(mut self, bytes: &[u8]) -> Self {
        self.write_output = Some(bytes.to_vec());
        self
    }
}

#[async_trait]
impl EncoderProcess for FakeProcess {
    async fn next_line(&mut self) -> Option<String> {
        if let Some(line) = self.lines.pop_front() {
            tokio::task::yield_now().await;
            return Some(line);
        }
        if self.hang && !self.killed {
            std::future::pending::<()>().await;
        }
        None
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        if self.hang && !self.killed {
            std::future::pending::<()>().await;
        }
        if self.killed {
            return Ok(None);
        }
        if let Some(bytes) = self.write_output.take() {
            tokio::fs::write(&self.output, bytes).await?;
        }
        Ok(Some(self.exit_code))
    }

    async fn kill(&mut self) -> Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.killed = true;
        Ok(())
    }
}

fn positions(duration_secs: f64, steps: u32) -> Vec<String> {
    (1..=steps)
        .map(|k| {
            let us = (duration_secs * k as f64 / steps as f64 * 1_000_000.0).round() as i64;
            format!("out_time_us={us}")
        })
        .collect()
}

fn clock(secs: f64) -> String {
    let whole = secs.floor() as u64;
    let frac = secs - whole as f64;
    format!(
        "{:02}:{:02}:{:05.2}",
        whole / 3600,
        (whole % 3600) / 60,
        (whole % 60) as f64 + frac
    )
}

/// Orchestrator over a [`FakeBackend`] with scratch directories.
pub struct TestHarness {
    pub orchestrator: Orchestrator,
    pub backend: Arc<FakeBackend>,
    pub diagnostics: Arc<Diagnostics>,
    pub dir: TempDir,
}

impl TestHarness {
    pub fn new(backend: FakeBackend) -> Self {
        Self::with_config(backend, test_config())
    }

    pub fn with_config(backend: FakeBackend, config: Config) -> Self {
        let backend = Arc::new(backend);
        let diagnostics = Arc::new(Diagnostics::with_capacity(10_000));
        let orchestrator = Orchestrator::new(
            config,
            Arc::clone(&backend) as Arc<dyn EncoderBackend>,
            Arc::clone(&diagnostics),
        );

        Self {
            orchestrator,
            backend,
            diagnostics,
            dir: tempfile::tempdir().expect("failed to create temp dir"),
        }
    }

    /// Create readable input files under `<tmp>/in`.
    pub fn inputs(&self, names: &[&str]) -> Vec<PathBuf> {
        let dir = self.dir.path().join("in");
        std::fs::create_dir_all(&dir).expect("failed to create input dir");
        names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                std::fs::write(&path, b"source").expect("failed to write input");
                path
            })
            .collect()
    }

    pub fn out_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    /// Start a job and wait for its worker to exit.
    pub async fn run(&self, inputs: Vec<PathBuf>) -> ProgressSnapshot {
        self.orchestrator
            .start(inputs, Some(self.out_dir()))
            .expect("start should succeed");
        tokio::time::timeout(Duration::from_secs(10), self.orchestrator.wait())
            .await
            .expect("job should finish");
        self.orchestrator.snapshot()
    }
}

/// No pauses, a generous per-file timeout, and clean-up delays long enough
/// that final messages stay visible for the duration of a test.
pub fn test_config() -> Config {
    let mut timing = TimingConfig::immediate(Duration::from_secs(30));
    timing.completion_cooldown_ms = 60_000;
    timing.not_found_grace_ms = 60_000;
    timing.cancel_notice_ms = 60_000;

    Config {
        timing,
        ..Config::default()
    }
}
