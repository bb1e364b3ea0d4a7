mod cli;

use pocketforge::{
    config,
    diagnostics::{self, Diagnostics},
    state::ProgressSnapshot,
    JobStatus, Orchestrator,
};
use pocketforge_av::FfmpegBackend;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only conversions write the diagnostics log; the config is loaded
    // first so its file layer is in place before the first event.
    let convert_config = match &cli.command {
        Commands::Convert { .. } => Some(config::load_config_or_default(cli.config.as_deref())?),
        _ => None,
    };
    let _log_guard = init_logging(
        cli.verbose,
        convert_config.as_ref().map(|config| &config.diagnostics),
    )?;

    match cli.command {
        Commands::Convert { inputs, dest, json } => {
            let config = convert_config.context("Conversion config was not loaded")?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert(config, inputs, dest, json))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Logs { lines } => show_logs(cli.config.as_deref(), lines),
        Commands::Version => {
            println!("pocketforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Console logging on stderr, plus the diagnostics file when configured.
/// The returned guard flushes the file writer when dropped.
fn init_logging(
    verbose: bool,
    diagnostics_config: Option<&config::DiagnosticsConfig>,
) -> Result<Option<WorkerGuard>> {
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbose {
            // Verbose mode: every encoder line and progress event
            "pocketforge=trace,pocketforge_av=trace".to_string()
        } else {
            "pocketforge=warn,pocketforge_av=warn".to_string()
        }
    });

    // Logs go to stderr so `convert --json` output stays machine-readable.
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(&env_filter));

    let (file, guard) = match diagnostics_config {
        Some(config) => match diagnostics::log_writer(config)? {
            Some((writer, guard)) => (Some(diagnostics::file_layer(writer)), Some(guard)),
            None => (None, None),
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(file)
        .with(console)
        .init();

    Ok(guard)
}

async fn convert(
    config: config::Config,
    inputs: Vec<PathBuf>,
    dest: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let total = inputs.len();
    let diagnostics = Arc::new(Diagnostics::new(&config.diagnostics));
    let backend = Arc::new(FfmpegBackend::new(config.tools.clone()));
    let orchestrator = Orchestrator::new(config, backend, diagnostics);

    let mut rx = orchestrator.subscribe();
    let job_id = orchestrator.start(inputs, dest)?;
    tracing::debug!(job_id = %job_id, "Conversion started");

    let mut last_line = String::new();
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                render(&snapshot, json, &mut last_line)?;
            }
            _ = orchestrator.wait() => break,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Cancelling...");
                orchestrator.cancel().await;
                break;
            }
        }
    }

    let snapshot = orchestrator.snapshot();
    render(&snapshot, json, &mut last_line)?;

    match snapshot.job_status {
        JobStatus::Failed => anyhow::bail!("ffmpeg not found"),
        JobStatus::Cancelled => anyhow::bail!("Conversion cancelled"),
        _ if snapshot.converted_files.len() < total => anyhow::bail!(
            "{} of {} files failed to convert",
            total - snapshot.converted_files.len(),
            total
        ),
        _ => {}
    }

    if !json {
        for output in &snapshot.converted_files {
            println!("  {}", output.display());
        }
    }

    Ok(())
}

/// Print a snapshot unless it renders the same as the previous one.
fn render(snapshot: &ProgressSnapshot, json: bool, last_line: &mut String) -> Result<()> {
    let line = if json {
        serde_json::to_string(snapshot)?
    } else {
        progress_line(snapshot)
    };

    if line != *last_line {
        println!("{}", line);
        *last_line = line;
    }
    Ok(())
}

fn progress_line(snapshot: &ProgressSnapshot) -> String {
    let mut line = format!(
        "[{:5.1}%] {}",
        snapshot.overall_progress * 100.0,
        snapshot.status_message
    );

    if !snapshot.current_file_name.is_empty() && snapshot.is_running {
        line.push_str(&format!(" | {}", snapshot.current_file_name));
        if !snapshot.current_processing_time.is_empty() {
            line.push_str(&format!(" {}", snapshot.current_processing_time));
            if !snapshot.total_video_duration.is_empty() {
                line.push_str(&format!(" / {}", snapshot.total_video_duration));
            }
        }
        if !snapshot.conversion_speed.is_empty() {
            line.push_str(&format!(" ({})", snapshot.conversion_speed));
        }
    }

    line
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    println!("Checking external tools...\n");

    let tool = pocketforge_av::check_tool(&config.tools);
    let status = if tool.available { "✓" } else { "✗" };

    print!("{} {}", status, tool.name);

    if let Some(ref version) = tool.version {
        print!(" ({})", version.lines().next().unwrap_or(""));
    }

    if let Some(ref path) = tool.path {
        print!(" - {}", path.display());
    }

    println!();

    println!();
    if tool.available {
        println!("All required tools are available!");
    } else {
        println!(
            "{} is missing. Install it with 'brew install ffmpeg' or your package manager.",
            tool.name
        );
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    let profile = &config.profile;
    println!(
        "  Output: {}x{} {} ({} {}, {} {})",
        profile.width,
        profile.height,
        profile.format,
        profile.video_codec,
        profile.video_bitrate,
        profile.audio_codec,
        profile.audio_bitrate
    );
    println!(
        "  Output name: {}<name>.{}",
        config.output.prefix, profile.extension
    );
    println!(
        "  Per-file timeout: {}s",
        config.timing.file_timeout().as_secs()
    );
    match &config.tools.encoder_path {
        Some(encoder) => println!("  Encoder: {}", encoder.display()),
        None => println!("  Encoder: {} (searched)", config.tools.encoder_name),
    }
    match &config.diagnostics.log_path {
        Some(log) => println!(
            "  Diagnostics log: {} (rotation: {:?})",
            log.display(),
            config.diagnostics.rotation
        ),
        None => println!("  Diagnostics log: in memory only"),
    }

    Ok(())
}

fn show_logs(config_path: Option<&Path>, lines: usize) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let Some(path) = config.diagnostics.log_path else {
        anyhow::bail!("No diagnostics log configured (set log_path in the [diagnostics] section)");
    };

    let entries = diagnostics::read_tail(&path, lines)
        .with_context(|| format!("Failed to read diagnostics log: {:?}", path))?;

    for entry in entries {
        let file = entry
            .file_index
            .map(|i| format!(" file {}", i + 1))
            .unwrap_or_default();
        println!(
            "{} {:<14}{} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            format!("{:?}", entry.kind),
            file,
            entry.message
        );
    }

    Ok(())
}
