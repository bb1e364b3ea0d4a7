mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;
    expand_paths(&mut config);

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./pocketforge.toml",
        "~/.config/pocketforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    // Return default config if no file found
    Ok(Config::default())
}

/// Expand `~` in user-supplied paths.
fn expand_paths(config: &mut Config) {
    let expand = |p: &Path| -> std::path::PathBuf {
        shellexpand::tilde(&p.to_string_lossy()).as_ref().into()
    };

    if let Some(path) = config.tools.encoder_path.as_deref() {
        config.tools.encoder_path = Some(expand(path));
    }
    config.tools.search_paths = config.tools.search_paths.iter().map(|p| expand(p)).collect();
    if let Some(path) = config.diagnostics.log_path.as_deref() {
        config.diagnostics.log_path = Some(expand(path));
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let profile = &config.profile;

    if profile.width == 0 || profile.height == 0 {
        anyhow::bail!(
            "Output geometry must be non-zero (got {}x{})",
            profile.width,
            profile.height
        );
    }

    // H.264 needs even dimensions with 4:2:0 chroma.
    if profile.width % 2 != 0 || profile.height % 2 != 0 {
        anyhow::bail!(
            "Output geometry must be even (got {}x{})",
            profile.width,
            profile.height
        );
    }

    if profile.extension.trim().is_empty() || profile.extension.contains('/') {
        anyhow::bail!("Output extension {:?} is invalid", profile.extension);
    }

    if profile.video_codec.trim().is_empty() || profile.audio_codec.trim().is_empty() {
        anyhow::bail!("Video and audio codecs must be set");
    }

    if profile.audio_channels == 0 || profile.audio_sample_rate == 0 {
        anyhow::bail!("Audio channel count and sample rate must be non-zero");
    }

    if config.output.prefix.contains('/') {
        anyhow::bail!("Output prefix {:?} must not contain a path separator", config.output.prefix);
    }

    if config.timing.file_timeout_ms == 0 {
        anyhow::bail!("Per-file timeout cannot be 0");
    }

    if config.diagnostics.max_entries == 0 {
        anyhow::bail!("Diagnostics max_entries cannot be 0");
    }

    if config.diagnostics.rotation != LogRotation::Never && config.diagnostics.max_log_files == 0 {
        anyhow::bail!("Diagnostics max_log_files cannot be 0 when rotating");
    }

    if let Some(path) = &config.diagnostics.log_path {
        if path.file_stem().is_none() {
            anyhow::bail!("Diagnostics log_path {:?} must name a file", path);
        }
    }

    if config.tools.encoder_name.trim().is_empty() {
        anyhow::bail!("Encoder name cannot be empty");
    }

    if let Some(path) = &config.tools.encoder_path {
        if !path.exists() {
            tracing::warn!("Configured encoder path does not exist: {:?}", path);
        }
    }

    Ok(())
}
