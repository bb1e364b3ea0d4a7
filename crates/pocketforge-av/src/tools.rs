//! External tool detection.
//!
//! The encoder is looked up in three tiers: an explicitly configured path,
//! a list of well-known install locations, then `PATH` via [`which`].

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Well-known ffmpeg install locations (Homebrew on Intel and Apple Silicon,
/// distro packages, minimal images).
const DEFAULT_SEARCH_PATHS: &[&str] = &[
    "/usr/local/bin/ffmpeg",
    "/opt/homebrew/bin/ffmpeg",
    "/usr/bin/ffmpeg",
    "/bin/ffmpeg",
];

/// Where to look for the encoder executable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Executable name used for the `PATH` fallback.
    pub encoder_name: String,
    /// Explicit path, tried before anything else.
    pub encoder_path: Option<PathBuf>,
    /// Candidate locations searched in order.
    pub search_paths: Vec<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            encoder_name: "ffmpeg".to_string(),
            encoder_path: None,
            search_paths: DEFAULT_SEARCH_PATHS.iter().map(PathBuf::from).collect(),
        }
    }
}

/// Information about an external tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// Version string if available.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
}

/// Locate the encoder executable.
///
/// # Errors
///
/// Returns [`Error::EncoderNotFound`] listing every searched location if no
/// executable candidate exists.
pub fn locate_encoder(config: &ToolsConfig) -> Result<PathBuf> {
    let mut searched = Vec::new();

    let candidates = config
        .encoder_path
        .iter()
        .chain(config.search_paths.iter());

    for candidate in candidates {
        if is_executable(candidate) {
            tracing::debug!(path = %candidate.display(), "Encoder found at configured location");
            return Ok(candidate.clone());
        }
        searched.push(candidate.clone());
    }

    match which::which(&config.encoder_name) {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "Encoder found on PATH");
            Ok(path)
        }
        Err(_) => Err(Error::encoder_not_found(&config.encoder_name, searched)),
    }
}

/// Check whether the configured encoder is available and get its version.
pub fn check_tool(config: &ToolsConfig) -> ToolInfo {
    match locate_encoder(config) {
        Ok(path) => ToolInfo {
            name: config.encoder_name.clone(),
            available: true,
            version: detect_version(&path),
            path: Some(path),
        },
        Err(_) => ToolInfo {
            name: config.encoder_name.clone(),
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Run `<tool> -version` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = Command::new(path).arg("-version").output().ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
