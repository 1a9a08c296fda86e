//! External tool detection.
//!
//! Resolves the ffmpeg and ffprobe executables, preferring configured paths
//! over a `PATH` lookup. Discovery and sanity-checking live at this interface
//! layer; the executor and prober receive already-resolved paths.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tool path overrides, usually loaded from the application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Resolved executable paths for the two external tools.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl ToolPaths {
    /// Resolve both tools, honoring config overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutableNotFound`] for the first tool that cannot
    /// be resolved.
    pub fn discover(config: &ToolsConfig) -> Result<Self> {
        Ok(Self {
            ffmpeg: resolve("ffmpeg", config.ffmpeg_path.as_deref())?,
            ffprobe: resolve("ffprobe", config.ffprobe_path.as_deref())?,
        })
    }
}

fn resolve(name: &str, configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(
            "configured path for {} does not exist ({}); falling back to PATH",
            name,
            path.display()
        );
    }
    which::which(name).map_err(|_| Error::executable_not_found(name))
}

/// Availability information for a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of `-version` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Check both tools and return availability information.
pub fn check_tools(config: &ToolsConfig) -> Vec<ToolInfo> {
    ["ffmpeg", "ffprobe"]
        .iter()
        .map(|&name| {
            let configured = match name {
                "ffmpeg" => config.ffmpeg_path.as_deref(),
                _ => config.ffprobe_path.as_deref(),
            };
            match resolve(name, configured) {
                Ok(path) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(&path),
                    path: Some(path),
                },
                Err(_) => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            }
        })
        .collect()
}

/// Run `<tool> -version` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}
