//! Application configuration.
//!
//! The [`Config`] struct is deserialized from TOML and defaults sensibly so
//! a missing or empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vidmill_av::ToolsConfig;

/// Hard ceiling on the configured worker count.
const MAX_WORKERS: usize = 20;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory all artifacts land in. Assumed validated and writable.
    pub output_dir: PathBuf,
    /// Upper bound on simultaneously running external processes.
    pub workers: usize,
    /// Thread count hint forwarded to ffmpeg per job.
    pub threads_per_job: usize,
    /// Cap on the retained stderr tail per process, in bytes.
    pub stderr_tail_bytes: usize,
    /// Seconds between SIGTERM and SIGKILL when stopping a process.
    pub term_grace_secs: u64,
    /// Seconds to let active jobs finish during shutdown.
    pub shutdown_grace_secs: u64,
    /// External tool path overrides.
    pub tools: ToolsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            workers: 5,
            threads_per_job: 4,
            stderr_tail_bytes: 8 * 1024,
            term_grace_secs: 5,
            shutdown_grace_secs: 30,
            tools: ToolsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Worker count clamped to a sane range.
    pub fn clamped_workers(&self) -> usize {
        self.workers.clamp(1, MAX_WORKERS)
    }

    pub fn term_grace(&self) -> Duration {
        Duration::from_secs(self.term_grace_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.workers == 0 || self.workers > MAX_WORKERS {
            warnings.push(format!(
                "workers = {} is outside 1..={MAX_WORKERS} and will be clamped",
                self.workers
            ));
        }
        if self.stderr_tail_bytes == 0 {
            warnings.push("stderr_tail_bytes = 0 disables error capture".into());
        }
        if self.shutdown_grace_secs == 0 {
            warnings.push("shutdown_grace_secs = 0 cancels active jobs immediately".into());
        }
        if let Some(ref path) = self.tools.ffmpeg_path {
            if !path.exists() {
                warnings.push(format!("tools.ffmpeg_path does not exist: {}", path.display()));
            }
        }
        if let Some(ref path) = self.tools.ffprobe_path {
            if !path.exists() {
                warnings.push(format!(
                    "tools.ffprobe_path does not exist: {}",
                    path.display()
                ));
            }
        }

        warnings
    }
}
