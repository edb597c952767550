//! Host configuration.
//!
//! Read once at startup from a JSON file next to the executable (or the
//! path given on the command line). A missing file is not an error — every
//! field has a default so the host runs unconfigured. No hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

/// Top-level configuration for the host.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub sandbox: SandboxConfig,
    pub scripts: ScriptConfig,
}

/// Log destination and verbosity. Stdout carries the wire protocol, so logs
/// go to stderr unless a file is configured.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log file path. `None` logs to stderr.
    pub file: Option<PathBuf>,

    /// Level filter (trace, debug, info, warn, error).
    pub level: String,

    /// Roll the log file aside at startup once it exceeds this size.
    pub max_size_bytes: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            level: "info".to_string(),
            max_size_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Wall-clock bounds for external process invocations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Simple commands: registry queries, WSL lifecycle.
    pub command_seconds: u64,

    /// Browser launch commands (may elevate or cross into WSL).
    pub launch_seconds: u64,

    /// PowerShell script execution.
    pub script_seconds: u64,

    /// Short hardware-identifier probes.
    pub probe_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_seconds: 10,
            launch_seconds: 30,
            script_seconds: 60,
            probe_seconds: 5,
        }
    }
}

impl TimeoutConfig {
    pub const fn command(&self) -> Duration {
        Duration::from_secs(self.command_seconds)
    }

    pub const fn launch(&self) -> Duration {
        Duration::from_secs(self.launch_seconds)
    }

    pub const fn script(&self) -> Duration {
        Duration::from_secs(self.script_seconds)
    }

    pub const fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_seconds)
    }
}

/// Retry policy for browser launch commands.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Windows Sandbox integration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Directory shared into the sandbox for launcher artifacts.
    /// Defaults to `%USERPROFILE%\Documents` at call time.
    pub artifact_dir: Option<PathBuf>,

    /// Sandbox executable. Defaults to `%windir%\System32\WindowsSandbox.exe`.
    pub executable: Option<PathBuf>,

    /// Browser launched inside the sandbox.
    pub browser_path: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            artifact_dir: None,
            executable: None,
            browser_path: r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe"
                .to_string(),
        }
    }
}

/// Local script resolution for extension-origin script requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Script substituted for `chrome-extension://` paths.
    pub browser_paths_script: String,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            browser_paths_script: "FindBrowserPaths.ps1".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file. A missing file yields defaults;
    /// an unreadable or malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Create a config from a JSON string (for testing).
    #[cfg(test)]
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse JSON")?;
        Ok(config)
    }
}
