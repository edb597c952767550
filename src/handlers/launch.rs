//! Browser launch commands (`runCommand` and the legacy `command` path).
//!
//! The extension sends a raw launch command plus an optional URL; this
//! module owns the command/URL composition rules (elevation passthrough,
//! WSL browser flags, `.exe` quoting, Windows Sandbox routing) and wraps
//! execution in the fixed retry policy.

use anyhow::Result;
use tracing::debug;

use super::sandbox;
use crate::config::Config;
use crate::runner::{run_with_retry, CommandRunner};

/// How a launch request should be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Composed {
    /// Run this shell command through the retry wrapper.
    Command(String),
    /// Route to the Windows Sandbox handler instead of a plain launch.
    Sandbox,
}

/// Compose the final shell command from the raw command and optional URL.
pub fn compose(command: &str, url: Option<&str>) -> Composed {
    let lowered = command.to_lowercase();

    if command.starts_with("runas") {
        // Elevation commands are pre-assembled by the extension.
        return Composed::Command(command.to_string());
    }
    if command.starts_with("cmd /c start powershell.exe") {
        return Composed::Command(command.to_string());
    }
    if lowered.trim() == "windowssandbox" {
        return Composed::Sandbox;
    }

    let composed = if lowered.contains("wsl") {
        if lowered.contains("firefox") {
            // -new-tab reuses a running Firefox instead of erroring out.
            url.map_or_else(
                || command.to_string(),
                |url| format!(r#"{command} -new-tab "{url}""#),
            )
        } else if lowered.contains("chrome") || lowered.contains("edge") {
            // Chromium browsers refuse to start sandboxed inside WSL.
            url.map_or_else(
                || format!("{command} --no-sandbox"),
                |url| format!(r#"{command} --no-sandbox "{url}""#),
            )
        } else {
            url.map_or_else(
                || command.to_string(),
                |url| format!(r#"{command} "{url}""#),
            )
        }
    } else if lowered.ends_with(".exe") {
        url.map_or_else(
            || format!(r#""{command}""#),
            |url| format!(r#""{command}" "{url}""#),
        )
    } else {
        url.map_or_else(
            || command.to_string(),
            |url| format!(r#"{command} "{url}""#),
        )
    };

    Composed::Command(composed)
}

/// Execute a launch request with retries, returning the final stdout or the
/// failure text.
pub async fn run_launch_command(
    runner: &dyn CommandRunner,
    config: &Config,
    command: &str,
    url: Option<&str>,
) -> Result<String> {
    // Empty URLs from the extension mean "no URL".
    let url = url.filter(|u| !u.is_empty());

    match compose(command, url) {
        Composed::Sandbox => {
            let Some(url) = url else {
                // Bare sandbox launch without a URL skips provisioning.
                return sandbox::launch_plain(runner, config).await;
            };
            sandbox::open_in_sandbox(runner, config, url).await
        }
        Composed::Command(composed) => {
            debug!(command = %composed, "launching composed command");
            let result = run_with_retry(
                |attempt| {
                    debug!(attempt, "launch attempt");
                    runner.run(&composed, config.timeouts.launch())
                },
                config.retry.max_attempts,
                config.retry.delay(),
            )
            .await;

            if result.succeeded {
                Ok(result.stdout)
            } else {
                // Failure is still a response, not an error: the extension
                // historically receives it inside `result`.
                let message = match result.error_detail {
                    Some(detail) => detail,
                    None => result.error_message(),
                };
                Ok(message)
            }
        }
    }
}
