//! PowerShell script execution.
//!
//! Extension pages cannot hand the host a usable filesystem path for their
//! bundled resources, so `chrome-extension://` origins are rewritten to the
//! local browser-paths script in the working directory before execution.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::runner::CommandRunner;

const EXTENSION_ORIGIN: &str = "chrome-extension://";

/// Resolve the requested script path to an absolute local path.
fn resolve_script_path(config: &Config, script_path: &str) -> PathBuf {
    let local = if script_path.starts_with(EXTENSION_ORIGIN) {
        let fallback = PathBuf::from(&config.scripts.browser_paths_script);
        debug!(path = %fallback.display(), "rewrote extension URL to local script");
        fallback
    } else {
        PathBuf::from(script_path)
    };

    if local.is_absolute() {
        local
    } else {
        std::env::current_dir().unwrap_or_default().join(local)
    }
}

/// Execute a PowerShell script with a bounded timeout, returning its stdout.
pub async fn execute_script(
    runner: &dyn CommandRunner,
    config: &Config,
    script_path: &str,
) -> Result<String> {
    let full_path = resolve_script_path(config, script_path);
    info!(script = %full_path.display(), "executing PowerShell script");

    if !full_path.exists() {
        warn!(script = %full_path.display(), "script not found");
        anyhow::bail!("Script not found: {}", full_path.display());
    }

    let command = format!(
        r#"powershell.exe -ExecutionPolicy Bypass -File "{}""#,
        full_path.display()
    );
    let result = runner.run(&command, config.timeouts.script()).await;

    if result.succeeded {
        debug!(
            output = %result.stdout.chars().take(200).collect::<String>(),
            "script execution completed"
        );
        Ok(result.stdout)
    } else if result.timed_out() {
        anyhow::bail!(
            "Script execution timed out after {}s",
            config.timeouts.script_seconds
        )
    } else {
        anyhow::bail!(
            "Script execution failed with exit code {}: {}",
            result.exit_code,
            result.error_detail.unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::ScriptedRunner;
    use crate::runner::{CommandResult, FailureKind};

    fn config_with_script(name: &str) -> Config {
        let mut config = Config::default();
        config.scripts.browser_paths_script = name.to_string();
        config
    }

    #[tokio::test]
    async fn runs_existing_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("probe.ps1");
        std::fs::write(&script, "Write-Output 'paths'").unwrap();

        let runner = ScriptedRunner::succeeding(&["C:\\chrome.exe\nC:\\msedge.exe"]);
        let config = Config::default();

        let output = execute_script(&runner, &config, script.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(output, "C:\\chrome.exe\nC:\\msedge.exe");
        let command = runner.last_command();
        assert!(command.starts_with("powershell.exe -ExecutionPolicy Bypass -File"));
        assert!(command.contains("probe.ps1"));
    }

    #[tokio::test]
    async fn missing_script_is_error_before_any_run() {
        let runner = ScriptedRunner::succeeding(&[]);
        let config = Config::default();

        let err = execute_script(&runner, &config, "/definitely/not/here.ps1")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Script not found"));
        assert_eq!(runner.calls(), 0);
    }

    #[tokio::test]
    async fn extension_url_rewritten_to_local_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("FindBrowserPaths.ps1");
        std::fs::write(&script, "").unwrap();

        let runner = ScriptedRunner::succeeding(&["ok"]);
        let config = config_with_script(script.to_str().unwrap());

        let output = execute_script(
            &runner,
            &config,
            "chrome-extension://abcdef/scripts/FindBrowserPaths.ps1",
        )
        .await
        .unwrap();
        assert_eq!(output, "ok");
        assert!(runner.last_command().contains("FindBrowserPaths.ps1"));
    }

    #[tokio::test]
    async fn timeout_reported_distinctly() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow.ps1");
        std::fs::write(&script, "").unwrap();

        let runner = ScriptedRunner::scripted(vec![CommandResult::failed(
            FailureKind::Timeout,
            -1,
            "timed out after 60s",
        )]);
        let config = Config::default();

        let err = execute_script(&runner, &config, script.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
