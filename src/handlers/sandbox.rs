//! Windows Sandbox launching.
//!
//! Opening a URL in the sandbox is idempotent: when a sandbox instance is
//! already running the handler only drops a launcher batch file into the
//! shared artifact directory (mapped into the sandbox); otherwise it writes
//! a fresh configuration plus launcher artifacts and starts the sandbox.
//! Artifact names carry an epoch timestamp so repeated requests never
//! collide.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::config::Config;
use crate::runner::CommandRunner;

const SANDBOX_PROCESS: &str = "WindowsSandbox.exe";

fn artifact_dir(config: &Config) -> PathBuf {
    config.sandbox.artifact_dir.clone().unwrap_or_else(|| {
        let profile = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(profile).join("Documents")
    })
}

fn sandbox_executable(config: &Config) -> PathBuf {
    config.sandbox.executable.clone().unwrap_or_else(|| {
        let windir = std::env::var("windir").unwrap_or_else(|_| r"C:\Windows".to_string());
        PathBuf::from(windir).join(r"System32\WindowsSandbox.exe")
    })
}

/// Probe the process list for a running sandbox instance.
pub async fn is_sandbox_running(runner: &dyn CommandRunner, config: &Config) -> bool {
    let result = runner
        .run(
            &format!(r#"tasklist /FI "IMAGENAME eq {SANDBOX_PROCESS}" /NH"#),
            config.timeouts.probe(),
        )
        .await;
    result.succeeded && result.stdout.contains(SANDBOX_PROCESS)
}

fn escape_for_batch(url: &str) -> String {
    url.replace('"', "\"\"")
}

fn escape_for_html(url: &str) -> String {
    url.replace('"', "&quot;")
}

fn launcher_batch(config: &Config, url: &str) -> String {
    format!(
        "@echo off\r\nstart \"\" \"{}\" \"{}\"\r\n",
        config.sandbox.browser_path,
        escape_for_batch(url)
    )
}

/// Drop a launcher batch into the shared directory of an already-running
/// sandbox. The mapped folder makes it visible inside immediately.
fn write_launcher_for_running_sandbox(config: &Config, url: &str) -> Result<String> {
    let dir = artifact_dir(config);
    let timestamp = Utc::now().timestamp();
    let batch_path = dir.join(format!("open_url_{timestamp}.bat"));

    std::fs::write(&batch_path, launcher_batch(config, url))
        .with_context(|| format!("Failed to write launcher batch: {}", batch_path.display()))?;

    info!(path = %batch_path.display(), "created URL launcher for running sandbox");
    Ok(
        "URL launcher created for already running Windows Sandbox. The URL should open in a new tab."
            .to_string(),
    )
}

/// Provision a fresh sandbox configuration and launch it.
async fn provision_and_launch(
    runner: &dyn CommandRunner,
    config: &Config,
    url: &str,
) -> Result<String> {
    let sandbox_exe = sandbox_executable(config);
    if !sandbox_exe.exists() {
        anyhow::bail!(
            "Windows Sandbox executable not found at {}",
            sandbox_exe.display()
        );
    }

    let dir = artifact_dir(config);
    let timestamp = Utc::now().timestamp();
    let escaped = escape_for_html(url);

    // Redirect page for inside the sandbox, launcher batch, and the .wsb
    // configuration that maps the artifact directory and runs the batch
    // at logon.
    let html_path = dir.join(format!("redirect_{timestamp}.html"));
    let html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n\
         <meta charset=\"UTF-8\">\n<title>Redirecting...</title>\n\
         <meta http-equiv=\"refresh\" content=\"0;URL='{escaped}'\">\n\
         </head>\n<body>\n<h2>Redirecting to: {escaped}</h2>\n</body>\n</html>\n"
    );
    std::fs::write(&html_path, html)
        .with_context(|| format!("Failed to write redirect page: {}", html_path.display()))?;

    let batch_name = format!("launch_url_{timestamp}.bat");
    let batch_path = dir.join(&batch_name);
    std::fs::write(&batch_path, launcher_batch(config, url))
        .with_context(|| format!("Failed to write launcher batch: {}", batch_path.display()))?;

    let folder_name = dir
        .file_name()
        .map_or_else(|| "Documents".to_string(), |n| n.to_string_lossy().into_owned());
    let wsb_path = dir.join(format!("sandbox_config_{timestamp}.wsb"));
    let wsb = format!(
        "<Configuration>\n  <MappedFolders>\n    <MappedFolder>\n      \
         <HostFolder>{}</HostFolder>\n      <ReadOnly>false</ReadOnly>\n    \
         </MappedFolder>\n  </MappedFolders>\n  <LogonCommand>\n    \
         <Command>C:\\Users\\WDAGUtilityAccount\\Desktop\\{folder_name}\\{batch_name}</Command>\n  \
         </LogonCommand>\n</Configuration>\n",
        dir.display()
    );
    std::fs::write(&wsb_path, wsb)
        .with_context(|| format!("Failed to write sandbox config: {}", wsb_path.display()))?;

    info!(
        config = %wsb_path.display(),
        batch = %batch_path.display(),
        "provisioned sandbox configuration"
    );

    let launch = format!(r#""{}" "{}""#, sandbox_exe.display(), wsb_path.display());
    let result = runner.spawn_detached(&launch).await;
    if !result.succeeded {
        anyhow::bail!(
            "Failed to launch Windows Sandbox: {}",
            result.error_detail.unwrap_or_default()
        );
    }

    // Give the sandbox a moment to come up before reporting success.
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;

    Ok(format!("Opening {url} in Windows Sandbox"))
}

/// Launch the sandbox itself, with no URL provisioning.
pub async fn launch_plain(runner: &dyn CommandRunner, config: &Config) -> Result<String> {
    let sandbox_exe = sandbox_executable(config);
    let result = runner
        .spawn_detached(&format!(r#""{}""#, sandbox_exe.display()))
        .await;
    if result.succeeded {
        Ok("Opening Windows Sandbox".to_string())
    } else {
        anyhow::bail!(
            "Failed to launch Windows Sandbox: {}",
            result.error_detail.unwrap_or_default()
        )
    }
}

/// Open a URL in Windows Sandbox, reusing a running instance when present.
pub async fn open_in_sandbox(
    runner: &dyn CommandRunner,
    config: &Config,
    url: &str,
) -> Result<String> {
    if is_sandbox_running(runner, config).await {
        return write_launcher_for_running_sandbox(config, url);
    }
    provision_and_launch(runner, config, url).await.map_err(|e| {
        warn!(error = %e, "sandbox launch failed");
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::ScriptedRunner;
    use crate::runner::CommandResult;

    fn sandboxed_config(dir: &std::path::Path, exe: Option<PathBuf>) -> Config {
        let mut config = Config::default();
        config.sandbox.artifact_dir = Some(dir.to_path_buf());
        config.sandbox.executable = exe;
        config
    }

    fn artifacts_with_ext(dir: &std::path::Path, ext: &str) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|x| x == ext))
            .collect()
    }

    #[tokio::test]
    async fn running_sandbox_gets_launcher_only() {
        let dir = tempfile::tempdir().unwrap();
        // tasklist reports a live sandbox.
        let runner = ScriptedRunner::succeeding(&[
            "WindowsSandbox.exe    1234 Console    1    140,000 K",
        ]);
        let config = sandboxed_config(dir.path(), None);

        let message = open_in_sandbox(&runner, &config, "https://example.com/a?b=1")
            .await
            .unwrap();
        assert!(message.contains("already running"));

        let batches = artifacts_with_ext(dir.path(), "bat");
        assert_eq!(batches.len(), 1);
        let body = std::fs::read_to_string(&batches[0]).unwrap();
        assert!(body.contains("https://example.com/a?b=1"));
        assert!(body.contains(&config.sandbox.browser_path));
        // No .wsb provisioning and no launch in the idempotent path.
        assert!(artifacts_with_ext(dir.path(), "wsb").is_empty());
        assert_eq!(runner.detached_calls(), 0);
    }

    #[tokio::test]
    async fn fresh_launch_provisions_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        // Use a file that exists on any host as the stand-in executable.
        let exe = dir.path().join("WindowsSandbox.exe");
        std::fs::write(&exe, "").unwrap();

        // tasklist probe finds nothing.
        let runner = ScriptedRunner::scripted(vec![CommandResult::ok(String::new())]);
        let config = sandboxed_config(dir.path(), Some(exe));

        let message = open_in_sandbox(&runner, &config, "https://example.com")
            .await
            .unwrap();
        assert_eq!(message, "Opening https://example.com in Windows Sandbox");

        assert_eq!(artifacts_with_ext(dir.path(), "html").len(), 1);
        assert_eq!(artifacts_with_ext(dir.path(), "bat").len(), 1);
        let wsbs = artifacts_with_ext(dir.path(), "wsb");
        assert_eq!(wsbs.len(), 1);

        let wsb = std::fs::read_to_string(&wsbs[0]).unwrap();
        assert!(wsb.contains("<HostFolder>"));
        assert!(wsb.contains("launch_url_"));
        assert_eq!(runner.detached_calls(), 1);
    }

    #[tokio::test]
    async fn missing_executable_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::scripted(vec![CommandResult::ok(String::new())]);
        let config =
            sandboxed_config(dir.path(), Some(dir.path().join("no-such-sandbox.exe")));

        let err = open_in_sandbox(&runner, &config, "https://example.com")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn url_quotes_are_escaped() {
        assert_eq!(
            escape_for_batch(r#"https://e.com/?q="x""#),
            r#"https://e.com/?q=""x"""#
        );
        assert_eq!(
            escape_for_html(r#"https://e.com/?q="x""#),
            "https://e.com/?q=&quot;x&quot;"
        );
    }
}
