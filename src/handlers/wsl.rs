//! WSL instance lifecycle operations.
//!
//! Every operation shells out to `wsl.exe` (opaque command strings) through
//! the runner. `reinstate` is a compound sequence with no rollback: each
//! step is attempted regardless of whether the previous one failed, matching
//! the long-standing host behavior.

use tracing::{debug, error, info};

use crate::config::Config;
use crate::runner::CommandRunner;

/// List installed WSL instances. Returns an empty list on failure rather
/// than an error — callers always get `{"instances": [...]}`.
pub async fn get_instances(runner: &dyn CommandRunner, config: &Config) -> Vec<String> {
    let result = runner
        .run("wsl --list --quiet", config.timeouts.command())
        .await;

    if !result.succeeded {
        error!(
            detail = %result.error_detail.as_deref().unwrap_or(""),
            "failed to list WSL instances"
        );
        return Vec::new();
    }

    // `wsl --list` emits UTF-16 on some hosts; interior NULs survive the
    // lossy conversion and have to be stripped per line.
    let instances: Vec<String> = result
        .stdout
        .lines()
        .map(|line| line.replace('\u{0}', "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    debug!(count = instances.len(), "listed WSL instances");
    instances
}

/// Instance creation runs in the extension's own elevated PowerShell window;
/// the host only acknowledges.
pub fn create_instance() -> String {
    "WSL instance creation is handled by the extension. Please check the PowerShell window for details."
        .to_string()
}

/// Unregister an instance.
pub async fn delete_instance(
    runner: &dyn CommandRunner,
    config: &Config,
    instance: &str,
) -> Result<String, String> {
    let result = runner
        .run(
            &format!("wsl --unregister {instance}"),
            config.timeouts.command(),
        )
        .await;

    if result.succeeded {
        info!(instance = %instance, "deleted WSL instance");
        Ok(format!("Deleted WSL instance: {instance}"))
    } else {
        let detail = result.error_detail.unwrap_or_default();
        error!(instance = %instance, detail = %detail, "failed to delete WSL instance");
        Err(format!("Error deleting WSL instance: {detail}"))
    }
}

/// Unregister, reinstall, and re-provision an instance.
///
/// Best-effort sequential: a failed step is logged and the sequence
/// continues unconditionally. There is no rollback — a partial failure can
/// leave the instance half-provisioned.
pub async fn reinstate_instance(
    runner: &dyn CommandRunner,
    config: &Config,
    instance: &str,
) -> String {
    let steps = [
        format!("wsl --unregister {instance}"),
        format!("wsl --install -d {instance}"),
        format!(r#"wsl -d {instance} bash -c "./wslscripts/wsl-install-browsers.sh""#),
    ];

    for step in &steps {
        let result = runner.run(step, config.timeouts.command()).await;
        if !result.succeeded {
            error!(
                instance = %instance,
                step = %step,
                detail = %result.error_detail.as_deref().unwrap_or(""),
                "reinstate step failed, continuing"
            );
        }
    }

    info!(instance = %instance, "reinstated WSL instance");
    format!("Reinstated WSL instance: {instance}")
}

/// Check whether the conventional `C:\WSL\<instance>` folder already exists.
/// Returns the probe's own wording: `exists` or `available`.
pub async fn check_instance_folder(
    runner: &dyn CommandRunner,
    config: &Config,
    instance: &str,
) -> Result<String, String> {
    let wsl_dir = format!(r"c:\WSL\{instance}");
    let result = runner
        .run(
            &format!(r#"if exist "{wsl_dir}" (echo exists) else (echo available)"#),
            config.timeouts.command(),
        )
        .await;

    if result.succeeded {
        Ok(result.stdout.trim().to_string())
    } else {
        let detail = result.error_detail.unwrap_or_default();
        error!(instance = %instance, detail = %detail, "failed to check WSL instance folder");
        Err(format!("Error checking WSL instance folder: {detail}"))
    }
}
