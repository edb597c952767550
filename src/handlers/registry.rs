//! Browser version lookup via registry query.
//!
//! The query itself is an opaque `reg query` invocation; this module owns
//! the not-found fallback to the WOW6432Node sibling key and the strict
//! version-format validation on whatever comes back.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::runner::{CommandResult, CommandRunner};

/// Outcome of a version lookup, mapped by the dispatcher into
/// `{version}` or `{error}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionLookup {
    Found(String),
    Failed(String),
}

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+\.\d+$").expect("valid version pattern"))
}

fn query_failed(result: &CommandResult) -> bool {
    !result.succeeded
        || result.stdout.contains("ERROR")
        || result.stdout.contains("The system was unable to find")
}

/// Query the browser version under `registry_key`, falling back to the
/// `WOW6432Node` path when the direct key is absent.
pub async fn get_browser_version(
    runner: &dyn CommandRunner,
    config: &Config,
    registry_key: &str,
) -> VersionLookup {
    let command = format!(r#"reg query "{registry_key}" /v version"#);
    debug!(command = %command, "querying registry");
    let mut result = runner.run(&command, config.timeouts.command()).await;

    if query_failed(&result) && !registry_key.contains("WOW6432Node") {
        let wow64_key = registry_key.replace("Software\\", "Software\\WOW6432Node\\");
        let command = format!(r#"reg query "{wow64_key}" /v version"#);
        debug!(command = %command, "direct key missed, trying WOW6432Node");
        result = runner.run(&command, config.timeouts.command()).await;
    }

    if query_failed(&result) {
        warn!(key = %registry_key, "registry key not found");
        return VersionLookup::Failed(format!("Registry key not found: {registry_key}"));
    }

    for line in result.stdout.lines() {
        if !line.to_lowercase().contains("version") {
            continue;
        }
        let Some(candidate) = line.split_whitespace().last() else {
            continue;
        };
        if version_pattern().is_match(candidate) {
            debug!(version = %candidate, "extracted browser version");
            return VersionLookup::Found(candidate.to_string());
        }
        warn!(value = %candidate, "invalid version format in registry output");
        return VersionLookup::Failed(format!("Invalid version format: {candidate}"));
    }

    warn!(key = %registry_key, "version value missing from registry output");
    VersionLookup::Failed("Version not found in registry output".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::ScriptedRunner;

    fn reg_output(version: &str) -> String {
        format!(
            "HKEY_CURRENT_USER\\Software\\Test\\Key\r\n    version    REG_SZ    {version}\r\n"
        )
    }

    #[tokio::test]
    async fn extracts_valid_version() {
        let runner = ScriptedRunner::succeeding(&[&reg_output("99.0.1234.56")]);
        let config = Config::default();

        let lookup =
            get_browser_version(&runner, &config, r"HKCU\Software\Test\Key").await;
        assert_eq!(lookup, VersionLookup::Found("99.0.1234.56".to_string()));
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn rejects_malformed_version() {
        let runner = ScriptedRunner::succeeding(&[&reg_output("ninety-nine")]);
        let config = Config::default();

        let lookup =
            get_browser_version(&runner, &config, r"HKCU\Software\Test\Key").await;
        let VersionLookup::Failed(message) = lookup else {
            panic!("expected failure");
        };
        assert!(message.contains("ninety-nine"));
    }

    #[tokio::test]
    async fn falls_back_to_wow6432node() {
        let runner = ScriptedRunner::scripted(vec![
            CommandResult::failed(crate::runner::FailureKind::NonZeroExit, 1, "not found"),
            CommandResult::ok(reg_output("120.0.6099.71")),
        ]);
        let config = Config::default();

        let lookup =
            get_browser_version(&runner, &config, r"HKCU\Software\Google\Chrome\BLBeacon").await;
        assert_eq!(lookup, VersionLookup::Found("120.0.6099.71".to_string()));
        assert_eq!(runner.calls(), 2);
        assert!(runner.last_command().contains("WOW6432Node"));
    }

    #[tokio::test]
    async fn no_second_query_for_wow6432node_keys() {
        let runner = ScriptedRunner::scripted(vec![CommandResult::failed(
            crate::runner::FailureKind::NonZeroExit,
            1,
            "not found",
        )]);
        let config = Config::default();

        let lookup = get_browser_version(
            &runner,
            &config,
            r"HKCU\Software\WOW6432Node\Google\Chrome\BLBeacon",
        )
        .await;
        assert!(matches!(lookup, VersionLookup::Failed(_)));
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn missing_version_line_is_failure() {
        let runner = ScriptedRunner::succeeding(&["HKEY_CURRENT_USER\\Software\\Test\\Key\r\n"]);
        let config = Config::default();

        let lookup =
            get_browser_version(&runner, &config, r"HKCU\Software\Test\Key").await;
        assert_eq!(
            lookup,
            VersionLookup::Failed("Version not found in registry output".to_string())
        );
    }
}
