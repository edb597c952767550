//! Request dispatch.
//!
//! Maps each validated [`Request`] to its handler and packages the outcome
//! into a response payload. The match is exhaustive over the request enum —
//! an unknown action cannot reach this point because the validator filters
//! it. No handler error escapes: anything that goes wrong becomes
//! `{"error": message}` and the message loop keeps running.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::config::Config;
use crate::handlers::{hardware, launch, registry, sandbox, script, wsl};
use crate::protocol::{error_response, map_response, result_response, Request};
use crate::runner::CommandRunner;

/// Owns the handler wiring: read-only config plus the runner seam.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<Config>,
    runner: Arc<dyn CommandRunner>,
}

impl Dispatcher {
    pub fn new(config: Arc<Config>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Static host metadata for `ping`. No subprocess involved.
    fn ping_response() -> Value {
        json!({
            "pong": true,
            "system_info": {
                "platform": std::env::consts::OS,
                "version": env!("CARGO_PKG_VERSION"),
                "processor": std::env::consts::ARCH,
                "timestamp": Utc::now().timestamp(),
            }
        })
    }

    /// Run one request to completion and produce exactly one response.
    pub async fn dispatch(&self, request: Request) -> Value {
        let runner = self.runner.as_ref();
        let config = self.config.as_ref();

        match request {
            Request::Ping => Self::ping_response(),

            Request::GetHardwareInfo => {
                // Sent unwrapped: the extension reads the identifiers from
                // the response root.
                map_response(hardware::get_hardware_info(runner, config).await)
            }

            Request::GetBrowserVersion { registry_key } => {
                match registry::get_browser_version(runner, config, &registry_key).await {
                    registry::VersionLookup::Found(version) => json!({ "version": version }),
                    registry::VersionLookup::Failed(message) => error_response(message),
                }
            }

            Request::OpenInSandbox { url } => {
                match sandbox::open_in_sandbox(runner, config, &url).await {
                    Ok(message) => result_response(message),
                    Err(e) => {
                        error!(error = %e, "openInSandbox failed");
                        error_response(format!("Error: Failed to open Windows Sandbox: {e}"))
                    }
                }
            }

            Request::RunCommand { command, url } | Request::LegacyCommand { command, url } => {
                match launch::run_launch_command(runner, config, &command, url.as_deref()).await {
                    Ok(result) => result_response(result),
                    Err(e) => {
                        error!(error = %e, "launch command failed");
                        error_response(e.to_string())
                    }
                }
            }

            Request::ExecutePowerShellScript { script_path } => {
                info!(script = %script_path, "executing PowerShell script request");
                match script::execute_script(runner, config, &script_path).await {
                    Ok(output) => result_response(output),
                    Err(e) => error_response(e.to_string()),
                }
            }

            Request::GetWslInstances => {
                json!({ "instances": wsl::get_instances(runner, config).await })
            }

            Request::CreateWslInstance => result_response(wsl::create_instance()),

            Request::DeleteWslInstance { instance } => {
                match wsl::delete_instance(runner, config, &instance).await {
                    Ok(message) => result_response(message),
                    Err(message) => error_response(message),
                }
            }

            Request::ReinstateWslInstance { instance } => {
                result_response(wsl::reinstate_instance(runner, config, &instance).await)
            }

            Request::CheckWslInstanceFolder { instance } => {
                match wsl::check_instance_folder(runner, config, &instance).await {
                    Ok(answer) => result_response(answer),
                    Err(message) => error_response(message),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::ScriptedRunner;
    use crate::runner::{CommandResult, FailureKind};

    fn dispatcher(runner: ScriptedRunner) -> (Dispatcher, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let dispatcher = Dispatcher::new(Arc::new(Config::default()), runner.clone());
        (dispatcher, runner)
    }

    #[tokio::test]
    async fn ping_is_static_and_stateless() {
        let (dispatcher, runner) = dispatcher(ScriptedRunner::succeeding(&[]));

        for _ in 0..3 {
            let response = dispatcher.dispatch(Request::Ping).await;
            assert_eq!(response["pong"], true);
            let system_info = response["system_info"].as_object().unwrap();
            assert!(!system_info.is_empty());
        }
        // ping never touches the runner.
        assert_eq!(runner.calls(), 0);
    }

    #[tokio::test]
    async fn browser_version_success() {
        let (dispatcher, _) = dispatcher(ScriptedRunner::succeeding(&[
            "HKCU\\Test\\Key\r\n    version    REG_SZ    99.0.1234.56",
        ]));

        let response = dispatcher
            .dispatch(Request::GetBrowserVersion { registry_key: r"HKCU\Test\Key".into() })
            .await;
        assert_eq!(response, json!({ "version": "99.0.1234.56" }));
    }

    #[tokio::test]
    async fn browser_version_malformed_is_error_naming_value() {
        let (dispatcher, _) = dispatcher(ScriptedRunner::succeeding(&[
            "HKCU\\Test\\Key\r\n    version    REG_SZ    latest",
        ]));

        let response = dispatcher
            .dispatch(Request::GetBrowserVersion { registry_key: r"HKCU\Test\Key".into() })
            .await;
        let error = response["error"].as_str().unwrap();
        assert!(error.contains("latest"));
    }

    #[tokio::test]
    async fn legacy_command_returns_result() {
        let (dispatcher, runner) = dispatcher(ScriptedRunner::succeeding(&["hello"]));

        let response = dispatcher
            .dispatch(Request::LegacyCommand { command: "echo hello".into(), url: None })
            .await;
        assert_eq!(response, json!({ "result": "hello" }));
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn hardware_info_is_unwrapped() {
        let (dispatcher, _) = dispatcher(ScriptedRunner::succeeding(&[]));

        let response = dispatcher.dispatch(Request::GetHardwareInfo).await;
        let map = response.as_object().unwrap();
        assert!(map.contains_key("platform"));
        assert!(!map.contains_key("result"));
        assert!(!map.contains_key("error"));
    }

    #[tokio::test]
    async fn wsl_instances_always_lists() {
        let (dispatcher, _) = dispatcher(ScriptedRunner::scripted(vec![
            CommandResult::failed(FailureKind::Spawn, -1, "no wsl"),
        ]));

        let response = dispatcher.dispatch(Request::GetWslInstances).await;
        assert_eq!(response, json!({ "instances": [] }));
    }

    #[tokio::test]
    async fn create_wsl_instance_is_static() {
        let (dispatcher, runner) = dispatcher(ScriptedRunner::succeeding(&[]));

        let response = dispatcher.dispatch(Request::CreateWslInstance).await;
        assert!(response["result"].as_str().unwrap().contains("extension"));
        assert_eq!(runner.calls(), 0);
    }

    #[tokio::test]
    async fn script_failure_becomes_error_response() {
        let (dispatcher, _) = dispatcher(ScriptedRunner::succeeding(&[]));

        let response = dispatcher
            .dispatch(Request::ExecutePowerShellScript {
                script_path: "/nope/missing.ps1".into(),
            })
            .await;
        assert!(response["error"].as_str().unwrap().contains("Script not found"));
    }
}
