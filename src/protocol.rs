//! Request validation and typed protocol messages.
//!
//! Incoming payloads are free-form JSON from the extension. They pass through
//! two stages: [`validate`] checks the shape against the static operation
//! catalog (and never panics — malformed clients get a logged `false`), then
//! [`Request::from_value`] lifts the mapping into a typed enum so dispatch
//! is an exhaustive match rather than a string-comparison chain.

use serde_json::{json, Map, Value};
use tracing::{debug, error};

/// Expected type of a required request field.
///
/// Every current operation takes string fields only; the catalog still
/// records the kind so adding a non-string field is a one-line change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Str,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::Str => value.is_string(),
        }
    }
}

/// One catalog entry: an action name and its required fields.
#[derive(Debug, Clone, Copy)]
pub struct OperationSpec {
    pub action: &'static str,
    pub required: &'static [(&'static str, FieldKind)],
}

/// The operation catalog: every recognized `action` and its field schema.
/// Immutable, consulted by the validator on each request. Names are exact
/// and case-sensitive.
pub const OPERATIONS: &[OperationSpec] = &[
    OperationSpec { action: "ping", required: &[] },
    OperationSpec { action: "getHardwareInfo", required: &[] },
    OperationSpec {
        action: "getBrowserVersion",
        required: &[("registryKey", FieldKind::Str)],
    },
    OperationSpec {
        action: "openInSandbox",
        required: &[("url", FieldKind::Str)],
    },
    OperationSpec {
        action: "runCommand",
        required: &[("command", FieldKind::Str)],
    },
    OperationSpec {
        action: "executePowerShellScript",
        required: &[("scriptPath", FieldKind::Str)],
    },
    OperationSpec { action: "getWSLInstances", required: &[] },
    OperationSpec { action: "createWSLInstance", required: &[] },
    OperationSpec {
        action: "deleteWSLInstance",
        required: &[("instance", FieldKind::Str)],
    },
    OperationSpec {
        action: "reinstateWSLInstance",
        required: &[("instance", FieldKind::Str)],
    },
    OperationSpec {
        action: "checkWSLInstanceFolder",
        required: &[("instance", FieldKind::Str)],
    },
];

fn catalog_entry(action: &str) -> Option<&'static OperationSpec> {
    OPERATIONS.iter().find(|op| op.action == action)
}

/// Validate a decoded request against the catalog.
///
/// Accepts exactly two shapes: an `action` naming a catalog entry with its
/// required fields present and string-typed, or the legacy top-level
/// `command` (a raw shell string, `url` optional). Returns `false` — never
/// panics — on any violation, logging enough context to diagnose the client.
pub fn validate(message: &Value) -> bool {
    let Some(map) = message.as_object() else {
        error!("request is not a JSON object");
        return false;
    };

    if let Some(action) = map.get("action") {
        let Some(action) = action.as_str() else {
            error!("'action' is not a string");
            return false;
        };
        let Some(entry) = catalog_entry(action) else {
            error!(action = %action, "unknown action");
            return false;
        };
        for (field, kind) in entry.required {
            match map.get(*field) {
                Some(value) if kind.matches(value) => {}
                Some(_) => {
                    error!(action = %action, field = %field, "field has wrong type");
                    return false;
                }
                None => {
                    error!(action = %action, field = %field, "missing required field");
                    return false;
                }
            }
        }
        debug!(action = %action, "request validated");
        true
    } else if let Some(command) = map.get("command") {
        if command.is_string() {
            debug!("legacy command request validated");
            true
        } else {
            error!("legacy 'command' is not a string");
            false
        }
    } else {
        error!("request contains neither 'action' nor 'command'");
        false
    }
}

/// A validated request, keyed for exhaustive dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping,
    GetHardwareInfo,
    GetBrowserVersion { registry_key: String },
    OpenInSandbox { url: String },
    RunCommand { command: String, url: Option<String> },
    ExecutePowerShellScript { script_path: String },
    GetWslInstances,
    CreateWslInstance,
    DeleteWslInstance { instance: String },
    ReinstateWslInstance { instance: String },
    CheckWslInstanceFolder { instance: String },
    /// Legacy top-level `command` shape (raw shell string plus optional URL).
    LegacyCommand { command: String, url: Option<String> },
}

impl Request {
    /// Lift a mapping that already passed [`validate`] into the typed enum.
    ///
    /// Returns `None` for shapes the validator rejects; callers treat that
    /// the same as a validation failure.
    pub fn from_value(message: &Value) -> Option<Self> {
        let map = message.as_object()?;

        let field = |name: &str| map.get(name).and_then(Value::as_str).map(str::to_owned);
        let opt_url = field("url");

        if let Some(action) = map.get("action").and_then(Value::as_str) {
            let request = match action {
                "ping" => Self::Ping,
                "getHardwareInfo" => Self::GetHardwareInfo,
                "getBrowserVersion" => Self::GetBrowserVersion {
                    registry_key: field("registryKey")?,
                },
                "openInSandbox" => Self::OpenInSandbox { url: field("url")? },
                "runCommand" => Self::RunCommand {
                    command: field("command")?,
                    url: opt_url,
                },
                "executePowerShellScript" => Self::ExecutePowerShellScript {
                    script_path: field("scriptPath")?,
                },
                "getWSLInstances" => Self::GetWslInstances,
                "createWSLInstance" => Self::CreateWslInstance,
                "deleteWSLInstance" => Self::DeleteWslInstance {
                    instance: field("instance")?,
                },
                "reinstateWSLInstance" => Self::ReinstateWslInstance {
                    instance: field("instance")?,
                },
                "checkWSLInstanceFolder" => Self::CheckWslInstanceFolder {
                    instance: field("instance")?,
                },
                _ => return None,
            };
            Some(request)
        } else if map.get("action").is_some() {
            // `action` present but not a string.
            None
        } else {
            Some(Self::LegacyCommand {
                command: field("command")?,
                url: opt_url,
            })
        }
    }
}

/// `{"result": ...}` success payload.
pub fn result_response(result: impl Into<String>) -> Value {
    json!({ "result": result.into() })
}

/// `{"error": ...}` failure payload.
pub fn error_response(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

/// Sent for any frame that fails decoding or validation.
pub fn invalid_input_response() -> Value {
    error_response("Invalid input")
}

/// Wrap an already-built mapping (used for unwrapped payloads such as
/// hardware info).
pub fn map_response(map: Map<String, Value>) -> Value {
    Value::Object(map)
}
