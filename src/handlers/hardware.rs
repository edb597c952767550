//! Hardware identifier collection for license validation.
//!
//! Gathers platform facts plus a set of machine identifiers probed through
//! short opaque commands. Partial failure is expected (probes only work on
//! a full Windows install); the handler degrades to a minimal identifier
//! set and never fails entirely. The response is sent unwrapped.

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::Config;
use crate::runner::CommandRunner;

fn hostname() -> String {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn insert(info: &mut Map<String, Value>, key: &str, value: String) {
    info.insert(key.to_string(), Value::String(value));
}

/// Run one identifier probe; extract the value from the second output line
/// (wmic-style `Header\r\nValue` output).
async fn probe_second_line(
    runner: &dyn CommandRunner,
    config: &Config,
    command: &str,
) -> Option<String> {
    let result = runner.run(command, config.timeouts.probe()).await;
    if !result.succeeded {
        warn!(command = %command, "hardware probe failed");
        return None;
    }
    result
        .stdout
        .lines()
        .nth(1)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

async fn volume_serial(runner: &dyn CommandRunner, config: &Config) -> Option<String> {
    // fsutil first, wmic as backup. Both emit the serial in different
    // shapes, so each gets its own extraction.
    let result = runner
        .run("fsutil fsinfo volumeinfo C:", config.timeouts.probe())
        .await;
    if result.succeeded {
        for line in result.stdout.lines() {
            if let Some(rest) = line.split("Volume Serial Number").nth(1) {
                let serial = rest.trim_start_matches([':', ' ']).trim();
                if !serial.is_empty() {
                    return Some(serial.to_string());
                }
            }
        }
    }
    probe_second_line(
        runner,
        config,
        r#"wmic volume where DriveLetter="C:" get SerialNumber"#,
    )
    .await
}

async fn mac_address(runner: &dyn CommandRunner, config: &Config) -> Option<String> {
    let result = runner.run("getmac /NH", config.timeouts.probe()).await;
    if !result.succeeded {
        warn!("MAC address probe failed");
        return None;
    }
    result
        .stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .find(|token| token.contains('-') || token.contains(':'))
        .map(str::to_string)
}

/// Collect the hardware fingerprint. Always returns a non-empty mapping.
pub async fn get_hardware_info(runner: &dyn CommandRunner, config: &Config) -> Map<String, Value> {
    let mut info = Map::new();

    insert(&mut info, "platform", std::env::consts::OS.to_string());
    insert(&mut info, "processor", std::env::consts::ARCH.to_string());
    insert(&mut info, "machine", std::env::consts::ARCH.to_string());
    insert(&mut info, "node", hostname());

    info!("collecting hardware identifiers for license validation");

    let mut probed = 0;
    if let Some(mac) = mac_address(runner, config).await {
        insert(&mut info, "mac", mac);
        probed += 1;
    }
    if let Some(serial) = volume_serial(runner, config).await {
        insert(&mut info, "volume_serial", serial);
        probed += 1;
    }
    if let Some(serial) = probe_second_line(runner, config, "wmic bios get serialnumber").await {
        insert(&mut info, "bios_serial", serial);
        probed += 1;
    }
    if let Some(id) = probe_second_line(runner, config, "wmic cpu get processorid").await {
        insert(&mut info, "cpu_id", id);
        probed += 1;
    }

    // When the probes all miss, fall back to generic host identity so the
    // caller still gets a usable fingerprint.
    if probed == 0 {
        warn!("hardware probes failed, using fallback identifiers");
        insert(&mut info, "hostname", hostname());
    }

    info!(identifiers = info.len(), "hardware info collection complete");
    info
}
