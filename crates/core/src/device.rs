//! Device presence check via the `adb` bridge.

use std::time::Duration;

use tokio::process::Command;

/// Default timeout for `adb devices`.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether `adb devices` output lists at least one ready device.
///
/// The first line is the header; a ready device line reads `<serial>\tdevice`
/// (as opposed to `offline` or `unauthorized`).
pub fn parse_adb_devices(stdout: &str) -> bool {
    stdout
        .trim()
        .lines()
        .skip(1)
        .any(|line| line.contains("\tdevice"))
}

/// Run `<adb> devices` and report whether a device is connected.
///
/// Any failure (missing binary, timeout, non-zero exit) counts as not
/// connected.
pub async fn device_connected(adb: &str, timeout: Duration) -> bool {
    let result = tokio::time::timeout(
        timeout,
        Command::new(adb).arg("devices").kill_on_drop(true).output(),
    )
    .await;

    match result {
        Ok(Ok(output)) if output.status.success() => {
            parse_adb_devices(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(Ok(output)) => {
            tracing::debug!(exit_code = ?output.status.code(), "adb devices failed");
            false
        }
        Ok(Err(e)) => {
            tracing::debug!(error = %e, adb, "Failed to execute adb");
            false
        }
        Err(_) => {
            tracing::debug!(timeout_secs = timeout.as_secs(), "adb devices timed out");
            false
        }
    }
}
