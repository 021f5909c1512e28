/// Utility functions for formatting and device identity
use log::warn;
use std::fs;
use time::{format_description, OffsetDateTime};

const CPUINFO_PATH: &str = "/proc/cpuinfo";
const MACHINE_ID_PATH: &str = "/etc/machine-id";

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    match format_description::parse("[day].[month].[year] - [hour]:[minute]:[second]") {
        Ok(format) => dt.format(&format).unwrap_or_else(|_| dt.to_string()),
        Err(_) => dt.to_string(),
    }
}

/// Convert a time::Duration to seconds as u64, clamping negatives to zero
pub fn duration_to_seconds(duration: time::Duration) -> u64 {
    duration.whole_seconds().max(0) as u64
}

/// Resolve the stable device identifier attached to every payload
///
/// Order: explicit override, the board serial from /proc/cpuinfo, then the
/// systemd machine id. Returns "unknown" only if all sources are missing.
pub fn resolve_device_id(override_id: Option<&str>) -> String {
    if let Some(id) = override_id {
        return id.trim().to_string();
    }

    if let Some(serial) = fs::read_to_string(CPUINFO_PATH)
        .ok()
        .and_then(|contents| cpu_serial(&contents))
    {
        return serial;
    }

    match fs::read_to_string(MACHINE_ID_PATH) {
        Ok(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => {
            warn!("No hardware identity found, using 'unknown'");
            "unknown".to_string()
        }
    }
}

/// Extract the board serial from /proc/cpuinfo contents, without leading zeros
pub fn cpu_serial(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .find(|line| line.starts_with("Serial"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, value)| value.trim().trim_start_matches('0').to_string())
        .filter(|serial| !serial.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn formats_datetime_for_logs() {
        let dt = datetime!(2024-03-07 09:05:01 UTC);
        assert_eq!(format_datetime(&dt), "07.03.2024 - 09:05:01");
    }

    #[test]
    fn negative_duration_clamps_to_zero() {
        assert_eq!(duration_to_seconds(time::Duration::seconds(-3)), 0);
        assert_eq!(duration_to_seconds(time::Duration::seconds(42)), 42);
    }

    #[test]
    fn extracts_cpu_serial() {
        let cpuinfo = "processor\t: 0\nHardware\t: BCM2835\nSerial\t\t: 00000000a1b2c3d4\nModel\t\t: Raspberry Pi\n";
        assert_eq!(cpu_serial(cpuinfo).as_deref(), Some("a1b2c3d4"));
        assert_eq!(cpu_serial("processor\t: 0\n"), None);
    }

    #[test]
    fn override_wins() {
        assert_eq!(resolve_device_id(Some(" 13377 ")), "13377");
    }
}
