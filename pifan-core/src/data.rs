//! Core data types for pifan

use pifan_protocol::StatusPayload;
use serde::{Deserialize, Serialize};

/// One full sampling of host metrics. Replaced wholesale on every tick
/// of the monitor loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    /// CPU utilization as a percentage (>= 0, may exceed 100 under
    /// overload since it is derived from the load average)
    pub cpu_percent: f64,
    /// SoC temperature in degrees Celsius, None when unreadable
    pub cpu_temp_c: Option<f64>,
    pub ram_used_mb: u64,
    pub ram_total_mb: u64,
    pub ram_percent: f64,
    pub disk_used_gb: u64,
    pub disk_total_gb: u64,
    pub disk_percent: f64,
}

/// Fan control fields, updated incrementally.
///
/// `manual_on` is written by the control API and survives forced-auto
/// episodes; `forced_auto` and `actual_on` are rewritten by the monitor
/// loop on every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanState {
    /// Last value requested by a caller; persists until overwritten
    pub manual_on: bool,
    /// True iff the temperature was present and above the safety threshold
    pub forced_auto: bool,
    /// The output the actuator is driven to
    pub actual_on: bool,
}

/// The complete shared state: last metrics sample plus fan fields.
///
/// Lives behind the single mutex in [`crate::state::StateStore`]; the
/// two halves are always updated together, so a clone of this struct is
/// an atomically consistent snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedState {
    pub metrics: SystemSnapshot,
    pub fan: FanState,
}

impl SharedState {
    /// Project the state onto the wire representation served to clients.
    pub fn to_status_payload(&self) -> StatusPayload {
        StatusPayload {
            cpu_percent: self.metrics.cpu_percent,
            cpu_temp: self.metrics.cpu_temp_c,
            ram_used_mb: self.metrics.ram_used_mb,
            ram_total_mb: self.metrics.ram_total_mb,
            ram_percent: self.metrics.ram_percent,
            disk_used_gb: self.metrics.disk_used_gb,
            disk_total_gb: self.metrics.disk_total_gb,
            disk_percent: self.metrics.disk_percent,
            fan_actual_on: self.fan.actual_on,
            fan_manual_state: self.fan.manual_on,
            fan_forced_auto: self.fan.forced_auto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lifecycle_state() {
        // Process start: all-zero/false defaults with an absent temperature.
        let state = SharedState::default();
        assert_eq!(state.metrics.cpu_temp_c, None);
        assert_eq!(state.metrics.ram_total_mb, 0);
        assert!(!state.fan.manual_on);
        assert!(!state.fan.forced_auto);
        assert!(!state.fan.actual_on);
    }

    #[test]
    fn test_status_payload_field_mapping() {
        let state = SharedState {
            metrics: SystemSnapshot {
                cpu_percent: 42.0,
                cpu_temp_c: Some(51.2),
                ram_used_mb: 900,
                ram_total_mb: 3792,
                ram_percent: 23.7,
                disk_used_gb: 11,
                disk_total_gb: 29,
                disk_percent: 37.9,
            },
            fan: FanState {
                manual_on: true,
                forced_auto: false,
                actual_on: true,
            },
        };

        let payload = state.to_status_payload();
        assert_eq!(payload.cpu_temp, Some(51.2));
        assert_eq!(payload.ram_used_mb, 900);
        assert!(payload.fan_manual_state);
        assert!(!payload.fan_forced_auto);
        assert!(payload.fan_actual_on);

        // Wire field names are part of the contract with the web layer.
        let json = serde_json::to_string(&payload).unwrap();
        for key in [
            "cpu_percent",
            "cpu_temp",
            "ram_used_mb",
            "ram_total_mb",
            "ram_percent",
            "disk_used_gb",
            "disk_total_gb",
            "disk_percent",
            "fan_actual_on",
            "fan_manual_state",
            "fan_forced_auto",
        ] {
            assert!(json.contains(key), "missing wire field {key}");
        }
    }
}
