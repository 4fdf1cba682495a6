// Serial defaults, heartbeat timing and bus configuration
use std::time::Duration;

use serde::{Deserialize, Serialize};

// Serial port used when none is given
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

// Factory baud rate of most Dynamixel motors
pub const DEFAULT_BAUDRATE: u32 = 57_600;

// Serial read timeout; an exchange that exceeds it is reported as NoResponse
pub const DEFAULT_TIMEOUT_MS: u64 = 50;

// Keep-alive period for 3mxl boards
/// Shortest keep-alive interval; anything faster would monopolize the bus
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

// Register the keep-alive writes 1 into
pub const HEARTBEAT_REGISTER: &str = "NO_INSTRUCTION";

/// What a motor does when the bus reports a failed exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommErrorPolicy {
    /// Log and count the fault, then carry on: writes succeed, reads yield 0.
    #[default]
    Report,
    /// Return the fault to the caller as `DynioError::Comm`.
    Escalate,
}

/// Settings for opening a bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub port: String,
    pub baud_rate: u32,
    pub timeout_ms: u64,
    pub comm_errors: CommErrorPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUDRATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            comm_errors: CommErrorPolicy::default(),
        }
    }
}

impl BusConfig {
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg = BusConfig::from_json_str(r#"{ "port": "COM3", "comm_errors": "escalate" }"#)
            .unwrap();
        assert_eq!(cfg.port, "COM3");
        assert_eq!(cfg.baud_rate, DEFAULT_BAUDRATE);
        assert_eq!(cfg.timeout(), Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert_eq!(cfg.comm_errors, CommErrorPolicy::Escalate);
    }

    #[test]
    fn default_policy_reports() {
        assert_eq!(BusConfig::default().comm_errors, CommErrorPolicy::Report);
    }
}
