use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, time::Duration};

use crate::{
    bridge::{RetryPolicy, SyncSettings},
    error::{BridgeError, Result},
    protocol::modbus::SerialConfig,
};

/// Serial parity as written in the config file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParitySetting {
    #[default]
    None,
    Even,
    Odd,
}

impl fmt::Display for ParitySetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParitySetting::None => write!(f, "none"),
            ParitySetting::Even => write!(f, "even"),
            ParitySetting::Odd => write!(f, "odd"),
        }
    }
}

impl From<ParitySetting> for serialport::Parity {
    fn from(parity: ParitySetting) -> Self {
        match parity {
            ParitySetting::None => serialport::Parity::None,
            ParitySetting::Even => serialport::Parity::Even,
            ParitySetting::Odd => serialport::Parity::Odd,
        }
    }
}

/// Root configuration. Every field has a default, so a config file only
/// needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Serial device of the controller
    pub port_name: String,
    pub baud_rate: u32,
    pub parity: ParitySetting,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub slave_id: u8,
    /// Serial read timeout in milliseconds
    pub serial_timeout_ms: u64,
    /// Operator console endpoint
    pub websocket_url: String,
    /// How long the link thread waits for an inbound frame before flushing
    /// outbound messages again
    pub ws_read_timeout_ms: u64,
    /// Upper bound on a single console send
    pub ws_write_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub heartbeat_cycles: u64,
    pub manual_refresh_cycles: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Persisted tip-active flags, read once at startup
    pub tip_state_file: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port_name: "/tmp/vserial2".to_string(),
            baud_rate: 9600,
            parity: ParitySetting::None,
            data_bits: 8,
            stop_bits: 1,
            slave_id: 1,
            serial_timeout_ms: 100,
            websocket_url: "ws://localhost:8080".to_string(),
            ws_read_timeout_ms: 10,
            ws_write_timeout_ms: 1000,
            poll_interval_ms: 20,
            heartbeat_cycles: 100,
            manual_refresh_cycles: 5,
            retry_attempts: 3,
            retry_backoff_ms: 10,
            tip_state_file: PathBuf::from("tip_states.json"),
        }
    }
}

impl BridgeConfig {
    /// Parse configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from a file
    pub fn from_file(file_path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        Self::from_json(&content)
    }

    /// Convert to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.slave_id == 0 || self.slave_id > 247 {
            return Err(BridgeError::Config(format!(
                "slave id {} outside 1..=247",
                self.slave_id
            )));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(BridgeError::Config(format!(
                "data bits must be 5..=8, got {}",
                self.data_bits
            )));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(BridgeError::Config(format!(
                "stop bits must be 1 or 2, got {}",
                self.stop_bits
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(BridgeError::Config("poll interval must be positive".into()));
        }
        if self.serial_timeout_ms == 0 {
            return Err(BridgeError::Config("serial timeout must be positive".into()));
        }
        // std rejects a zero socket timeout
        if self.ws_read_timeout_ms == 0 || self.ws_write_timeout_ms == 0 {
            return Err(BridgeError::Config(
                "websocket read and write timeouts must be positive".into(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(BridgeError::Config("retry attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            baud: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity.into(),
            timeout: Duration::from_millis(self.serial_timeout_ms),
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            slave_id: self.slave_id,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            heartbeat_cycles: self.heartbeat_cycles,
            manual_refresh_cycles: self.manual_refresh_cycles,
            retry: RetryPolicy {
                max_attempts: self.retry_attempts,
                backoff: Duration::from_millis(self.retry_backoff_ms),
            },
        }
    }

    pub fn ws_read_timeout(&self) -> Duration {
        Duration::from_millis(self.ws_read_timeout_ms)
    }

    pub fn ws_write_timeout(&self) -> Duration {
        Duration::from_millis(self.ws_write_timeout_ms)
    }
}
