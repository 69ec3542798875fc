//! Engine configuration
//!
//! Loaded from JSON by the host application. Every field except the endpoint
//! lists has a default so a minimal file only needs `inputs` and `outputs`.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sis_protocol::command::MAX_SLOT;
use sis_protocol::Dialect;

use crate::error::MatrixError;

/// One configured input or output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointConfig {
    /// 1-based slot number on the device
    pub slot: u16,
    /// Display name
    pub name: String,
    /// Name used for video routing (defaults to `<name>-Video`)
    #[serde(default)]
    pub video_name: Option<String>,
    /// Name used for audio routing (defaults to `<name>-Audio`)
    #[serde(default)]
    pub audio_name: Option<String>,
}

impl EndpointConfig {
    pub fn new(slot: u16, name: impl Into<String>) -> Self {
        Self {
            slot,
            name: name.into(),
            video_name: None,
            audio_name: None,
        }
    }

    pub fn video_display_name(&self) -> String {
        self.video_name
            .clone()
            .unwrap_or_else(|| format!("{}-Video", self.name))
    }

    pub fn audio_display_name(&self) -> String {
        self.audio_name
            .clone()
            .unwrap_or_else(|| format!("{}-Audio", self.name))
    }
}

/// Session engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatrixConfig {
    /// Device family
    #[serde(default)]
    pub dialect: Dialect,
    /// Configured inputs, in display order
    #[serde(default)]
    pub inputs: Vec<EndpointConfig>,
    /// Configured outputs, in display order
    #[serde(default)]
    pub outputs: Vec<EndpointConfig>,
    /// Interval between liveness polls (firmware + sync)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Delay between the end of the initial poll and route-ready
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Minimum gap between two transmitted commands
    #[serde(default = "default_command_spacing_ms")]
    pub command_spacing_ms: u64,
    /// Delay before reconnecting after the link drops
    #[serde(default = "default_reconnect_ms")]
    pub reconnect_ms: u64,
    /// Sent when the device asks for a user name
    #[serde(default)]
    pub username: Option<String>,
    /// Sent when the device asks for a password
    #[serde(default)]
    pub password: Option<String>,
    /// Synthesize route feedback locally for every tie
    #[serde(default)]
    pub virtual_mode: bool,
    /// Source name reported for outputs with no (or an unknown) input
    #[serde(default = "default_no_route_text")]
    pub no_route_text: String,
}

fn default_poll_interval_ms() -> u64 {
    30_000
}

fn default_settle_ms() -> u64 {
    10_000
}

fn default_command_spacing_ms() -> u64 {
    50
}

fn default_reconnect_ms() -> u64 {
    5_000
}

fn default_no_route_text() -> String {
    "No Source".to_string()
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_ms: default_settle_ms(),
            command_spacing_ms: default_command_spacing_ms(),
            reconnect_ms: default_reconnect_ms(),
            username: None,
            password: None,
            virtual_mode: false,
            no_route_text: default_no_route_text(),
        }
    }
}

impl MatrixConfig {
    /// Configuration with `inputs` and `outputs` named `Input N` / `Output N`
    pub fn with_counts(dialect: Dialect, inputs: u16, outputs: u16) -> Self {
        Self {
            dialect,
            inputs: (1..=inputs)
                .map(|n| EndpointConfig::new(n, format!("Input {n}")))
                .collect(),
            outputs: (1..=outputs)
                .map(|n| EndpointConfig::new(n, format!("Output {n}")))
                .collect(),
            ..Default::default()
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, MatrixError> {
        let config: MatrixConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MatrixError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Reject slot numbers the protocol cannot address and duplicates
    pub fn validate(&self) -> Result<(), MatrixError> {
        validate_endpoints("input", &self.inputs)?;
        validate_endpoints("output", &self.outputs)?;
        if self.poll_interval_ms == 0 {
            return Err(MatrixError::Config("poll_interval_ms must be nonzero".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn command_spacing(&self) -> Duration {
        Duration::from_millis(self.command_spacing_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }
}

fn validate_endpoints(kind: &str, endpoints: &[EndpointConfig]) -> Result<(), MatrixError> {
    let mut seen = HashSet::new();
    for endpoint in endpoints {
        if endpoint.slot == 0 || endpoint.slot > MAX_SLOT {
            return Err(MatrixError::Config(format!(
                "{} '{}' has slot {}, expected 1..={}",
                kind, endpoint.name, endpoint.slot, MAX_SLOT
            )));
        }
        if !seen.insert(endpoint.slot) {
            return Err(MatrixError::Config(format!(
                "duplicate {} slot {}",
                kind, endpoint.slot
            )));
        }
    }
    Ok(())
}

/// How to reach the device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionConfig {
    /// Telnet-style TCP control port
    Tcp {
        host: String,
        #[serde(default = "default_tcp_port")]
        port: u16,
    },
    /// RS-232 control port
    Serial {
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
}

fn default_tcp_port() -> u16 {
    23
}

fn default_baud_rate() -> u32 {
    9600
}

impl ConnectionConfig {
    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            ConnectionConfig::Tcp { host, port } => format!("tcp://{}:{}", host, port),
            ConnectionConfig::Serial { port, baud_rate } => {
                format!("{} @ {} baud", port, baud_rate)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config = MatrixConfig::from_json(
            r#"{ "inputs": [{ "slot": 1, "name": "Laptop" }], "outputs": [{ "slot": 1, "name": "Projector" }] }"#,
        )
        .unwrap();
        assert_eq!(config.dialect, Dialect::AvMatrix);
        assert_eq!(config.poll_interval_ms, 30_000);
        assert_eq!(config.settle_ms, 10_000);
        assert_eq!(config.command_spacing_ms, 50);
        assert_eq!(config.no_route_text, "No Source");
        assert!(!config.virtual_mode);
        assert_eq!(config.inputs[0].video_display_name(), "Laptop-Video");
        assert_eq!(config.inputs[0].audio_display_name(), "Laptop-Audio");
    }

    #[test]
    fn test_explicit_names_and_dialect() {
        let config = MatrixConfig::from_json(
            r#"{
                "dialect": "xtp",
                "inputs": [{ "slot": 3, "name": "Cam", "video_name": "Camera", "audio_name": "Mic" }],
                "outputs": [],
                "virtual_mode": true
            }"#,
        )
        .unwrap();
        assert_eq!(config.dialect, Dialect::Xtp);
        assert_eq!(config.inputs[0].video_display_name(), "Camera");
        assert_eq!(config.inputs[0].audio_display_name(), "Mic");
        assert!(config.virtual_mode);
    }

    #[test]
    fn test_validation() {
        let mut config = MatrixConfig::with_counts(Dialect::AvMatrix, 4, 4);
        assert!(config.validate().is_ok());

        config.inputs.push(EndpointConfig::new(2, "Again"));
        assert!(matches!(config.validate(), Err(MatrixError::Config(_))));

        let mut config = MatrixConfig::with_counts(Dialect::AvMatrix, 1, 1);
        config.outputs.push(EndpointConfig::new(0, "Zero"));
        assert!(config.validate().is_err());

        let mut config = MatrixConfig::with_counts(Dialect::AvMatrix, 1, 1);
        config.outputs.push(EndpointConfig::new(100, "Hundred"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connection_config_json() {
        let tcp: ConnectionConfig =
            serde_json::from_str(r#"{ "type": "tcp", "host": "10.0.0.5" }"#).unwrap();
        assert_eq!(
            tcp,
            ConnectionConfig::Tcp {
                host: "10.0.0.5".into(),
                port: 23
            }
        );
        let serial: ConnectionConfig =
            serde_json::from_str(r#"{ "type": "serial", "port": "/dev/ttyUSB0" }"#).unwrap();
        assert_eq!(serial.describe(), "/dev/ttyUSB0 @ 9600 baud");
    }
}
