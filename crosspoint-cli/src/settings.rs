//! Application settings

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sis_matrix::{ConnectionConfig, MatrixConfig};

/// How to reach the switcher
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkSettings {
    /// A device reached over TCP (usually the telnet port)
    Tcp {
        host: String,
        #[serde(default = "default_tcp_port")]
        port: u16,
    },
    /// A device on a serial port
    Serial {
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// An in-process simulated switcher
    Simulated {
        #[serde(default = "default_sim_inputs")]
        inputs: u16,
        #[serde(default = "default_sim_outputs")]
        outputs: u16,
        /// Password the simulator demands
        #[serde(default)]
        password: Option<String>,
    },
}

fn default_tcp_port() -> u16 {
    23
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_sim_inputs() -> u16 {
    8
}

fn default_sim_outputs() -> u16 {
    4
}

impl Default for LinkSettings {
    fn default() -> Self {
        LinkSettings::Simulated {
            inputs: default_sim_inputs(),
            outputs: default_sim_outputs(),
            password: None,
        }
    }
}

impl LinkSettings {
    /// Transport configuration for a real device
    pub fn connection(&self) -> Option<ConnectionConfig> {
        match self {
            LinkSettings::Tcp { host, port } => Some(ConnectionConfig::Tcp {
                host: host.clone(),
                port: *port,
            }),
            LinkSettings::Serial { port, baud_rate } => Some(ConnectionConfig::Serial {
                port: port.clone(),
                baud_rate: *baud_rate,
            }),
            LinkSettings::Simulated { .. } => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            LinkSettings::Tcp { .. } | LinkSettings::Serial { .. } => self
                .connection()
                .map(|c| c.describe())
                .unwrap_or_default(),
            LinkSettings::Simulated {
                inputs, outputs, ..
            } => format!("simulated {}x{} matrix", inputs, outputs),
        }
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Session engine configuration
    #[serde(default = "default_matrix")]
    pub matrix: MatrixConfig,
    /// Connection to the switcher
    #[serde(default)]
    pub link: LinkSettings,
    /// Print every line sent and received
    #[serde(default)]
    pub show_traffic: bool,
}

fn default_matrix() -> MatrixConfig {
    MatrixConfig::with_counts(Default::default(), default_sim_inputs(), default_sim_outputs())
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            matrix: default_matrix(),
            link: LinkSettings::default(),
            show_traffic: false,
        }
    }
}

impl Settings {
    /// Get the XDG config directory for crosspoint
    /// Uses $XDG_CONFIG_HOME/crosspoint on Linux/macOS, falls back to ~/.config/crosspoint
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("crosspoint"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("crosspoint"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from the default location, or defaults if there are none
    pub fn load() -> Self {
        Self::settings_path()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Load settings from an explicit file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid settings in {}", path.display()))
    }

    /// Save settings to `path`, or to the default location
    pub fn save(&self, path: Option<&Path>) -> anyhow::Result<PathBuf> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::settings_path().context("Could not determine settings path")?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_settings_json() {
        let link: LinkSettings =
            serde_json::from_str(r#"{"type":"tcp","host":"10.0.0.5"}"#).unwrap();
        assert_eq!(
            link.connection(),
            Some(ConnectionConfig::Tcp {
                host: "10.0.0.5".into(),
                port: 23
            })
        );

        let settings: Settings = serde_json::from_str(
            r#"{"link":{"type":"simulated","inputs":16,"outputs":8,"password":"pw"}}"#,
        )
        .unwrap();
        assert_eq!(
            settings.link,
            LinkSettings::Simulated {
                inputs: 16,
                outputs: 8,
                password: Some("pw".into())
            }
        );
        assert_eq!(settings.matrix.outputs.len(), 4);
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("crosspoint-test-{}", std::process::id()));
        let path = dir.join("settings.json");
        let mut settings = Settings::default();
        settings.show_traffic = true;
        settings.save(Some(&path)).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
        let _ = std::fs::remove_dir_all(dir);
    }
}
