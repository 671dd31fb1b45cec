//! Platform configuration
//!
//! Static lookup mapping each output slot to the connector and encoder
//! types the platform wires it to, plus the device node path and the
//! framebuffer pixel format. Loadable from a JSON file; every field has a
//! default, so partial files work.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::{ConnectorKind, EncoderKind};
use crate::output::OutputId;

/// Errors that can occur while loading a platform configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Expected pipeline endpoints for one output slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OutputTopology {
    /// Connector type this output is wired to
    pub connector: ConnectorKind,
    /// Encoder type expected to drive that connector
    pub encoder: EncoderKind,
}

/// Platform description for the output manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Mode-setting device node
    pub device_path: PathBuf,
    /// Framebuffer color depth in bits
    pub fb_depth: u32,
    /// Framebuffer bits per pixel
    pub fb_bpp: u32,
    /// Topology of the internal panel
    pub primary: OutputTopology,
    /// Topology of the external connector
    pub external: OutputTopology,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from("/dev/dri/card0"),
            fb_depth: 24,
            fb_bpp: 32,
            primary: OutputTopology {
                connector: ConnectorKind::Edp,
                encoder: EncoderKind::Tmds,
            },
            external: OutputTopology {
                connector: ConnectorKind::HdmiA,
                encoder: EncoderKind::Tmds,
            },
        }
    }
}

impl PlatformConfig {
    /// Load a configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Topology configured for the given output slot.
    pub fn topology(&self, id: OutputId) -> OutputTopology {
        match id {
            OutputId::Primary => self.primary,
            OutputId::External => self.external,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_a_laptop_like_platform() {
        let config = PlatformConfig::default();
        assert_eq!(config.device_path, PathBuf::from("/dev/dri/card0"));
        assert_eq!(config.fb_depth, 24);
        assert_eq!(config.fb_bpp, 32);
        assert_eq!(config.primary.connector, ConnectorKind::Edp);
        assert_eq!(config.external.connector, ConnectorKind::HdmiA);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let parsed: PlatformConfig = serde_json::from_str(
            r#"{
                "device_path": "/dev/dri/card1",
                "external": { "connector": "DisplayPort", "encoder": "Tmds" }
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.device_path, PathBuf::from("/dev/dri/card1"));
        assert_eq!(parsed.external.connector, ConnectorKind::DisplayPort);
        // Untouched fields keep their defaults.
        assert_eq!(parsed.primary.connector, ConnectorKind::Edp);
        assert_eq!(parsed.fb_bpp, 32);
    }

    #[test]
    fn topology_lookup_follows_the_slot() {
        let config = PlatformConfig::default();
        assert_eq!(
            config.topology(OutputId::Primary).connector,
            ConnectorKind::Edp
        );
        assert_eq!(
            config.topology(OutputId::External).connector,
            ConnectorKind::HdmiA
        );
    }
}
