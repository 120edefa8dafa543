//! Controller configuration.

use std::path::Path;

use serde::Deserialize;

use crate::error::{ControllerError, ControllerResult};

/// Configuration for the Quarry Controller.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Range of TCP ports auto-allocated for resource replication.
    #[serde(rename = "port-range")]
    #[serde(default = "default_port_range")]
    pub port_range: PortRange,

    /// Range of device minor numbers auto-allocated for volumes.
    #[serde(rename = "minor-range")]
    #[serde(default = "default_minor_range")]
    pub minor_range: MinorRange,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MinorRange {
    pub start: u32,
    pub end: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port_range: default_port_range(),
            minor_range: default_minor_range(),
        }
    }
}

fn default_port_range() -> PortRange {
    PortRange {
        start: 7000,
        end: 7999,
    }
}

fn default_minor_range() -> MinorRange {
    MinorRange {
        start: 1000,
        end: 49999,
    }
}

pub fn load_config_from_path(path: &Path) -> ControllerResult<Config> {
    tracing::info!("Using configuration: {:?}", path);

    let config = std::fs::read_to_string(path).map_err(ControllerError::config_error)?;
    toml::from_str(&config).map_err(ControllerError::config_error)
}

pub fn load_config_from_str(s: &str) -> ControllerResult<Config> {
    toml::from_str(s).map_err(ControllerError::config_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(7000, config.port_range.start);
        assert_eq!(7999, config.port_range.end);
        assert_eq!(1000, config.minor_range.start);
        assert_eq!(49999, config.minor_range.end);
    }

    #[test]
    fn test_explicit_ranges() {
        let config = load_config_from_str(
            r#"
[port-range]
start = 7100
end = 7200

[minor-range]
start = 2000
end = 2999
"#,
        )
        .unwrap();
        assert_eq!(7100, config.port_range.start);
        assert_eq!(2999, config.minor_range.end);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        load_config_from_str("unknown-key = 1").unwrap_err();
    }
}
