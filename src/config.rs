//! Editor tuning loaded from TOML.

use std::fs;

use camino::Utf8Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::{Point, Size};

/// Thresholds and defaults used by the hit-tester and the gesture machine.
///
/// Every key is optional in the TOML file:
///
/// ```toml
/// port_proximity = 25.0
/// boundary_border = 10.0
/// allow_self_loops = false
/// default_protocol = "HTTPS"
///
/// [node_size]
/// width = 130.0
/// height = 40.0
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Maximum pointer distance to a port that still counts as hitting it.
    pub port_proximity: f32,
    /// Thickness of the clickable band around a placed boundary.
    pub boundary_border: f32,
    /// Maximum pointer distance to a connection segment.
    pub connection_tolerance: f32,
    pub allow_self_loops: bool,
    /// Where palette templates land on the working surface.
    pub drop_position: Point,
    /// Vertical gap between stacked additional ports.
    pub port_spacing: f32,
    pub node_size: Size,
    pub boundary_size: Size,
    /// Protocol assigned to freshly drawn connections.
    pub default_protocol: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            port_proximity: 25.0,
            boundary_border: 10.0,
            connection_tolerance: 6.0,
            allow_self_loops: false,
            drop_position: Point::new(50.0, 50.0),
            port_spacing: 15.0,
            node_size: Size::new(130.0, 40.0),
            boundary_size: Size::new(300.0, 200.0),
            default_protocol: "HTTP".to_string(),
        }
    }
}

impl EditorConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingFile(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}
