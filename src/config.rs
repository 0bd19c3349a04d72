//! Runtime settings for the codec and the propagator.
//!
//! Every field has a default, so an empty JSON object is a valid settings file.

use serde::{Serialize, Deserialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// IEEE width used when the crate itself chooses how to store a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FloatWidth {
    F32,
    #[default]
    F64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecSettings {
    /// Largest tree (in encoded nodes) a decode will accept.
    pub max_nodes: usize,
    /// Width of float constants and contribution records written by this crate.
    pub float_width: FloatWidth,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self { max_nodes: 1 << 20, float_width: FloatWidth::F64 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationSettings {
    /// Differentiate the tokens of one request on the rayon pool.
    pub parallel: bool,
}

impl Default for PropagationSettings {
    fn default() -> Self {
        Self { parallel: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub codec: CodecSettings,
    pub propagation: PropagationSettings,
}

impl Settings {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
