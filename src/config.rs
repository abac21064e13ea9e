use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::flow::{OnlineOnly, Passability, ValveGated};
use crate::layout::BBoxLimits;

const API_BASE_ENV: &str = "AQUEDUCT_API_BASE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    /// Company whose topology is shown; `None` lets the backend decide.
    pub scope: Option<String>,
    pub batch_chunk_size: usize,
    pub bbox_max_width: f32,
    pub bbox_max_height: f32,
    pub bbox_padding: f32,
    /// Closed valves stop the flow simulation when set.
    pub valve_gating: bool,
    pub pump_credential: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let limits = BBoxLimits::default();
        Self {
            api_base: "http://localhost:8000/api".to_string(),
            scope: None,
            batch_chunk_size: 8,
            bbox_max_width: limits.max_width,
            bbox_max_height: limits.max_height,
            bbox_padding: 80.0,
            valve_gating: false,
            pump_credential: None,
        }
    }
}

impl Config {
    pub fn load() -> Option<Self> {
        let path = Self::config_path()?;
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "ignoring malformed config");
                None
            }
        }
    }

    /// Apply environment overrides on top of the file.
    pub fn with_env(mut self) -> Self {
        if let Ok(base) = std::env::var(API_BASE_ENV) {
            if !base.trim().is_empty() {
                self.api_base = base.trim().to_string();
            }
        }
        self
    }

    pub fn bbox_limits(&self) -> BBoxLimits {
        BBoxLimits {
            max_width: self.bbox_max_width,
            max_height: self.bbox_max_height,
        }
    }

    pub fn passability(&self) -> Box<dyn Passability> {
        if self.valve_gating {
            Box::new(ValveGated)
        } else {
            Box::new(OnlineOnly)
        }
    }

    fn config_path() -> Option<PathBuf> {
        let dirs = ProjectDirs::from("", "", "aqueduct")?;
        Some(dirs.config_dir().join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"scope": "42", "valve_gating": true}"#).unwrap();
        assert_eq!(config.scope.as_deref(), Some("42"));
        assert!(config.valve_gating);
        assert_eq!(config.batch_chunk_size, 8);
        assert_eq!(config.bbox_limits(), BBoxLimits::default());
    }
}
