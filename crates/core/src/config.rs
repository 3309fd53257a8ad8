use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::{GridError, GridPosition, LedColor};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Launcher configuration file format
///
/// ```json
/// {
///   "device": { "input": "LPX MIDI", "output": "LPX MIDI" },
///   "macros": [
///     {
///       "name": "OpenLink",
///       "actions": [{ "name": "run", "position": [0, 0], "color": 5, "exclusive": false }],
///       "args": { "url": "https://example.org" }
///     }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaunchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceConfig>,
    #[serde(default)]
    pub macros: Vec<MacroDescriptor>,
}

/// MIDI port names, as listed by `--list-ports`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    pub input: String,
    pub output: String,
}

/// One action group instance and the pads it binds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MacroDescriptor {
    /// Action group identifier, e.g. `"Paint"`
    pub name: String,
    #[serde(default)]
    pub actions: Vec<ActionEntry>,
    /// Group-specific arguments, decoded by the group itself
    #[serde(default)]
    pub args: serde_json::Value,
}

/// A pad binding as written in the file.
///
/// Position and color are kept as raw integers so that one bad entry can be
/// reported and skipped without rejecting the whole file. The same goes for
/// the mode flags: `blocking` is the older spelling of `exclusive`, and an
/// entry that sets both is skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionEntry {
    /// Action name within the group, e.g. `"run"`
    pub name: String,
    pub position: [i64; 2],
    pub color: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking: Option<bool>,
}

/// An entry set both `exclusive` and `blocking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("both 'exclusive' and 'blocking' are set; use only 'exclusive'")]
pub struct ConflictingModeFlags;

impl ActionEntry {
    pub fn grid_position(&self) -> Result<GridPosition, GridError> {
        let [row, col] = self.position;
        match (u8::try_from(row), u8::try_from(col)) {
            (Ok(r), Ok(c)) => GridPosition::new(r, c),
            _ => Err(GridError::OutOfBounds { row, col }),
        }
    }

    pub fn led_color(&self) -> Result<LedColor, GridError> {
        u8::try_from(self.color)
            .map_err(|_| GridError::InvalidColor(self.color))
            .and_then(LedColor::new)
    }

    /// Whether the pad launches an exclusive action. Unset means fire-and-forget.
    pub fn is_exclusive(&self) -> Result<bool, ConflictingModeFlags> {
        match (self.exclusive, self.blocking) {
            (Some(_), Some(_)) => Err(ConflictingModeFlags),
            (Some(flag), None) | (None, Some(flag)) => Ok(flag),
            (None, None) => Ok(false),
        }
    }
}

impl LaunchConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Write configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Check every entry against the grid bounds and look for pads bound twice.
    ///
    /// Problems are not fatal: bad entries are skipped at load time and a
    /// duplicate pad simply keeps its last binding.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let mut seen = std::collections::HashMap::new();

        for descriptor in &self.macros {
            for entry in &descriptor.actions {
                let label = format!("{}.{}", descriptor.name, entry.name);
                match entry.grid_position() {
                    Ok(pos) => {
                        if let Some(previous) = seen.insert(pos, label.clone()) {
                            errors.push(format!(
                                "{} rebinds pad {} (previously {})",
                                label, pos, previous
                            ));
                        }
                    }
                    Err(e) => errors.push(format!("{}: {}", label, e)),
                }
                if let Err(e) = entry.led_color() {
                    errors.push(format!("{}: {}", label, e));
                }
                if let Err(e) = entry.is_exclusive() {
                    errors.push(format!("{}: {}", label, e));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {message}")]
    ReadError { path: PathBuf, message: String },

    #[error("Failed to write config file {path:?}: {message}")]
    WriteError { path: PathBuf, message: String },

    #[error("Failed to parse config file: {0}")]
    ParseError(String),

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const SAMPLE: &str = r#"{
        "device": { "input": "LPX MIDI In", "output": "LPX MIDI Out" },
        "macros": [
            {
                "name": "OpenLink",
                "actions": [{ "name": "run", "position": [0, 0], "color": 5, "blocking": false }],
                "args": { "url": "https://example.org" }
            },
            {
                "name": "Paint",
                "actions": [{ "name": "run", "position": [7, 7], "color": 21, "exclusive": true }]
            }
        ]
    }"#;

    #[test]
    fn test_parse_sample() {
        let config = LaunchConfig::from_json(SAMPLE).unwrap();
        assert_eq!(
            config.device,
            Some(DeviceConfig {
                input: "LPX MIDI In".to_string(),
                output: "LPX MIDI Out".to_string(),
            })
        );
        assert_eq!(config.macros.len(), 2);
        assert_eq!(config.macros[0].actions[0].is_exclusive(), Ok(false));
        assert_eq!(config.macros[1].actions[0].is_exclusive(), Ok(true));
        assert!(config.macros[1].args.is_null());
        assert_eq!(
            config.macros[1].actions[0].grid_position().unwrap(),
            GridPosition::new(7, 7).unwrap()
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_top_level_keys_rejected() {
        let err = LaunchConfig::from_json(r#"{ "macros": [], "extra": 1 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validation_reports_bad_entries() {
        let config = LaunchConfig::from_json(
            r#"{ "macros": [{ "name": "A", "actions": [
                { "name": "x", "position": [8, 0], "color": 5 },
                { "name": "y", "position": [1, 1], "color": 300 },
                { "name": "z", "position": [1, 1], "color": 3 },
                { "name": "w", "position": [-1, 2], "color": 3 }
            ] }] }"#,
        )
        .unwrap();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4, "{:?}", errors);
        assert!(errors.iter().any(|e| e.contains("A.z rebinds pad (1, 1)")));
        assert!(errors.iter().any(|e| e.contains("A.w: grid position (-1, 2)")));
        assert!(errors.iter().any(|e| e.contains("A.y: LED color 300")));
    }

    #[test]
    fn test_out_of_range_values_keep_their_value() {
        let entry = ActionEntry {
            name: "run".to_string(),
            position: [-1, 300],
            color: -5,
            ..Default::default()
        };
        assert_eq!(
            entry.grid_position(),
            Err(GridError::OutOfBounds { row: -1, col: 300 })
        );
        assert_eq!(entry.led_color(), Err(GridError::InvalidColor(-5)));
    }

    #[test]
    fn test_both_mode_flags_flag_only_that_entry() {
        let config = LaunchConfig::from_json(
            r#"{ "macros": [{ "name": "A", "actions": [
                { "name": "x", "position": [0, 0], "color": 5, "exclusive": true, "blocking": true },
                { "name": "y", "position": [0, 1], "color": 5, "blocking": true }
            ] }] }"#,
        )
        .unwrap();

        let actions = &config.macros[0].actions;
        assert_eq!(actions[0].is_exclusive(), Err(ConflictingModeFlags));
        assert_eq!(actions[1].is_exclusive(), Ok(true));

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(errors[0].starts_with("A.x: both 'exclusive' and 'blocking'"));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.json");

        let config = LaunchConfig::from_json(SAMPLE).unwrap();
        config.save(&config_path).unwrap();

        let loaded = LaunchConfig::load(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = LaunchConfig::load(&temp_dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
