// Kbstate Settings Module
// Keyboard defaults loaded from a TOML file

#![cfg(feature = "config")]

use std::path::{Path, PathBuf};

use crate::keymap::RuleNames;
use crate::repeat::{RepeatInfo, DEFAULT_REPEAT_DELAY, DEFAULT_REPEAT_RATE};

/// Keyboard defaults
///
/// These settings are loaded from a TOML file (default: ~/.config/kbstate/settings.toml):
///
/// ```toml
/// [repeat]
/// rate = 25
/// delay = 600
///
/// [keymap]
/// layout = "us"
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    repeat: RepeatInfo,

    /// Keymap names (rules, model, layout, variant, options)
    keymap: RuleNames,

    /// Path to the settings file (for reload)
    source_path: Option<PathBuf>,
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("Invalid setting value: {0}")]
    InvalidValue(String),
}

/// TOML representation for deserializing settings
#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SettingsToml {
    #[serde(default)]
    repeat: Option<RepeatSettings>,

    #[serde(default)]
    keymap: Option<KeymapSettings>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RepeatSettings {
    #[serde(default)]
    rate: Option<i64>,
    #[serde(default)]
    delay: Option<i64>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct KeymapSettings {
    #[serde(default)]
    rules: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    layout: Option<String>,
    #[serde(default)]
    variant: Option<String>,
    #[serde(default)]
    options: Option<String>,
}

impl Settings {
    /// Create settings with built-in defaults
    pub fn new() -> Self {
        Self {
            repeat: RepeatInfo::new(DEFAULT_REPEAT_RATE, DEFAULT_REPEAT_DELAY),
            keymap: RuleNames::default(),
            source_path: None,
        }
    }

    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(&path)?;
        let mut settings = Self::from_toml(&content)?;
        settings.source_path = Some(path.as_ref().to_path_buf());
        Ok(settings)
    }

    /// Load settings from TOML string
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let toml_settings: SettingsToml =
            toml::from_str(content).map_err(|e| SettingsError::TomlParse(e.to_string()))?;

        let mut settings = Self::new();

        if let Some(repeat) = toml_settings.repeat {
            if let Some(rate) = repeat.rate {
                settings.repeat.rate = parse_i32("repeat.rate", rate)?;
            }
            if let Some(delay) = repeat.delay {
                settings.repeat.delay = parse_i32("repeat.delay", delay)?;
            }
        }

        if let Some(keymap) = toml_settings.keymap {
            let names = &mut settings.keymap;
            names.rules = keymap.rules.unwrap_or_default();
            names.model = keymap.model.unwrap_or_default();
            names.layout = keymap.layout.unwrap_or_default();
            names.variant = keymap.variant.unwrap_or_default();
            names.options = keymap.options.filter(|o| !o.is_empty());
        }

        Ok(settings)
    }

    /// Get the default settings path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("kbstate").join("settings.toml"))
    }

    /// Load from default location (~/.config/kbstate/settings.toml)
    pub fn load_default() -> Result<Self, SettingsError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::from_file(path);
            }
        }
        // Return default settings if file doesn't exist
        Ok(Self::new())
    }

    /// Repeat settings to create keyboards with
    pub fn repeat_info(&self) -> RepeatInfo {
        self.repeat
    }

    /// Names to compile the keymap from
    pub fn rule_names(&self) -> &RuleNames {
        &self.keymap
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Reload settings from the original file
    pub fn reload(&mut self) -> Result<(), SettingsError> {
        if let Some(ref path) = self.source_path {
            let new_settings = Self::from_file(path)?;
            *self = new_settings;
            Ok(())
        } else {
            Err(SettingsError::InvalidValue("No source path set".to_string()))
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_i32(name: &str, value: i64) -> Result<i32, SettingsError> {
    i32::try_from(value)
        .map_err(|_| SettingsError::InvalidValue(format!("{} = {} is out of range", name, value)))
}

/// Create default settings content for a new installation
pub fn default_settings_content() -> &'static str {
    r#"# Kbstate Settings
# Place this file at: ~/.config/kbstate/settings.toml

[repeat]
# Keys per second once repeating starts (0 disables repeat)
rate = 25
# Milliseconds a key is held before it starts repeating
delay = 600

[keymap]
# XKB names; empty values use the system defaults
rules = ""
model = "pc105"
layout = "us"
variant = ""
options = ""
"#
}
