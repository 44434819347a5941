// TOML config adapter - Configuration management using TOML files

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::adapters::exec_ffmpeg::EncodeSettings;
use crate::engine::ExportOptions;
use crate::error::{TrimError, TrimResult};
use crate::playback::NavigationSteps;

/// Locations of the external tools
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

/// Export behavior and encoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub verify_segments: bool,
    pub preset: String,
    pub crf: u8,
    pub threads: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        let encode = EncodeSettings::default();
        Self {
            verify_segments: ExportOptions::default().verify_segments,
            preset: encode.preset,
            crf: encode.crf,
            threads: encode.threads,
        }
    }
}

impl ExportConfig {
    pub fn options(&self) -> ExportOptions {
        ExportOptions {
            verify_segments: self.verify_segments,
        }
    }

    pub fn encode_settings(&self) -> EncodeSettings {
        EncodeSettings {
            preset: self.preset.clone(),
            crf: self.crf,
            threads: self.threads,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    pub tools: ToolsConfig,
    pub navigation: NavigationSteps,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

impl TrimConfig {
    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> TrimResult<()> {
        let steps = &self.navigation;
        for (name, value) in [("navigation.coarse", steps.coarse), ("navigation.fine", steps.fine)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(TrimError::config(format!("{name} must be a positive number of seconds")));
            }
        }
        if self.export.crf > 51 {
            return Err(TrimError::config("export.crf must be between 0 and 51"));
        }
        if self.export.threads == 0 {
            return Err(TrimError::config("export.threads must be at least 1"));
        }
        if self.export.preset.trim().is_empty() {
            return Err(TrimError::config("export.preset must not be empty"));
        }
        self.logging
            .level
            .parse::<tracing::Level>()
            .map_err(|_| {
                TrimError::config(format!("unknown logging.level '{}'", self.logging.level))
            })?;
        Ok(())
    }
}

/// TOML configuration adapter
pub struct TomlConfigAdapter;

impl TomlConfigAdapter {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one the default location is read
    /// when present, and built-in defaults are used otherwise.
    pub fn load(explicit: Option<&Path>) -> TrimResult<TrimConfig> {
        let path = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(TrimError::config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => match Self::default_config_path() {
                Some(path) if path.is_file() => path,
                _ => {
                    debug!("No config file found, using defaults");
                    return Ok(TrimConfig::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path).map_err(|e| {
            TrimError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn parse(content: &str) -> TrimResult<TrimConfig> {
        let config: TrimConfig = toml::from_str(content)
            .map_err(|e| TrimError::config(format!("failed to parse TOML config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize a configuration, e.g. to seed a new config file
    pub fn render(config: &TrimConfig) -> TrimResult<String> {
        toml::to_string_pretty(config)
            .map_err(|e| TrimError::config(format!("failed to serialize config: {e}")))
    }

    /// `%APPDATA%\TrimCut\config.toml` on Windows,
    /// `$XDG_CONFIG_HOME/trimcut/config.toml` or `~/.config/trimcut/config.toml` elsewhere
    pub fn default_config_path() -> Option<PathBuf> {
        if cfg!(windows) {
            return std::env::var_os("APPDATA")
                .map(|appdata| PathBuf::from(appdata).join("TrimCut").join("config.toml"));
        }
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
        Some(base.join("trimcut").join("config.toml"))
    }
}
