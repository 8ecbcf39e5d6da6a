//src/config.rs
use comfy_table::Color;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;
use tracing::warn;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_CONFIG_DIR: &str = "workout-logger";
const CONFIG_ENV_VAR: &str = "WORKOUT_LOGGER_CONFIG_DIR"; // Environment variable name
pub const DEFAULT_SHEETS_API_URL: &str = "https://sheets.googleapis.com";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine configuration directory.")]
    CannotDetermineConfigDir,
    #[error("I/O error accessing config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file (TOML): {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize config data (TOML): {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Invalid color name: {0}")]
    InvalidColor(String),
    #[error("Timer tick must be between 50 and 60000 ms, got {0}")]
    InvalidTick(u64),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Units {
    Metric, // kg
    #[default]
    Imperial, // lbs
}

impl Units {
    pub const fn weight_label(self) -> &'static str {
        match self {
            Self::Metric => "kg",
            Self::Imperial => "lbs",
        }
    }
}

/// What to do with an interrupted session found at startup.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResumePolicy {
    /// Resume without asking.
    #[default]
    Always,
    Ask,
    /// Discard it.
    Never,
}

// Define standard colors using strum for easy iteration/parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum StandardColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    DarkGrey,
    Grey,
}

impl From<StandardColor> for Color {
    fn from(value: StandardColor) -> Self {
        match value {
            StandardColor::Black => Color::Black,
            StandardColor::Red => Color::Red,
            StandardColor::Green => Color::Green,
            StandardColor::Yellow => Color::Yellow,
            StandardColor::Blue => Color::Blue,
            StandardColor::Magenta => Color::Magenta,
            StandardColor::Cyan => Color::Cyan,
            StandardColor::White => Color::White,
            StandardColor::DarkGrey => Color::DarkGrey,
            StandardColor::Grey => Color::Grey,
        }
    }
}

pub fn parse_color(color_str: &str) -> Result<StandardColor, ConfigError> {
    StandardColor::iter()
        .find(|color| format!("{color:?}").eq_ignore_ascii_case(color_str))
        .ok_or_else(|| ConfigError::InvalidColor(color_str.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ThemeConfig {
    /// Table header color for the light theme.
    pub header_color: String,
    /// Table header color for the dark theme.
    pub dark_header_color: String,
}

impl ThemeConfig {
    pub fn header_color(&self, theme: Theme) -> Result<Color, ConfigError> {
        let name = match theme {
            Theme::Light => &self.header_color,
            Theme::Dark => &self.dark_header_color,
        };
        parse_color(name).map(Color::from)
    }
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            header_color: "Green".to_string(),
            dark_header_color: "Cyan".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)] // Ensure defaults are used if fields are missing
pub struct Config {
    pub units: Units,
    /// Spreadsheet used when no sheet id preference has been stored.
    pub default_sheet_id: Option<String>,
    pub sheets_api_url: String,
    /// Workout catalog to load instead of the built-in program.
    pub catalog_path: Option<PathBuf>,
    pub timer_tick_ms: u64,
    pub resume: ResumePolicy,
    /// Default tracing filter when `RUST_LOG` is not set.
    pub log_level: String,
    pub theme: ThemeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            units: Units::default(),
            default_sheet_id: None,
            sheets_api_url: DEFAULT_SHEETS_API_URL.to_string(),
            catalog_path: None,
            timer_tick_ms: 1000,
            resume: ResumePolicy::default(),
            log_level: "warn".to_string(),
            theme: ThemeConfig::default(),
        }
    }
}

impl Config {
    /// # Errors
    /// Returns `ConfigError::InvalidTick` or `InvalidColor` for unusable values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(50..=60_000).contains(&self.timer_tick_ms) {
            return Err(ConfigError::InvalidTick(self.timer_tick_ms));
        }
        parse_color(&self.theme.header_color)?;
        parse_color(&self.theme.dark_header_color)?;
        Ok(())
    }
}

/// Determines the path to the configuration file.
pub fn get_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir_path = match std::env::var(CONFIG_ENV_VAR).ok() {
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if !path.is_dir() {
                warn!(
                    "{CONFIG_ENV_VAR} points to '{}', which is not a directory. Trying to create it.",
                    path.display()
                );
                fs::create_dir_all(&path)?;
            }
            path
        }
        None => dirs::config_dir()
            .ok_or(ConfigError::CannotDetermineConfigDir)?
            .join(APP_CONFIG_DIR),
    };

    if !config_dir_path.exists() {
        fs::create_dir_all(&config_dir_path)?;
    }

    Ok(config_dir_path.join(CONFIG_FILE_NAME))
}

/// Loads the configuration, writing the defaults if the file does not exist.
pub fn load_config(config_path: &Path) -> Result<Config, ConfigError> {
    if !config_path.exists() {
        let default_config = Config::default();
        save_config(config_path, &default_config)?;
        return Ok(default_config);
    }
    let config_content = fs::read_to_string(config_path)?;
    let config: Config = toml::from_str(&config_content).map_err(ConfigError::TomlParse)?;
    config.validate()?;
    Ok(config)
}

pub fn save_config(config_path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent_dir) = config_path.parent() {
        if !parent_dir.exists() {
            fs::create_dir_all(parent_dir)?;
        }
    }
    let config_content = toml::to_string_pretty(config).map_err(ConfigError::TomlSerialize)?;
    fs::write(config_path, config_content)?;
    Ok(())
}
