//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "DEEPR_CONFIG_PATH";

/// Configuration for deepr
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Research backend address
    pub base_url: Option<String>,
    /// Iteration cap sent with each research request
    pub max_iterations: Option<u32>,
    /// Directory reports are exported to
    pub export_dir: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deepr")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    fn load_from(path: &std::path::Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Self::default()
            }),
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            base_url: Some(deepr_api::DEFAULT_BASE_URL.to_string()),
            max_iterations: None,
            export_dir: None,
        };

        default_config.save()?;
        Ok(path)
    }

    /// Resolve the backend address: CLI flag, then environment, then file
    pub fn resolve_base_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| std::env::var(deepr_api::BASE_URL_ENV).ok())
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| deepr_api::DEFAULT_BASE_URL.to_string())
    }

    /// Directory for exported reports, defaulting to the working directory
    pub fn export_dir(&self) -> PathBuf {
        self.export_dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# deepr configuration file
# Place at ~/.config/deepr/config.toml (Linux/Mac) or %APPDATA%\deepr\config.toml (Windows)

# Research backend address (DEEPR_BASE_URL overrides this)
base_url = "http://localhost:8000"

# Iteration cap for each research run (1-100, optional)
# The backend's own setting is used when omitted
# max_iterations = 30

# Directory where /export writes reports (defaults to the working directory)
# export_dir = "~/Documents/research"
"#
}
