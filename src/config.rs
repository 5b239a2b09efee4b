//! Config file handling
//!
//! `<config dir>/quick/config.toml` may carry flags that are prepended to
//! every invocation:
//!
//! ```toml
//! [defaults]
//! options = ["--connect-timeout", "3s", "-k"]
//! ```

use std::path::{Path, PathBuf};

use crate::errors::{QuickError, Result};

/// quick configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub config_dir: PathBuf,
    pub default_options: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_dir: Self::default_config_dir(),
            default_options: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the config file (TOML format)
    pub fn load() -> Result<Self> {
        let config_dir = Self::default_config_dir();
        let config_file = config_dir.join("config.toml");

        if !config_file.exists() {
            return Ok(Self::default());
        }

        let mut config = Self::load_from(&config_file)?;
        config.config_dir = config_dir;
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| QuickError::Config(format!("Failed to read config: {}", e)))?;

        let toml_value: toml::Value = toml::from_str(&content)
            .map_err(|e| QuickError::Config(format!("Invalid config TOML: {}", e)))?;

        let default_options = toml_value
            .get("defaults")
            .and_then(|d| d.get("options"))
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            config_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            default_options,
        })
    }

    /// Get the default config directory
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("quick"))
            .unwrap_or_else(|| PathBuf::from(".quick"))
    }

    /// Insert the configured options right after the program name
    ///
    /// Options come first so anything on the command line can follow them.
    pub fn merge_into(&self, args: Vec<String>) -> Vec<String> {
        if self.default_options.is_empty() {
            return args;
        }

        let mut merged = Vec::with_capacity(args.len() + self.default_options.len());
        let mut rest = args.into_iter();
        if let Some(program) = rest.next() {
            merged.push(program);
        }
        merged.extend(self.default_options.iter().cloned());
        merged.extend(rest);
        merged
    }
}
