//! TOML configuration

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extraction::{CommandAnalyst, CommandExtractor};
use crate::metrics::SolverSettings;
use crate::normalizer::NormalizeOptions;
use crate::sensitivity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivitySettings {
    #[serde(default = "sensitivity::default_shifts")]
    pub shifts: Vec<f64>,
}

impl Default for SensitivitySettings {
    fn default() -> Self {
        Self {
            shifts: sensitivity::default_shifts(),
        }
    }
}

/// Application configuration. Every section is optional in the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub normalize: NormalizeOptions,
    #[serde(default)]
    pub solver: SolverSettings,
    #[serde(default)]
    pub sensitivity: SensitivitySettings,
    /// Needed only by the `chat` command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractor: Option<CommandExtractor>,
    /// Needed only by the `ask` command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyst: Option<CommandAnalyst>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.solver;
        if !(s.irr_lower > -1.0 && s.irr_lower < s.irr_upper) {
            return Err(ConfigError::Invalid(format!(
                "solver bounds must satisfy -1 < irr_lower < irr_upper (got {} .. {})",
                s.irr_lower, s.irr_upper
            )));
        }
        if s.max_iterations == 0 || s.tolerance <= 0.0 {
            return Err(ConfigError::Invalid(
                "solver needs max_iterations > 0 and tolerance > 0".to_string(),
            ));
        }
        if self.normalize.max_fraction <= 0.0 {
            return Err(ConfigError::Invalid("normalize.max_fraction must be positive".to_string()));
        }
        Ok(())
    }

    /// Write the configuration as TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Load `path`, or defaults when it does not exist.
pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
    if path.exists() {
        let content = fs::read_to_string(path)?;
        Config::from_toml(&content)
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Ok(Config::default())
    }
}
