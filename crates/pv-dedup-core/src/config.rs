//! Settings for screening.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (PV_MATCH_THRESHOLD, PV_AUTO_DISCARD_THRESHOLD,
//!    PV_CANDIDATE_WINDOW_DAYS)
//! 2. Settings file (YAML, every key optional)
//! 3. Defaults
//!
//! ```yaml
//! matcher:
//!   threshold: 0.8
//!   symptom_metric: levenshtein
//! candidates:
//!   window_days: 365
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dedup::{CandidatePolicy, MAX_WINDOW_DAYS};
use crate::matcher::{MatcherConfig, MatcherError};

pub const ENV_MATCH_THRESHOLD: &str = "PV_MATCH_THRESHOLD";
pub const ENV_AUTO_DISCARD_THRESHOLD: &str = "PV_AUTO_DISCARD_THRESHOLD";
pub const ENV_CANDIDATE_WINDOW_DAYS: &str = "PV_CANDIDATE_WINDOW_DAYS";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error(transparent)]
    Invalid(#[from] MatcherError),

    #[error("Invalid candidate policy: {0}")]
    Policy(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Resolved settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub matcher: MatcherConfig,
    pub candidates: CandidatePolicy,
}

impl Settings {
    /// Load settings from an optional file, then apply process environment overrides.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        Self::load_with(path, |var| std::env::var(var).ok())
    }

    /// Load settings from an optional file, then apply overrides from `lookup`.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::parse_yaml(&content)?
            }
            None => Self::default(),
        };

        settings.apply_overrides(lookup)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse and validate a YAML settings document.
    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        let settings = Self::parse_yaml(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn parse_yaml(content: &str) -> ConfigResult<Self> {
        // An empty document is all defaults
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MATCH_THRESHOLD) {
            self.matcher.threshold = parse_env(ENV_MATCH_THRESHOLD, &value)?;
        }
        if let Some(value) = lookup(ENV_AUTO_DISCARD_THRESHOLD) {
            self.matcher.auto_discard_threshold = parse_env(ENV_AUTO_DISCARD_THRESHOLD, &value)?;
        }
        if let Some(value) = lookup(ENV_CANDIDATE_WINDOW_DAYS) {
            self.candidates.window_days = Some(parse_env(ENV_CANDIDATE_WINDOW_DAYS, &value)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.matcher.validate()?;

        if self.candidates.limit == 0 {
            return Err(ConfigError::Policy("limit must be at least 1".into()));
        }
        match self.candidates.window_days {
            Some(0) => {
                return Err(ConfigError::Policy("window_days must be at least 1".into()));
            }
            Some(days) if days > MAX_WINDOW_DAYS => {
                return Err(ConfigError::Policy(format!(
                    "window_days must be at most {}, got {}",
                    MAX_WINDOW_DAYS, days
                )));
            }
            _ => {}
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: value.to_string(),
    })
}
