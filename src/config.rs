//! Settings file for the command line front-end.
//!
//! Every field is optional in the JSON file; missing fields take their
//! defaults and command line flags override what the file sets.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::{DatasetConfig, SyntheticConfig, DEFAULT_REAL_TAIL};
use crate::training::TrainingConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {}", .path.display(), .source)]
    Io { path: PathBuf, source: std::io::Error },
    #[error("invalid config {}: {}", .path.display(), .source)]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub hidden_size: usize,
    pub num_layers: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            hidden_size: 100,
            num_layers: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model_path: PathBuf,
    pub calendar_path: PathBuf,
    pub synthetic_path: Option<PathBuf>,
    /// Most recent real training samples mixed in after the synthetic ones.
    pub real_tail: Option<usize>,
    pub model: ModelConfig,
    pub dataset: DatasetConfig,
    pub training: TrainingConfig,
    pub synthetic: SyntheticConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            model_path: PathBuf::from("models/cycle_lstm.bin"),
            calendar_path: PathBuf::from("calendar.txt"),
            synthetic_path: None,
            real_tail: Some(DEFAULT_REAL_TAIL),
            model: ModelConfig::default(),
            dataset: DatasetConfig::default(),
            training: TrainingConfig::default(),
            synthetic: SyntheticConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_json(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text, path)
    }

    /// The file if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.hidden_size == 0 || self.model.num_layers == 0 {
            return Err(ConfigError::Invalid(
                "model needs at least one layer and one hidden unit".to_string(),
            ));
        }
        if self.training.batch_size == 0 {
            return Err(ConfigError::Invalid("training.batch_size must be at least 1".to_string()));
        }
        self.dataset
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("dataset: {}", e)))?;
        self.synthetic
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("synthetic: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let text = r#"{
            "calendar_path": "data/calendar.txt",
            "model": { "hidden_size": 16 },
            "training": { "epochs": 10, "seed": 4 },
            "dataset": { "repeat": 5 }
        }"#;
        let config = AppConfig::from_json(text, Path::new("cycle.json")).unwrap();

        assert_eq!(config.calendar_path, PathBuf::from("data/calendar.txt"));
        assert_eq!(config.model.hidden_size, 16);
        assert_eq!(config.model.num_layers, 2);
        assert_eq!(config.training.epochs, 10);
        assert_eq!(config.training.seed, Some(4));
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.dataset.repeat, 5);
        assert_eq!(config.dataset.train_fraction, 0.8);
        assert_eq!(config.real_tail, Some(78));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let text = r#"{ "dataset": { "train_fraction": 0.0 } }"#;
        let err = AppConfig::from_json(text, Path::new("c.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let text = r#"{ "model": { "num_layers": 0 } }"#;
        let err = AppConfig::from_json(text, Path::new("c.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = AppConfig::from_json("{ not json", Path::new("c.json")).unwrap_err();
        assert!(err.to_string().starts_with("invalid config c.json"));
    }

    #[test]
    fn test_inverted_synthetic_range_is_rejected() {
        let text = r#"{ "synthetic": { "cycle_range": [35, 21] } }"#;
        match AppConfig::from_json(text, Path::new("c.json")) {
            Err(ConfigError::Invalid(message)) => assert!(message.starts_with("synthetic:")),
            other => panic!("expected Invalid, got {:?}", other.map(|c| c.synthetic)),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load("/nonexistent/cycle.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(AppConfig::load_or_default(None).is_ok());
    }
}
