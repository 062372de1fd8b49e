//! Configuration management for sgeval.
//!
//! Configuration is loaded from `~/.sgeval/config.toml` (or the platform
//! config dir) with defaults matching the Visual Genome hierarchical setup.

mod types;
mod validate;

pub use types::*;
use types::expand_path;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for sgeval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relation taxonomy layout
    pub taxonomy: TaxonomyConfig,

    /// Matching and ranking settings
    pub evaluation: EvaluationConfig,

    /// Dataset side tables
    pub dataset: DatasetConfig,

    /// Category equivalence tables for detection
    pub equivalence: EquivalenceConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.sgeval.sgeval/config.toml
    /// - Linux: ~/.config/sgeval/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\sgeval\config\config.toml
    ///
    /// Falls back to ~/.sgeval/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "sgeval", "sgeval")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".sgeval").join("config.toml")
            })
    }

    /// Resolved training-triplet table path (with ~ expansion).
    pub fn train_triplets_path(&self) -> Option<PathBuf> {
        self.dataset.train_triplets.as_deref().map(expand_path)
    }

    /// Resolved zero-shot triplet table path (with ~ expansion).
    pub fn zero_shot_triplets_path(&self) -> Option<PathBuf> {
        self.dataset.zero_shot_triplets.as_deref().map(expand_path)
    }

    /// Resolved class-weight file path (with ~ expansion).
    pub fn class_weights_path(&self) -> Option<PathBuf> {
        self.dataset.class_weights.as_deref().map(expand_path)
    }

    /// Resolved label-name file path (with ~ expansion).
    pub fn labels_path(&self) -> Option<PathBuf> {
        self.dataset.labels.as_deref().map(expand_path)
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.taxonomy.num_relations, 50);
        assert_eq!(config.evaluation.top_k, vec![20, 50, 100]);
        assert!((config.evaluation.iou_thresh - 0.5).abs() < 1e-6);
        assert_eq!(config.evaluation.precision_top_k, 20);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[taxonomy]"));
        assert!(toml.contains("[evaluation]"));
        assert!(toml.contains("mode = \"graph_constrained\""));
    }

    #[test]
    fn test_toml_round_trip_keeps_equivalence_tables() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.equivalence, EquivalenceConfig::default());
    }

    #[test]
    fn test_load_from_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[evaluation]\ntask = \"sgdet\"\nmode = \"top3\"\ntop_k = [10, 20]").unwrap();
        writeln!(f, "[dataset]\nname = \"oiv6\"").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.evaluation.task, Task::SgDet);
        assert_eq!(config.evaluation.mode, EvalMode::Top3);
        assert_eq!(config.evaluation.top_k, vec![10, 20]);
        assert_eq!(config.dataset.name, DatasetName::Oiv6);
        // untouched sections keep defaults
        assert_eq!(config.taxonomy.num_geometric, 15);
    }

    #[test]
    fn test_legacy_num_classes_key_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[taxonomy]\nnum_classes = 150\nnum_relations = 50\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.taxonomy.num_relations, 50);
        assert!(!config.to_toml().unwrap().contains("num_classes"));
    }

    #[test]
    fn test_load_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[evaluation]\niou_thresh = 1.5\n").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("iou_thresh"));
    }

    #[test]
    fn test_tilde_paths_expand() {
        let mut config = Config::default();
        config.dataset.zero_shot_triplets = Some("~/tables/zs.json".to_string());
        let path = config.zero_shot_triplets_path().unwrap();
        assert!(path.ends_with("tables/zs.json"));
    }
}
