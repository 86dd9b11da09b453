//! Engine configuration.
//!
//! One TOML file with a section per component.  Every section is optional
//! and falls back to its defaults; `[[jutsu]]` tables extend the built-in
//! catalog.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogError, Jutsu, JutsuCatalog};
use crate::pipeline::{ClassifierConfig, ConsensusConfig, LightingConfig, SessionConfig};
use crate::proof::{ProofTunables, VerifierConfig};
use crate::run::RunConfig;

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub lighting: LightingConfig,

    #[serde(default)]
    pub consensus: ConsensusConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub verifier: VerifierConfig,

    /// Extra jutsu registered on top of the built-ins.
    #[serde(default)]
    pub jutsu: Vec<Jutsu>,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.classifier.k == 0 {
            return Err(ConfigError::Validation("classifier.k must be at least 1".into()));
        }
        if self.consensus.window_size == 0 {
            return Err(ConfigError::Validation(
                "consensus.window_size must be at least 1".into(),
            ));
        }
        if self.consensus.required_hits > self.consensus.window_size {
            return Err(ConfigError::Validation(format!(
                "consensus.required_hits {} exceeds window_size {}",
                self.consensus.required_hits, self.consensus.window_size
            )));
        }
        if self.lighting.min_mean > self.lighting.max_mean {
            return Err(ConfigError::Validation(
                "lighting.min_mean is above lighting.max_mean".into(),
            ));
        }
        self.verifier
            .admits(&self.proof_tunables())
            .map_err(|e| ConfigError::Validation(format!("run proofs would be rejected: {e}")))?;
        for jutsu in &self.jutsu {
            jutsu.validate()?;
        }
        Ok(())
    }

    /// Tunables every recorded run proof declares under this configuration.
    pub fn proof_tunables(&self) -> ProofTunables {
        ProofTunables {
            cooldown_ms: self.run.sign_cooldown_ms,
            vote_required_hits: self.consensus.required_hits,
            vote_min_confidence: self.consensus.min_confidence,
        }
    }

    /// Built-in catalog extended with configured jutsu.
    pub fn catalog(&self) -> Result<JutsuCatalog, ConfigError> {
        let mut catalog = JutsuCatalog::builtin();
        for jutsu in &self.jutsu {
            catalog.insert(jutsu.clone())?;
        }
        Ok(catalog)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Invalid jutsu definition.
    #[error("invalid jutsu: {0}")]
    Catalog(#[from] CatalogError),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.session.detect_interval_ms, 65.0);
        assert_eq!(config.consensus.required_hits, 3);
        assert_eq!(config.run.sign_cooldown_ms, 350.0);
        assert_eq!(config.verifier.finish_tolerance_sec, 1.15);
    }

    #[test]
    fn test_partial_sections() {
        let toml = r#"
[classifier]
reject_distance = 1.5

[consensus]
required_hits = 2

[run]
mode = "practice"
"#;
        let config = EngineConfig::from_toml(toml).unwrap();
        assert!((config.classifier.reject_distance - 1.5).abs() < f32::EPSILON);
        assert_eq!(config.classifier.k, 3);
        assert_eq!(config.consensus.required_hits, 2);
        assert_eq!(config.consensus.window_size, 5);
        assert_eq!(config.run.mode, "practice");
        assert_eq!(config.run.sign_cooldown_ms, 350.0);
    }

    #[test]
    fn test_extra_jutsu_extend_catalog() {
        let toml = r#"
[[jutsu]]
name = "water_dragon"
signs = ["ox", "monkey", "hare", "rat"]
"#;
        let config = EngineConfig::from_toml(toml).unwrap();
        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.get("water_dragon").unwrap().len(), 4);
        assert!(catalog.get("fireball").is_some());
    }

    #[test]
    fn test_invalid_jutsu_rejected() {
        let toml = r#"
[[jutsu]]
name = "stutter"
signs = ["ox", "ox"]
"#;
        let err = EngineConfig::from_toml(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Catalog(CatalogError::RepeatedSign { .. })));
    }

    #[test]
    fn test_validation_errors() {
        let err = EngineConfig::from_toml("[consensus]\nrequired_hits = 9\n").unwrap_err();
        assert!(err.to_string().contains("exceeds window_size"));

        let err = EngineConfig::from_toml("[classifier]\nk = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_tunables_must_pass_verification() {
        for cooldown in ["120.0", "1200.0"] {
            let toml = format!("[run]\nsign_cooldown_ms = {cooldown}\n");
            assert!(EngineConfig::from_toml(&toml).is_ok(), "{}", cooldown);
        }
        for cooldown in ["119.0", "1201.0"] {
            let toml = format!("[run]\nsign_cooldown_ms = {cooldown}\n");
            let err = EngineConfig::from_toml(&toml).unwrap_err();
            assert!(err.to_string().contains("sign cooldown"), "{}", err);
        }

        for hits in [1, 4] {
            let toml = format!("[consensus]\nrequired_hits = {hits}\n");
            let err = EngineConfig::from_toml(&toml).unwrap_err();
            assert!(matches!(err, ConfigError::Validation(_)), "{}", hits);
        }
        assert!(EngineConfig::from_toml("[consensus]\nrequired_hits = 2\n").is_ok());

        for confidence in ["0.19", "0.96"] {
            let toml = format!("[consensus]\nmin_confidence = {confidence}\n");
            let err = EngineConfig::from_toml(&toml).unwrap_err();
            assert!(err.to_string().contains("min confidence"), "{}", err);
        }
        assert!(EngineConfig::from_toml("[consensus]\nmin_confidence = 0.95\n").is_ok());
    }

    #[test]
    fn test_widened_verifier_bounds_admit_tunables() {
        let toml = "[run]\nsign_cooldown_ms = 100.0\n\n[verifier]\nmin_cooldown_ms = 80.0\n";
        let config = EngineConfig::from_toml(toml).unwrap();
        assert_eq!(config.proof_tunables().cooldown_ms, 100.0);
    }

    #[test]
    fn test_parse_error() {
        let err = EngineConfig::from_toml("[session\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let mut config = EngineConfig::default();
        config.jutsu.push(Jutsu::new("water_dragon", &["ox", "monkey"]));
        let text = config.to_toml().unwrap();
        assert_eq!(EngineConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "[lighting]\nmin_mean = 50.0\n").unwrap();
        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.lighting.min_mean, 50.0);

        let missing = EngineConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));
    }
}
