use super::schema::HealConfig;
use crate::guardrail::TrustLevel;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid trust level '{0}' (expected L0_SHADOW, L1_SUGGEST, L2_AUTO_SAFE or L3_AUTO_ALL)")]
    InvalidTrustLevel(String),
    #[error("Initial trust level {initial} is above the configured maximum {max}")]
    TrustLevelAboveMax { initial: TrustLevel, max: TrustLevel },
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations:
    /// 1. ./mend.yaml
    /// 2. ~/.mend/config.yaml
    /// 3. Default configuration
    pub async fn load_default() -> Result<HealConfig, ConfigError> {
        let local_config = PathBuf::from("./mend.yaml");
        if local_config.exists() {
            return Self::load_from(&local_config).await;
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".mend").join("config.yaml");
            if home_config.exists() {
                return Self::load_from(&home_config).await;
            }
        }

        Ok(HealConfig::default())
    }

    pub async fn load_from(path: &Path) -> Result<HealConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: HealConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

impl HealConfig {
    /// Reject configurations the guardrails cannot start from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.guardrails;
        let initial: TrustLevel = g.initial_trust_level.parse()?;
        let max: TrustLevel = g.max_trust_level.parse()?;
        if initial > max {
            return Err(ConfigError::TrustLevelAboveMax { initial, max });
        }
        if g.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "guardrails.failure_threshold",
                reason: "must be at least 1".into(),
            });
        }
        if g.escalation_successes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "guardrails.escalation_successes",
                reason: "must be at least 1".into(),
            });
        }
        for (field, value) in [
            ("guardrails.auto_apply_confidence", g.auto_apply_confidence),
            ("generator.min_confidence", self.generator.min_confidence),
            ("generator.fuzzy_threshold", self.generator.fuzzy_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("{} is outside [0, 1]", value),
                });
            }
        }
        Ok(())
    }
}
