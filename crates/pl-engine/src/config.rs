//! Layered configuration.
//!
//! Precedence (lowest to highest):
//! 1. Programmatic defaults
//! 2. `pitlane.json` in the working directory, if present
//! 3. `PITLANE_*` environment variables, `__` separating nested keys
//!    (e.g. `PITLANE_OPTIMIZATION__SEED=7`)

use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use pl_scoring::ScoringConfig;
use pl_types::{OptimizationConfig, PlError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const CONFIG_FILE: &str = "pitlane.json";
pub const ENV_PREFIX: &str = "PITLANE_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["pretty", "json"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid initial_setups: {0}. Must be at least 1")]
    InvalidInitialSetups(usize),

    #[error("Invalid exploration_weight: {0}. Must be within [0, 1]")]
    InvalidExplorationWeight(f64),

    #[error("Invalid scoring configuration: {0}")]
    InvalidScoring(String),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] figment::Error),
}

impl From<ConfigError> for PlError {
    fn from(err: ConfigError) -> Self {
        PlError::Config(err.to_string())
    }
}

/// How repeated telemetry for the same setup is folded into one score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResubmissionPolicy {
    /// The latest submission replaces earlier ones.
    #[default]
    Last,
    /// Highest score seen.
    Best,
    /// Running average over all submissions.
    Mean,
}

impl ResubmissionPolicy {
    /// Combined score given the earlier raw scores and the new one.
    pub fn combine(self, previous: &[f64], latest: f64) -> f64 {
        match self {
            Self::Last => latest,
            Self::Best => previous.iter().copied().fold(latest, f64::max),
            Self::Mean => {
                let total: f64 = previous.iter().sum::<f64>() + latest;
                total / (previous.len() + 1) as f64
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PitlaneConfig {
    pub optimization: OptimizationConfig,
    pub scoring: ScoringConfig,
    pub resubmission: ResubmissionPolicy,
    pub logging: LoggingConfig,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, `pitlane.json`, then environment.
    pub fn load() -> Result<PitlaneConfig, ConfigError> {
        let config: PitlaneConfig = Figment::new()
            .merge(Serialized::defaults(PitlaneConfig::default()))
            .merge(Json::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Defaults overlaid with a specific file. Scoring rules in the file are
    /// merged over the default table per metric.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<PitlaneConfig, ConfigError> {
        let config: PitlaneConfig = Figment::new()
            .merge(Serialized::defaults(PitlaneConfig::default()))
            .merge(Json::file(path.as_ref()))
            .extract()?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &PitlaneConfig) -> Result<(), ConfigError> {
        let optimization = &config.optimization;
        if optimization.initial_setups == 0 {
            return Err(ConfigError::InvalidInitialSetups(optimization.initial_setups));
        }
        if !(0.0..=1.0).contains(&optimization.exploration_weight) {
            return Err(ConfigError::InvalidExplorationWeight(
                optimization.exploration_weight,
            ));
        }

        config
            .scoring
            .validate()
            .map_err(|e| ConfigError::InvalidScoring(e.to_string()))?;

        if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        if !LOG_FORMATS.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_scoring::{MetricRule, Orientation};
    use proptest::prelude::*;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn default_config_is_valid() {
        let config = PitlaneConfig::default();
        assert_eq!(config.resubmission, ResubmissionPolicy::Last);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.optimization.initial_setups, 5);
        ConfigLoader::validate(&config).unwrap();
    }

    #[test]
    fn file_overrides_defaults() {
        let file = write_config(
            r#"{
                "optimization": {"sampler": "cmaes", "seed": 7},
                "resubmission": "mean",
                "logging": {"format": "json"},
                "scoring": {"metrics": {"lap_time": {"weight": 5}}}
            }"#,
        );
        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.optimization.sampler, "cmaes");
        assert_eq!(config.optimization.seed, 7);
        assert_eq!(config.optimization.initial_setups, 5);
        assert_eq!(config.resubmission, ResubmissionPolicy::Mean);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");

        let lap = config.scoring.rule("lap_time").unwrap();
        assert_eq!(lap.weight, 5.0);
        assert_eq!(lap.orientation, Orientation::LowerIsBetter);
        assert!(config.scoring.rule("traction").is_some());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::load_from_file(dir.path().join("absent.json")).unwrap();
        assert_eq!(config, PitlaneConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let file = write_config(r#"{"optimization": {"initial_setups": 0}}"#);
        assert!(matches!(
            ConfigLoader::load_from_file(file.path()),
            Err(ConfigError::InvalidInitialSetups(0))
        ));

        let file = write_config(r#"{"logging": {"level": "loud"}}"#);
        assert!(matches!(
            ConfigLoader::load_from_file(file.path()),
            Err(ConfigError::InvalidLogLevel(_))
        ));

        let file = write_config(r#"{"logging": {"format": "xml"}}"#);
        assert!(matches!(
            ConfigLoader::load_from_file(file.path()),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }

    #[test]
    fn invalid_scoring_is_rejected() {
        let mut config = PitlaneConfig::default();
        config.scoring = config.scoring.with_rule("grip", MetricRule::higher(-1.0));
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidScoring(_))
        ));

        config.scoring =
            ScoringConfig::empty().with_rule("temp", MetricRule::band(1.0, 90.0, 80.0));
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn malformed_file_is_load_error() {
        let file = write_config(r#"{"optimization": {"seed": "seven"}}"#);
        assert!(matches!(
            ConfigLoader::load_from_file(file.path()),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn config_error_converts_to_pl_error() {
        let err: PlError = ConfigError::InvalidLogFormat("xml".into()).into();
        assert!(matches!(err, PlError::Config(ref m) if m.contains("xml")));
    }

    #[test]
    fn resubmission_policies() {
        let previous = [0.9, 0.5];
        assert_eq!(ResubmissionPolicy::Last.combine(&previous, 0.4), 0.4);
        assert_eq!(ResubmissionPolicy::Best.combine(&previous, 0.4), 0.9);
        assert!((ResubmissionPolicy::Mean.combine(&previous, 0.4) - 0.6).abs() < 1e-12);
        for policy in [
            ResubmissionPolicy::Last,
            ResubmissionPolicy::Best,
            ResubmissionPolicy::Mean,
        ] {
            assert_eq!(policy.combine(&[], 0.3), 0.3);
        }
    }

    proptest! {
        #[test]
        fn mean_stays_within_submissions(
            previous in prop::collection::vec(0.0f64..1.0, 0..10),
            latest in 0.0f64..1.0,
        ) {
            let mean = ResubmissionPolicy::Mean.combine(&previous, latest);
            let lo = previous.iter().copied().fold(latest, f64::min);
            let hi = previous.iter().copied().fold(latest, f64::max);
            prop_assert!(mean >= lo - 1e-12 && mean <= hi + 1e-12);
        }
    }
}
