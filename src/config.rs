use crate::backtest::{SplitConfig, ValidatorConfig};
use crate::engine::phase::PhaseThresholds;
use crate::engine::weights::OptimizerConfig;
use crate::error::{CandlecastError, Result};
use crate::strategy::PatternConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Every knob of one validation/adaptation pass. Missing fields in a config
/// file fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub train_ratio: f64,
    pub validation_ratio: f64,
    pub learning_rate: f64,
    /// Predictions under this confidence are recorded but not scored.
    pub min_confidence: f64,
    pub split: SplitConfig,
    pub validator: ValidatorConfig,
    pub optimizer: OptimizerConfig,
    pub phase: PhaseThresholds,
    pub patterns: PatternConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            train_ratio: 0.7,
            validation_ratio: 0.15,
            learning_rate: 0.1,
            min_confidence: 0.0,
            split: SplitConfig::default(),
            validator: ValidatorConfig::default(),
            optimizer: OptimizerConfig::default(),
            phase: PhaseThresholds::default(),
            patterns: PatternConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let ratios_ok = self.train_ratio > 0.0
            && self.validation_ratio >= 0.0
            && self.train_ratio + self.validation_ratio < 1.0;
        if !ratios_ok {
            return Err(CandlecastError::InvalidRatio {
                train_ratio: self.train_ratio,
                validation_ratio: self.validation_ratio,
            });
        }
        if !(0.0..=1.0).contains(&self.learning_rate) {
            return Err(CandlecastError::Config(format!(
                "learning_rate {} outside [0, 1]",
                self.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(CandlecastError::Config(format!(
                "min_confidence {} outside [0, 1]",
                self.min_confidence
            )));
        }
        self.optimizer.validate()?;
        self.phase.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.train_ratio, 0.7);
        assert_eq!(cfg.validation_ratio, 0.15);
        assert_eq!(cfg.split.min_slice_len, 20);
        assert_eq!(cfg.validator.warmup, 10);
        assert_eq!(cfg.optimizer.min_trials, 5);
        assert_eq!(cfg.phase.min_trials, 30);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"learning_rate": 0.2, "split": {{"min_slice_len": 5}}, "phase": {{"min_trials": 10}}}}"#
        )
        .unwrap();
        let cfg = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(cfg.learning_rate, 0.2);
        assert_eq!(cfg.split.min_slice_len, 5);
        assert_eq!(cfg.phase.min_trials, 10);
        assert_eq!(cfg.phase.master, 0.95);
        assert_eq!(cfg.train_ratio, 0.7);
    }

    #[test]
    fn test_invalid_ratios_rejected() {
        let cfg = PipelineConfig {
            train_ratio: 0.9,
            validation_ratio: 0.2,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(CandlecastError::InvalidRatio { .. })));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            PipelineConfig::from_json_file("/nonexistent/candlecast.json"),
            Err(CandlecastError::Io(_))
        ));
    }
}
