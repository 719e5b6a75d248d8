use crate::domain::PatternTag;
use crate::error::{CandlecastError, Result};
use crate::evaluation::PerformanceTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-pattern weights in `[0, 1]`.
///
/// Scorers only ever see a shared borrow of a vector; every optimization
/// pass builds a brand-new one, so a validation run is reproducible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector {
    weights: BTreeMap<PatternTag, f64>,
}

impl WeightVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(tag, weight)` pairs; weights are clamped to `[0, 1]`.
    pub fn from_pairs<I, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, f64)>,
        T: Into<PatternTag>,
    {
        let weights = pairs
            .into_iter()
            .map(|(tag, w)| (tag.into(), clamp_unit(w)))
            .collect();
        Self { weights }
    }

    pub fn get(&self, tag: &PatternTag) -> Option<f64> {
        self.weights.get(tag).copied()
    }

    pub fn get_or(&self, tag: &PatternTag, default: f64) -> f64 {
        self.get(tag).unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PatternTag, f64)> {
        self.weights.iter().map(|(t, &w)| (t, w))
    }

    pub fn as_map(&self) -> &BTreeMap<PatternTag, f64> {
        &self.weights
    }

    fn with(mut self, tag: PatternTag, weight: f64) -> Self {
        self.weights.insert(tag, clamp_unit(weight));
        self
    }
}

fn clamp_unit(w: f64) -> f64 {
    if w.is_finite() {
        w.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Tags with fewer trials keep their weight.
    pub min_trials: u64,
    /// Accuracy strictly above this boosts the weight.
    pub good_threshold: f64,
    /// Accuracy strictly below this damps the weight.
    pub bad_threshold: f64,
    pub floor: f64,
    pub ceiling: f64,
    /// Starting weight for a tag seen for the first time.
    pub initial_weight: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            min_trials: 5,
            good_threshold: 0.60,
            bad_threshold: 0.40,
            floor: 0.01,
            ceiling: 0.5,
            initial_weight: 0.1,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.floor)
            || !(0.0..=1.0).contains(&self.ceiling)
            || self.floor > self.ceiling
        {
            return Err(CandlecastError::Config(format!(
                "weight bounds must satisfy 0 <= floor <= ceiling <= 1 (floor={}, ceiling={})",
                self.floor, self.ceiling
            )));
        }
        if self.bad_threshold > self.good_threshold {
            return Err(CandlecastError::Config(format!(
                "bad_threshold {} above good_threshold {}",
                self.bad_threshold, self.good_threshold
            )));
        }
        Ok(())
    }
}

/// Bounded multiplicative weight update. Deterministic: identical inputs
/// always give the identical output vector.
#[derive(Debug, Clone, Default)]
pub struct WeightOptimizer {
    pub config: OptimizerConfig,
}

impl WeightOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn optimize(
        &self,
        current: &WeightVector,
        table: &PerformanceTable<PatternTag>,
        learning_rate: f64,
    ) -> WeightVector {
        let cfg = &self.config;
        let rate = if learning_rate.is_finite() {
            learning_rate.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut next = current.clone();
        for (tag, stats) in table.iter() {
            let weight = next.get_or(tag, cfg.initial_weight);
            let updated = if stats.trials < cfg.min_trials {
                weight
            } else if stats.accuracy > cfg.good_threshold {
                weight * (1.0 + rate)
            } else if stats.accuracy < cfg.bad_threshold {
                weight * (1.0 - rate)
            } else {
                weight
            };
            next = next.with(tag.clone(), updated);
        }

        WeightVector {
            weights: next
                .weights
                .into_iter()
                .map(|(tag, w)| (tag, w.clamp(cfg.floor, cfg.ceiling)))
                .collect(),
        }
    }

    /// `DegenerateWeights` when every weight sits on the floor.
    pub fn check_degenerate(&self, weights: &WeightVector) -> Result<()> {
        let floor = self.config.floor;
        if !weights.is_empty() && weights.iter().all(|(_, w)| w <= floor + 1e-12) {
            return Err(CandlecastError::DegenerateWeights {
                floor,
                tags: weights.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::PerformanceStats;

    fn table(entries: &[(&str, u64, u64)]) -> PerformanceTable<PatternTag> {
        let mut t = PerformanceTable::new();
        for &(tag, trials, correct) in entries {
            t.insert(PatternTag::from(tag), PerformanceStats::from_counts(trials, correct));
        }
        t
    }

    #[test]
    fn test_good_tag_boosted() {
        let opt = WeightOptimizer::default();
        let current = WeightVector::from_pairs([("continuation", 0.2)]);
        let next = opt.optimize(&current, &table(&[("continuation", 10, 7)]), 0.1);
        let w = next.get(&"continuation".into()).unwrap();
        assert!((w - 0.22).abs() < 1e-10, "got {}", w);
    }

    #[test]
    fn test_bad_tag_damped() {
        let opt = WeightOptimizer::default();
        let current = WeightVector::from_pairs([("reversal", 0.2)]);
        let next = opt.optimize(&current, &table(&[("reversal", 10, 3)]), 0.1);
        assert!((next.get(&"reversal".into()).unwrap() - 0.18).abs() < 1e-10);
    }

    #[test]
    fn test_middle_band_unchanged() {
        let opt = WeightOptimizer::default();
        let current = WeightVector::from_pairs([("rsi", 0.3)]);
        let next = opt.optimize(&current, &table(&[("rsi", 10, 5)]), 0.1);
        assert_eq!(next.get(&"rsi".into()), Some(0.3));
    }

    #[test]
    fn test_few_trials_unchanged() {
        let opt = WeightOptimizer::default();
        let current = WeightVector::from_pairs([("rare", 0.3)]);
        let next = opt.optimize(&current, &table(&[("rare", 4, 4)]), 0.1);
        assert_eq!(next.get(&"rare".into()), Some(0.3));
    }

    #[test]
    fn test_boost_clamped_to_ceiling() {
        let opt = WeightOptimizer::default();
        let current = WeightVector::from_pairs([("hot", 0.48)]);
        let next = opt.optimize(&current, &table(&[("hot", 20, 19)]), 0.1);
        assert_eq!(next.get(&"hot".into()), Some(0.5));
    }

    #[test]
    fn test_new_tag_starts_at_initial_weight() {
        let opt = WeightOptimizer::default();
        let next = opt.optimize(&WeightVector::new(), &table(&[("fresh", 10, 5)]), 0.1);
        assert_eq!(next.get(&"fresh".into()), Some(0.1));
    }

    #[test]
    fn test_input_vector_not_mutated() {
        let opt = WeightOptimizer::default();
        let current = WeightVector::from_pairs([("continuation", 0.2)]);
        let snapshot = current.clone();
        let _ = opt.optimize(&current, &table(&[("continuation", 10, 9)]), 0.1);
        assert_eq!(current, snapshot);
    }

    #[test]
    fn test_weights_stay_in_bounds_after_many_passes() {
        let opt = WeightOptimizer::default();
        let good = table(&[("a", 10, 9), ("b", 10, 1)]);
        let mut w = WeightVector::from_pairs([("a", 0.2), ("b", 0.2), ("untouched", 0.9)]);
        for _ in 0..200 {
            w = opt.optimize(&w, &good, 0.3);
            for (_, v) in w.iter() {
                assert!(v >= 0.01 && v <= 0.5, "weight {} out of bounds", v);
            }
        }
        assert_eq!(w.get(&"a".into()), Some(0.5));
        assert_eq!(w.get(&"b".into()), Some(0.01));
    }

    #[test]
    fn test_deterministic() {
        let opt = WeightOptimizer::default();
        let t = table(&[("a", 10, 8), ("b", 7, 1), ("c", 3, 0)]);
        let w = WeightVector::from_pairs([("a", 0.2), ("b", 0.3)]);
        assert_eq!(opt.optimize(&w, &t, 0.1), opt.optimize(&w, &t, 0.1));
    }

    #[test]
    fn test_degenerate_detected() {
        let opt = WeightOptimizer::default();
        let w = WeightVector::from_pairs([("a", 0.01), ("b", 0.01)]);
        assert!(matches!(
            opt.check_degenerate(&w),
            Err(CandlecastError::DegenerateWeights { tags: 2, .. })
        ));
        let healthy = WeightVector::from_pairs([("a", 0.01), ("b", 0.2)]);
        assert!(opt.check_degenerate(&healthy).is_ok());
        assert!(opt.check_degenerate(&WeightVector::new()).is_ok());
    }

    #[test]
    fn test_from_pairs_clamps_to_unit() {
        let w = WeightVector::from_pairs([("a", 1.5), ("b", -0.2)]);
        assert_eq!(w.get(&"a".into()), Some(1.0));
        assert_eq!(w.get(&"b".into()), Some(0.0));
    }

    #[test]
    fn test_config_validation() {
        assert!(OptimizerConfig::default().validate().is_ok());
        let bad = OptimizerConfig {
            floor: 0.6,
            ceiling: 0.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
