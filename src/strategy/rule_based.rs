use super::patterns::{detect_patterns, PatternConfig};
use super::scorer::PatternScorer;
use crate::domain::*;
use crate::engine::weights::WeightVector;
use std::collections::BTreeSet;

/// Weighted vote over the built-in heuristics.
///
/// Each detected pattern votes for its color with its current weight
/// (`default_weight` for tags the vector has not seen yet). The heavier side
/// wins; confidence is the vote margin `|green - red| / (green + red)`.
/// A tie, or no votes at all, is an abstention.
#[derive(Debug, Clone)]
pub struct RuleBasedScorer {
    pub config: PatternConfig,
    pub default_weight: f64,
}

impl Default for RuleBasedScorer {
    fn default() -> Self {
        Self {
            config: PatternConfig::default(),
            default_weight: 0.1,
        }
    }
}

impl RuleBasedScorer {
    pub fn new(config: PatternConfig, default_weight: f64) -> Self {
        Self {
            config,
            default_weight,
        }
    }
}

impl PatternScorer for RuleBasedScorer {
    fn name(&self) -> &str {
        "rule-based"
    }

    fn predict(&mut self, history: &[Candle], weights: &WeightVector) -> Prediction {
        let detected = detect_patterns(history, &self.config);

        let mut green = 0.0;
        let mut red = 0.0;
        for d in &detected {
            let w = weights.get_or(&d.tag, self.default_weight);
            match d.direction {
                CandleColor::Green => green += w,
                CandleColor::Red => red += w,
            }
        }

        let total = green + red;
        if total <= 0.0 || (green - red).abs() < 1e-12 {
            return Prediction::neutral();
        }

        let winner = if green > red {
            CandleColor::Green
        } else {
            CandleColor::Red
        };
        let tags: BTreeSet<PatternTag> = detected
            .into_iter()
            .filter(|d| d.direction == winner)
            .map(|d| d.tag)
            .collect();

        Prediction::new(winner.into(), (green - red).abs() / total, tags)
    }
}
