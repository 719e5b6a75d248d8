use crate::domain::*;
use crate::engine::weights::WeightVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

/// Boundary between "how a prediction is made" and the validation harness.
///
/// The harness hands the scorer the candles known at decision time (oldest
/// first, the last one just closed) and a read-only weight snapshot. Any
/// scoring strategy (rule-based, statistical, learned) plugs in here without
/// touching the replay, aggregation or adaptation code.
pub trait PatternScorer {
    fn name(&self) -> &str;

    /// Predict the color of the candle after `history.last()`.
    fn predict(&mut self, history: &[Candle], weights: &WeightVector) -> Prediction;
}

/// Always returns the same prediction. Baseline and harness tests.
#[derive(Debug, Clone)]
pub struct ConstantScorer {
    prediction: Prediction,
}

impl ConstantScorer {
    pub fn new(color: PredictedColor, confidence: f64) -> Self {
        Self {
            prediction: Prediction::new(color, confidence, BTreeSet::new()),
        }
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<PatternTag>,
    {
        self.prediction.contributing_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn neutral() -> Self {
        Self {
            prediction: Prediction::neutral(),
        }
    }
}

impl PatternScorer for ConstantScorer {
    fn name(&self) -> &str {
        "constant"
    }

    fn predict(&mut self, _history: &[Candle], _weights: &WeightVector) -> Prediction {
        self.prediction.clone()
    }
}

pub const RANDOM_FALLBACK_TAG: &str = "random-fallback";

/// Coin-flip scorer for "no signal available". Seeded, so two scorers built
/// with the same seed emit the same sequence.
#[derive(Debug, Clone)]
pub struct SeededRandomScorer {
    rng: StdRng,
}

impl SeededRandomScorer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl PatternScorer for SeededRandomScorer {
    fn name(&self) -> &str {
        "seeded-random"
    }

    fn predict(&mut self, history: &[Candle], _weights: &WeightVector) -> Prediction {
        if history.is_empty() {
            return Prediction::neutral();
        }
        let color = if self.rng.gen_bool(0.5) {
            PredictedColor::Green
        } else {
            PredictedColor::Red
        };
        let confidence = self.rng.gen_range(0.0..1.0);
        Prediction::new(
            color,
            confidence,
            BTreeSet::from([PatternTag::from(RANDOM_FALLBACK_TAG)]),
        )
    }
}
