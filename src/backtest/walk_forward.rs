use super::validation::{summarize, ValidationSummary};
use crate::domain::*;
use crate::engine::weights::WeightVector;
use crate::strategy::scorer::PatternScorer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// First index a prediction is made at; pattern detection needs history.
    pub warmup: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self { warmup: 10 }
    }
}

/// One step of a walk-forward replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// Index of the predicting candle in the parent series.
    pub index: usize,
    pub instrument: Instrument,
    pub timestamp: i64,
    pub predicted: PredictedColor,
    /// Color of the candle at `index + 1`.
    pub actual: CandleColor,
    pub confidence: f64,
    pub tags: BTreeSet<PatternTag>,
    /// `None` when the prediction abstained (neutral or under the confidence gate).
    pub correct: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRun {
    pub instrument: Instrument,
    pub records: Vec<ValidationRecord>,
    pub summary: ValidationSummary,
}

/// Candle-by-candle replay of a series through a scorer.
///
/// ANTI-LOOK-AHEAD: at index i the scorer sees candles [0..=i] of the
/// replayed view and nothing later; the outcome is the color of i + 1.
#[derive(Debug, Clone, Default)]
pub struct WalkForwardValidator {
    pub config: ValidatorConfig,
}

impl WalkForwardValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Replay `series`. Reads only; the view and the weights are untouched,
    /// so the same validator can run on the validation and test slices.
    pub fn run<S: PatternScorer + ?Sized>(
        &self,
        series: SeriesView<'_>,
        scorer: &mut S,
        weights: &WeightVector,
        min_confidence: f64,
    ) -> ValidationRun {
        let candles = series.candles();
        let last = candles.len().saturating_sub(1);
        let mut records = Vec::with_capacity(last.saturating_sub(self.config.warmup));

        let mut i = self.config.warmup;
        while i < last {
            let history = series.history(i);
            debug_assert_eq!(
                history.last().map(|c| c.timestamp()),
                Some(candles[i].timestamp()),
                "LOOK-AHEAD VIOLATION: history at index {} does not end at the current candle",
                i
            );

            let prediction = scorer.predict(history, weights);
            let actual = candles[i + 1].color();
            let scored = !prediction.is_neutral() && prediction.confidence >= min_confidence;
            let correct = if scored {
                prediction.predicted_color.is_correct(actual)
            } else {
                None
            };

            records.push(ValidationRecord {
                index: series.offset() + i,
                instrument: series.instrument().clone(),
                timestamp: candles[i].timestamp(),
                predicted: prediction.predicted_color,
                actual,
                confidence: prediction.confidence,
                tags: prediction.contributing_tags,
                correct,
            });
            i += 1;
        }

        let summary = summarize(&records);
        tracing::debug!(
            instrument = %series.instrument(),
            steps = records.len(),
            trials = summary.trials,
            accuracy = summary.accuracy,
            "walk-forward replay finished"
        );

        ValidationRun {
            instrument: series.instrument().clone(),
            records,
            summary,
        }
    }
}
