use super::phase::{LearningPhase, PhaseClassifier, PhaseState};
use super::weights::{WeightOptimizer, WeightVector};
use crate::backtest::*;
use crate::config::PipelineConfig;
use crate::domain::{CandleSeries, Instrument};
use crate::error::Result;
use crate::evaluation::{aggregate, PerformanceReport};
use crate::strategy::scorer::PatternScorer;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What one instrument carries from one pass to the next.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentState {
    pub weights: WeightVector,
    pub phase: PhaseState,
}

/// Per-instrument learning memory, owned by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningState {
    instruments: BTreeMap<Instrument, InstrumentState>,
}

impl LearningState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, instrument: &Instrument) -> Option<&InstrumentState> {
        self.instruments.get(instrument)
    }

    /// Stored state, or a fresh one for an instrument seen for the first time.
    pub fn state_for(&self, instrument: &Instrument) -> InstrumentState {
        self.instruments.get(instrument).cloned().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Instrument, &InstrumentState)> {
        self.instruments.iter()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Keep the new weights and phase of every instrument that completed.
    /// Failed instruments keep their previous state.
    pub fn apply(&mut self, outcome: &FanOutResult) {
        for report in outcome.successes() {
            self.instruments.insert(
                report.instrument.clone(),
                InstrumentState {
                    weights: report.weights.clone(),
                    phase: report.phase,
                },
            );
        }
    }
}

/// Full result of one instrument's pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentReport {
    pub instrument: Instrument,
    pub training: ValidationSummary,
    pub validation: ValidationSummary,
    pub test: ValidationSummary,
    /// Held-out tables, replayed with the final weights.
    pub performance: PerformanceReport,
    pub weights: WeightVector,
    pub phase: PhaseState,
    pub overfitting: OverfittingResult,
    pub warnings: Vec<String>,
}

impl InstrumentReport {
    pub fn learning_phase(&self) -> LearningPhase {
        self.phase.current()
    }

    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("  {}  phase={}", self.instrument, self.learning_phase());
        println!("{}", "=".repeat(60));
        self.training.print_summary("Training replay");
        self.validation.print_summary("Validation replay");
        self.test.print_summary("Test replay (held out)");
        self.overfitting.print_summary();
        if !self.performance.by_tag.is_empty() {
            println!("\n--- Pattern performance (test) ---");
            for (tag, stats) in self.performance.by_tag.iter() {
                println!(
                    "  {:<32} trials={:>5} acc={:>6.1}% weight={:.3}",
                    tag.as_str(),
                    stats.trials,
                    stats.accuracy * 100.0,
                    self.weights.get(tag).unwrap_or(0.0)
                );
            }
        }
        for w in &self.warnings {
            println!("  WARNING: {}", w);
        }
    }
}

/// One instrument's pass: chronological split, then
/// training replay -> adapt, validation replay -> adapt, test replay with the
/// final weights. The phase is classified on the held-out test replay.
pub fn run_instrument<S: PatternScorer + ?Sized>(
    series: &CandleSeries,
    scorer: &mut S,
    state: &InstrumentState,
    config: &PipelineConfig,
) -> Result<InstrumentReport> {
    config.validate()?;
    let splitter = TemporalSplitter::new(config.split.clone());
    let validator = WalkForwardValidator::new(config.validator.clone());
    let optimizer = WeightOptimizer::new(config.optimizer.clone());
    let classifier = PhaseClassifier::new(config.phase.clone());

    let split = splitter.split(series, config.train_ratio, config.validation_ratio)?;

    let training = validator.run(split.training, scorer, &state.weights, config.min_confidence);
    let learned = optimizer.optimize(
        &state.weights,
        &aggregate(&training.records).by_tag,
        config.learning_rate,
    );

    let validation = validator.run(split.validation, scorer, &learned, config.min_confidence);
    let tuned = optimizer.optimize(
        &learned,
        &aggregate(&validation.records).by_tag,
        config.learning_rate,
    );

    let test = validator.run(split.test, scorer, &tuned, config.min_confidence);
    let performance = aggregate(&test.records);

    let overfitting = overfitting_check(&validation.summary, &test.summary);
    let mut warnings = overfitting.warnings.clone();

    let phase = classifier.classify(test.summary.accuracy, test.summary.trials, &state.phase);
    if phase.phase != state.phase.phase {
        tracing::info!(
            instrument = %series.instrument(),
            from = %state.phase.current(),
            to = %phase.current(),
            accuracy = test.summary.accuracy,
            trials = test.summary.trials,
            "learning phase changed"
        );
    }

    if let Err(e) = optimizer.check_degenerate(&tuned) {
        tracing::warn!(instrument = %series.instrument(), "{}", e);
        warnings.push(e.to_string());
    }

    Ok(InstrumentReport {
        instrument: series.instrument().clone(),
        training: training.summary,
        validation: validation.summary,
        test: test.summary,
        performance,
        weights: tuned,
        phase,
        overfitting,
        warnings,
    })
}

/// Outcome of validating several instruments side by side.
#[derive(Debug)]
pub struct FanOutResult {
    /// In input order. A failure only affects its own instrument.
    pub results: Vec<(Instrument, Result<InstrumentReport>)>,
    /// Held-out tables of all successful instruments merged together.
    pub merged: PerformanceReport,
}

impl FanOutResult {
    pub fn successes(&self) -> impl Iterator<Item = &InstrumentReport> {
        self.results.iter().filter_map(|(_, r)| r.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Instrument, &crate::error::CandlecastError)> {
        self.results
            .iter()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| (i, e)))
    }
}

/// Validate every series in parallel, one scorer clone per instrument, then
/// merge the independent tables.
pub fn run_fan_out<S>(
    series: &[CandleSeries],
    scorer: &S,
    state: &LearningState,
    config: &PipelineConfig,
) -> FanOutResult
where
    S: PatternScorer + Clone + Send + Sync,
{
    let results: Vec<(Instrument, Result<InstrumentReport>)> = series
        .par_iter()
        .map(|s| {
            let mut scorer = scorer.clone();
            let instrument_state = state.state_for(s.instrument());
            let result = run_instrument(s, &mut scorer, &instrument_state, config);
            if let Err(e) = &result {
                tracing::warn!(instrument = %s.instrument(), "skipping instrument: {}", e);
            }
            (s.instrument().clone(), result)
        })
        .collect();

    let mut merged = PerformanceReport::default();
    for (_, result) in &results {
        if let Ok(report) = result {
            merged.merge(&report.performance);
        }
    }

    FanOutResult { results, merged }
}
