use super::walk_forward::ValidationRecord;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Binomial, DiscreteCDF};

/// Scored-only summary of a replay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub trials: u64,
    pub correct: u64,
    /// Steps recorded but not scored.
    pub abstentions: u64,
    /// `correct / trials`; 0.0 when nothing was scored.
    pub accuracy: f64,
    /// One-sided probability of at least `correct` hits from a fair coin.
    pub p_value: f64,
}

pub fn summarize(records: &[ValidationRecord]) -> ValidationSummary {
    let trials = records.iter().filter(|r| r.correct.is_some()).count() as u64;
    let correct = records.iter().filter(|r| r.correct == Some(true)).count() as u64;
    let accuracy = if trials == 0 {
        0.0
    } else {
        correct as f64 / trials as f64
    };

    ValidationSummary {
        trials,
        correct,
        abstentions: records.len() as u64 - trials,
        accuracy,
        p_value: coin_flip_p_value(correct, trials),
    }
}

/// P(X >= correct) for X ~ Binomial(trials, 0.5).
pub fn coin_flip_p_value(correct: u64, trials: u64) -> f64 {
    if trials == 0 || correct == 0 {
        return 1.0;
    }
    match Binomial::new(0.5, trials) {
        Ok(dist) => (1.0 - dist.cdf(correct - 1)).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

/// Validation-vs-test comparison, run after the weights were tuned on the
/// validation slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverfittingResult {
    pub validation_accuracy: f64,
    pub test_accuracy: f64,
    pub degradation: f64,
    pub warnings: Vec<String>,
    pub likely_overfit: bool,
}

pub fn overfitting_check(validation: &ValidationSummary, test: &ValidationSummary) -> OverfittingResult {
    let mut warnings = Vec::new();

    let degradation = if validation.accuracy > 0.0 {
        1.0 - test.accuracy / validation.accuracy
    } else {
        0.0
    };

    if degradation > 0.5 {
        warnings.push(format!(
            "High accuracy degradation ({:.0}%) from validation to test",
            degradation * 100.0
        ));
    }

    if validation.trials > 0 && validation.accuracy > 0.95 {
        warnings.push(format!(
            "Suspiciously high validation accuracy: {:.1}%",
            validation.accuracy * 100.0
        ));
    }

    OverfittingResult {
        validation_accuracy: validation.accuracy,
        test_accuracy: test.accuracy,
        degradation,
        warnings,
        likely_overfit: degradation > 0.7,
    }
}

impl ValidationSummary {
    pub fn print_summary(&self, label: &str) {
        println!("\n--- {} ---", label);
        println!("  Trials:       {:>8}", self.trials);
        println!("  Correct:      {:>8}", self.correct);
        println!("  Abstentions:  {:>8}", self.abstentions);
        println!("  Accuracy:     {:>7.2}%", self.accuracy * 100.0);
        println!("  P-value:      {:>8.4}", self.p_value);
    }
}

impl OverfittingResult {
    pub fn print_summary(&self) {
        println!("\n--- Overfitting Check ---");
        println!("  Validation accuracy: {:.1}%", self.validation_accuracy * 100.0);
        println!("  Test accuracy:       {:.1}%", self.test_accuracy * 100.0);
        println!("  Degradation:         {:.0}%", self.degradation * 100.0);
        println!("  Likely overfit:      {}", self.likely_overfit);
        for w in &self.warnings {
            println!("  WARNING: {}", w);
        }
    }
}
