use crate::error::{CandlecastError, Result};
use serde::{Deserialize, Serialize};

/// Coarse readiness of the prediction model, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LearningPhase {
    Initial,
    Learning,
    Optimizing,
    Ready,
    Master,
}

impl LearningPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningPhase::Initial => "INITIAL",
            LearningPhase::Learning => "LEARNING",
            LearningPhase::Optimizing => "OPTIMIZING",
            LearningPhase::Ready => "READY",
            LearningPhase::Master => "MASTER",
        }
    }

    /// Whether downstream consumers may emit live signals in this phase.
    pub fn allows_live_signals(&self) -> bool {
        *self >= LearningPhase::Ready
    }
}

impl std::fmt::Display for LearningPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accuracy cut-offs as fractions in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseThresholds {
    /// Thresholds apply only once scored trials exceed this; until then the
    /// phase is always `Initial`.
    pub min_trials: u64,
    pub learning: f64,
    pub optimizing: f64,
    pub ready: f64,
    pub master: f64,
}

impl Default for PhaseThresholds {
    fn default() -> Self {
        Self {
            min_trials: 30,
            learning: 0.40,
            optimizing: 0.60,
            ready: 0.80,
            master: 0.95,
        }
    }
}

impl PhaseThresholds {
    pub fn validate(&self) -> Result<()> {
        let ordered = 0.0 <= self.learning
            && self.learning <= self.optimizing
            && self.optimizing <= self.ready
            && self.ready <= self.master
            && self.master <= 1.0;
        if !ordered {
            return Err(CandlecastError::Config(format!(
                "phase thresholds must be ascending within [0, 1]: {:?}",
                self
            )));
        }
        Ok(())
    }
}

/// Classifier output plus the hysteresis memory carried to the next call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseState {
    /// `None` before the first classification.
    pub phase: Option<LearningPhase>,
    /// Higher phase qualified for on the last call but not yet confirmed.
    pub pending: Option<LearningPhase>,
}

impl PhaseState {
    pub fn current(&self) -> LearningPhase {
        self.phase.unwrap_or(LearningPhase::Initial)
    }
}

/// Maps `(accuracy, trials)` to a phase with asymmetric hysteresis:
/// moving up needs two consecutive qualifying calls, moving down is
/// immediate. The very first call has nothing to confirm against and takes
/// the raw phase.
#[derive(Debug, Clone, Default)]
pub struct PhaseClassifier {
    pub thresholds: PhaseThresholds,
}

impl PhaseClassifier {
    pub fn new(thresholds: PhaseThresholds) -> Self {
        Self { thresholds }
    }

    /// Phase from the threshold table alone, without hysteresis.
    pub fn raw_phase(&self, accuracy: f64, total_trials: u64) -> LearningPhase {
        let t = &self.thresholds;
        if total_trials <= t.min_trials || !accuracy.is_finite() {
            return LearningPhase::Initial;
        }
        if accuracy >= t.master {
            LearningPhase::Master
        } else if accuracy >= t.ready {
            LearningPhase::Ready
        } else if accuracy >= t.optimizing {
            LearningPhase::Optimizing
        } else if accuracy >= t.learning {
            LearningPhase::Learning
        } else {
            LearningPhase::Initial
        }
    }

    pub fn classify(&self, accuracy: f64, total_trials: u64, previous: &PhaseState) -> PhaseState {
        let target = self.raw_phase(accuracy, total_trials);

        let Some(current) = previous.phase else {
            return PhaseState {
                phase: Some(target),
                pending: None,
            };
        };

        if target <= current {
            return PhaseState {
                phase: Some(target),
                pending: None,
            };
        }

        match previous.pending {
            // Second qualifying call in a row: move to the highest phase
            // both calls met. A higher target met on this call stays pending.
            Some(pending) if pending > current => {
                let next = pending.min(target);
                PhaseState {
                    phase: Some(next),
                    pending: (target > next).then_some(target),
                }
            }
            _ => PhaseState {
                phase: Some(current),
                pending: Some(target),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LearningPhase::*;

    fn run(classifier: &PhaseClassifier, calls: &[(f64, u64)]) -> Vec<LearningPhase> {
        let mut state = PhaseState::default();
        calls
            .iter()
            .map(|&(acc, trials)| {
                state = classifier.classify(acc, trials, &state);
                state.current()
            })
            .collect()
    }

    #[test]
    fn test_raw_table() {
        let c = PhaseClassifier::default();
        assert_eq!(c.raw_phase(0.96, 100), Master);
        assert_eq!(c.raw_phase(0.95, 100), Master);
        assert_eq!(c.raw_phase(0.85, 100), Ready);
        assert_eq!(c.raw_phase(0.80, 100), Ready);
        assert_eq!(c.raw_phase(0.65, 100), Optimizing);
        assert_eq!(c.raw_phase(0.45, 100), Learning);
        assert_eq!(c.raw_phase(0.39, 100), Initial);
    }

    #[test]
    fn test_small_sample_forced_initial() {
        let c = PhaseClassifier::default();
        assert_eq!(c.raw_phase(0.99, 29), Initial);
        assert_eq!(c.raw_phase(0.99, 30), Initial);
        assert_eq!(c.raw_phase(0.99, 31), Master);
        assert_eq!(c.raw_phase(f64::NAN, 100), Initial);
    }

    #[test]
    fn test_upgrade_needs_two_consecutive_calls() {
        let c = PhaseClassifier::default();
        let phases = run(&c, &[(0.50, 100), (0.96, 100), (0.96, 100)]);
        assert_eq!(phases, vec![Learning, Learning, Master]);
    }

    #[test]
    fn test_downgrade_is_immediate() {
        let c = PhaseClassifier::default();
        let phases = run(&c, &[(0.96, 100), (0.50, 100)]);
        assert_eq!(phases, vec![Master, Learning]);
    }

    #[test]
    fn test_interrupted_upgrade_resets() {
        let c = PhaseClassifier::default();
        let phases = run(&c, &[(0.50, 100), (0.96, 100), (0.50, 100), (0.96, 100)]);
        assert_eq!(phases, vec![Learning, Learning, Learning, Learning]);
    }

    #[test]
    fn test_upgrade_to_lower_of_two_qualifying_targets() {
        let c = PhaseClassifier::default();
        let phases = run(&c, &[(0.50, 100), (0.85, 100), (0.97, 100), (0.97, 100)]);
        assert_eq!(phases, vec![Learning, Learning, Ready, Master]);
    }

    #[test]
    fn test_target_met_on_confirming_call_stays_pending() {
        let c = PhaseClassifier::default();
        let mut state = PhaseState::default();
        for &acc in &[0.50, 0.85, 0.97] {
            state = c.classify(acc, 100, &state);
        }
        assert_eq!(state.phase, Some(Ready));
        assert_eq!(state.pending, Some(Master));

        // Dropping back to Ready's band clears the pending upgrade.
        let state = c.classify(0.85, 100, &state);
        assert_eq!(state.phase, Some(Ready));
        assert_eq!(state.pending, None);
    }

    #[test]
    fn test_shrinking_sample_drops_to_initial() {
        let c = PhaseClassifier::default();
        let phases = run(&c, &[(0.90, 100), (0.90, 10)]);
        assert_eq!(phases, vec![Ready, Initial]);
    }

    #[test]
    fn test_flapping_accuracy_does_not_flap_upward() {
        let c = PhaseClassifier::default();
        let calls: Vec<(f64, u64)> = (0..20)
            .map(|i| if i % 2 == 0 { (0.55, 100) } else { (0.65, 100) })
            .collect();
        let phases = run(&c, &calls);
        assert!(phases.iter().all(|&p| p == Learning));
    }

    #[test]
    fn test_live_signal_gate() {
        assert!(!Optimizing.allows_live_signals());
        assert!(Ready.allows_live_signals());
        assert!(Master.allows_live_signals());
    }

    #[test]
    fn test_phase_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Optimizing).unwrap(), "\"OPTIMIZING\"");
        assert_eq!(Master.to_string(), "MASTER");
    }

    #[test]
    fn test_threshold_validation() {
        assert!(PhaseThresholds::default().validate().is_ok());
        let bad = PhaseThresholds {
            ready: 0.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
