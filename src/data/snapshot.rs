use crate::domain::{Instrument, PatternTag};
use crate::engine::phase::LearningPhase;
use crate::engine::pipeline::InstrumentReport;
use crate::engine::weights::WeightVector;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSnapshot {
    pub trials: u64,
    pub correct: u64,
    /// Percent, 0-100.
    pub accuracy: f64,
}

/// What gets persisted for one instrument after a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSnapshot {
    pub instrument: Instrument,
    pub learning_phase: LearningPhase,
    /// Percent, 0-100, on the held-out test replay.
    pub overall_accuracy: f64,
    pub total_trials: u64,
    pub pattern_performance: BTreeMap<PatternTag, PatternSnapshot>,
    pub weights: WeightVector,
    pub updated_at: DateTime<Utc>,
}

impl LearningSnapshot {
    pub fn from_report(report: &InstrumentReport, updated_at: DateTime<Utc>) -> Self {
        let pattern_performance = report
            .performance
            .by_tag
            .iter()
            .map(|(tag, stats)| {
                (
                    tag.clone(),
                    PatternSnapshot {
                        trials: stats.trials,
                        correct: stats.correct,
                        accuracy: stats.accuracy * 100.0,
                    },
                )
            })
            .collect();

        Self {
            instrument: report.instrument.clone(),
            learning_phase: report.learning_phase(),
            overall_accuracy: report.test.accuracy * 100.0,
            total_trials: report.test.trials,
            pattern_performance,
            weights: report.weights.clone(),
            updated_at,
        }
    }
}

/// Post-validation callback. Receives every snapshot of one pass at once.
pub trait SnapshotSink: Send + Sync {
    fn publish(&self, snapshots: &[LearningSnapshot]) -> Result<()>;
}

/// Overwrites one pretty-printed JSON array per pass.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Vec<LearningSnapshot>> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl SnapshotSink for JsonFileSink {
    fn publish(&self, snapshots: &[LearningSnapshot]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(&self.path)?;
        let mut writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, snapshots)?;
        writer.flush()?;
        tracing::info!(path = %self.path.display(), count = snapshots.len(), "snapshots written");
        Ok(())
    }
}

/// Keeps every published batch. Tests and embedding callers.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<LearningSnapshot>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<LearningSnapshot>> {
        match self.batches.lock() {
            Ok(b) => b.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn latest(&self) -> Option<Vec<LearningSnapshot>> {
        self.batches().pop()
    }
}

impl SnapshotSink for MemorySink {
    fn publish(&self, snapshots: &[LearningSnapshot]) -> Result<()> {
        let mut batches = match self.batches.lock() {
            Ok(b) => b,
            Err(poisoned) => poisoned.into_inner(),
        };
        batches.push(snapshots.to_vec());
        Ok(())
    }
}
