use crate::backtest::walk_forward::ValidationRecord;
use crate::domain::{Instrument, PatternTag};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hit counts for one key of a performance table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub trials: u64,
    pub correct: u64,
    /// `correct / trials`, 0.0 with no trials.
    pub accuracy: f64,
}

impl PerformanceStats {
    pub fn from_counts(trials: u64, correct: u64) -> Self {
        let correct = correct.min(trials);
        Self {
            trials,
            correct,
            accuracy: ratio(correct, trials),
        }
    }

    pub fn record(&mut self, correct: bool) {
        *self = Self::from_counts(self.trials + 1, self.correct + u64::from(correct));
    }

    pub fn merge(&mut self, other: &PerformanceStats) {
        *self = Self::from_counts(self.trials + other.trials, self.correct + other.correct);
    }
}

fn ratio(correct: u64, trials: u64) -> f64 {
    if trials == 0 {
        0.0
    } else {
        correct as f64 / trials as f64
    }
}

/// Accuracy fold keyed by `K`. Holds counts only, never raw records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerformanceTable<K: Ord> {
    entries: BTreeMap<K, PerformanceStats>,
}

impl<K: Ord> Default for PerformanceTable<K> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> PerformanceTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: K, stats: PerformanceStats) {
        self.entries.insert(key, stats);
    }

    pub fn record(&mut self, key: K, correct: bool) {
        self.entries.entry(key).or_default().record(correct);
    }

    pub fn get(&self, key: &K) -> Option<&PerformanceStats> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &PerformanceStats)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fan-in of an independently computed table.
    pub fn merge(&mut self, other: &PerformanceTable<K>) {
        for (key, stats) in other.iter() {
            self.entries.entry(key.clone()).or_default().merge(stats);
        }
    }
}

/// Position of a record within the replay order: first, second or last third.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalSegment {
    Early,
    Middle,
    Recent,
}

impl TemporalSegment {
    /// Segment of the `position`-th record out of `total`.
    pub fn of(position: usize, total: usize) -> Self {
        if total == 0 {
            return TemporalSegment::Early;
        }
        match position * 3 / total {
            0 => TemporalSegment::Early,
            1 => TemporalSegment::Middle,
            _ => TemporalSegment::Recent,
        }
    }
}

/// The three accuracy tables of one replay, plus the overall tally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub by_tag: PerformanceTable<PatternTag>,
    pub by_segment: PerformanceTable<TemporalSegment>,
    pub by_instrument: PerformanceTable<Instrument>,
    pub overall: PerformanceStats,
}

impl PerformanceReport {
    pub fn merge(&mut self, other: &PerformanceReport) {
        self.by_tag.merge(&other.by_tag);
        self.by_segment.merge(&other.by_segment);
        self.by_instrument.merge(&other.by_instrument);
        self.overall.merge(&other.overall);
    }
}

/// Fold validation records into per-tag, per-segment and per-instrument
/// tables. Abstentions (`correct == None`) are left out of every table but
/// still count toward the segment boundaries.
pub fn aggregate(records: &[ValidationRecord]) -> PerformanceReport {
    let mut report = PerformanceReport::default();
    let total = records.len();

    for (position, record) in records.iter().enumerate() {
        let Some(correct) = record.correct else {
            continue;
        };

        for tag in &record.tags {
            report.by_tag.record(tag.clone(), correct);
        }
        report
            .by_segment
            .record(TemporalSegment::of(position, total), correct);
        report
            .by_instrument
            .record(record.instrument.clone(), correct);
        report.overall.record(correct);
    }

    report
}
