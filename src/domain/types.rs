use crate::error::{CandlecastError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Traded instrument identifier
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instrument(pub String);

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Instrument {
    fn from(s: &str) -> Self {
        Instrument(s.to_string())
    }
}

/// Color of a closed candle. There is no third state: a flat candle is green.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CandleColor {
    Green,
    Red,
}

/// One raw row handed over by the ingestion collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleRecord {
    pub instrument: String,
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One OHLCV observation for one instrument. Immutable once built; the color
/// is always derived from open/close and never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    instrument: Instrument,
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl Candle {
    pub fn new(
        instrument: impl Into<Instrument>,
        timestamp: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self> {
        let instrument = instrument.into();
        let invalid = |reason: &str| CandlecastError::InvalidCandle {
            instrument: instrument.0.clone(),
            timestamp,
            reason: reason.to_string(),
        };

        let values = [open, high, low, close, volume];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(invalid("non-finite value"));
        }
        if values.iter().any(|&v| v < 0.0) {
            return Err(invalid("negative value"));
        }
        if low > open.min(close) || high < open.max(close) {
            return Err(invalid("open/close outside low..high"));
        }

        Ok(Self {
            instrument,
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn open(&self) -> f64 {
        self.open
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn close(&self) -> f64 {
        self.close
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn color(&self) -> CandleColor {
        if self.close >= self.open {
            CandleColor::Green
        } else {
            CandleColor::Red
        }
    }
}

impl TryFrom<CandleRecord> for Candle {
    type Error = CandlecastError;

    fn try_from(r: CandleRecord) -> Result<Self> {
        Candle::new(
            Instrument(r.instrument),
            r.timestamp,
            r.open,
            r.high,
            r.low,
            r.close,
            r.volume,
        )
    }
}

/// Name of a structural feature detected in a short candle history.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternTag(pub String);

impl PatternTag {
    pub fn new(name: impl Into<String>) -> Self {
        PatternTag(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PatternTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PatternTag {
    fn from(s: &str) -> Self {
        PatternTag(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PredictedColor {
    Green,
    Red,
    /// No trade. Never scored.
    Neutral,
}

impl PredictedColor {
    /// `None` for a neutral prediction.
    pub fn is_correct(self, actual: CandleColor) -> Option<bool> {
        match self {
            PredictedColor::Green => Some(actual == CandleColor::Green),
            PredictedColor::Red => Some(actual == CandleColor::Red),
            PredictedColor::Neutral => None,
        }
    }
}

impl From<CandleColor> for PredictedColor {
    fn from(c: CandleColor) -> Self {
        match c {
            CandleColor::Green => PredictedColor::Green,
            CandleColor::Red => PredictedColor::Red,
        }
    }
}

/// Scorer output at one index of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub predicted_color: PredictedColor,
    /// Ordinal only. Not a calibrated probability.
    pub confidence: f64,
    pub contributing_tags: BTreeSet<PatternTag>,
}

impl Prediction {
    pub fn new(
        predicted_color: PredictedColor,
        confidence: f64,
        contributing_tags: BTreeSet<PatternTag>,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            predicted_color,
            confidence,
            contributing_tags,
        }
    }

    pub fn neutral() -> Self {
        Self {
            predicted_color: PredictedColor::Neutral,
            confidence: 0.0,
            contributing_tags: BTreeSet::new(),
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.predicted_color == PredictedColor::Neutral
    }
}
