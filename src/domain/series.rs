use super::types::{Candle, Instrument};
use crate::error::{CandlecastError, Result};

/// Ordered candles of one instrument, strictly increasing by timestamp.
/// Append-only: existing candles are never replaced or reordered.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    instrument: Instrument,
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(instrument: impl Into<Instrument>) -> Self {
        Self {
            instrument: instrument.into(),
            candles: Vec::new(),
        }
    }

    pub fn from_candles(
        instrument: impl Into<Instrument>,
        candles: impl IntoIterator<Item = Candle>,
    ) -> Result<Self> {
        let mut series = Self::new(instrument);
        for candle in candles {
            series.append(candle)?;
        }
        Ok(series)
    }

    /// Append a candle. Returns `Ok(false)` when an identical candle is already
    /// stored at that timestamp (idempotent re-append).
    pub fn append(&mut self, candle: Candle) -> Result<bool> {
        if candle.instrument() != &self.instrument {
            return Err(CandlecastError::InstrumentMismatch {
                expected: self.instrument.0.clone(),
                found: candle.instrument().0.clone(),
            });
        }

        if let Some(last) = self.candles.last() {
            if candle.timestamp() <= last.timestamp() {
                let existing = self
                    .candles
                    .binary_search_by_key(&candle.timestamp(), |c| c.timestamp())
                    .ok()
                    .map(|i| &self.candles[i]);
                if existing == Some(&candle) {
                    return Ok(false);
                }
                return Err(CandlecastError::OutOfOrder {
                    instrument: self.instrument.0.clone(),
                    timestamp: candle.timestamp(),
                    last_timestamp: last.timestamp(),
                });
            }
        }

        self.candles.push(candle);
        Ok(true)
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn view(&self) -> SeriesView<'_> {
        SeriesView {
            instrument: &self.instrument,
            candles: &self.candles,
            offset: 0,
        }
    }

    /// Read-only view over `[from, to)`. `None` if the range is out of bounds.
    pub fn slice(&self, from: usize, to: usize) -> Option<SeriesView<'_>> {
        self.view().slice(from, to)
    }

    /// Indices `i` where the step from candle `i - 1` to `i` is wider than
    /// `interval_ms`, paired with the missing duration. Gaps are reported,
    /// never filled.
    pub fn gaps(&self, interval_ms: i64) -> Vec<(usize, i64)> {
        self.candles
            .windows(2)
            .enumerate()
            .filter_map(|(i, w)| {
                let delta = w[1].timestamp() - w[0].timestamp();
                (delta > interval_ms).then_some((i + 1, delta - interval_ms))
            })
            .collect()
    }
}

/// Borrowed, contiguous window of a `CandleSeries`. Keeps the parent's
/// ordering guarantee and remembers where it starts in the parent.
#[derive(Debug, Clone, Copy)]
pub struct SeriesView<'a> {
    instrument: &'a Instrument,
    candles: &'a [Candle],
    offset: usize,
}

impl<'a> SeriesView<'a> {
    pub fn instrument(&self) -> &'a Instrument {
        self.instrument
    }

    pub fn candles(&self) -> &'a [Candle] {
        self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a Candle> {
        self.candles.get(index)
    }

    /// Position of this view's first candle in the parent series.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn slice(&self, from: usize, to: usize) -> Option<SeriesView<'a>> {
        if from > to || to > self.candles.len() {
            return None;
        }
        Some(SeriesView {
            instrument: self.instrument,
            candles: &self.candles[from..to],
            offset: self.offset + from,
        })
    }

    /// Candles `[0, index]`: everything known once candle `index` has closed.
    pub fn history(&self, index: usize) -> &'a [Candle] {
        &self.candles[..(index + 1).min(self.candles.len())]
    }
}
