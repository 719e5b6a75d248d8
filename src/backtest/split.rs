use crate::domain::{CandleSeries, SeriesView};
use crate::error::{CandlecastError, Result};
use serde::{Deserialize, Serialize};

/// Absorbs float noise such as `100 * (0.7 + 0.15)` landing just below 85.
const RATIO_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Minimum candles in each of the three slices.
    pub min_slice_len: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self { min_slice_len: 20 }
    }
}

/// Three contiguous, non-overlapping, order-preserving windows of a series.
#[derive(Debug, Clone, Copy)]
pub struct TemporalSplit<'a> {
    pub training: SeriesView<'a>,
    pub validation: SeriesView<'a>,
    pub test: SeriesView<'a>,
}

/// Chronological train/validation/test splitter. Never shuffles.
#[derive(Debug, Clone, Default)]
pub struct TemporalSplitter {
    pub config: SplitConfig,
}

impl TemporalSplitter {
    pub fn new(config: SplitConfig) -> Self {
        Self { config }
    }

    /// Split `[0, train_end)`, `[train_end, val_end)`, `[val_end, N)` with
    /// `train_end = floor(N * train_ratio)` and
    /// `val_end = floor(N * (train_ratio + validation_ratio))`.
    pub fn split<'a>(
        &self,
        series: &'a CandleSeries,
        train_ratio: f64,
        validation_ratio: f64,
    ) -> Result<TemporalSplit<'a>> {
        let ratios_ok = train_ratio.is_finite()
            && validation_ratio.is_finite()
            && train_ratio > 0.0
            && validation_ratio >= 0.0
            && train_ratio + validation_ratio < 1.0;
        if !ratios_ok {
            return Err(CandlecastError::InvalidRatio {
                train_ratio,
                validation_ratio,
            });
        }

        let n = series.len();
        let train_end = floor_index(n, train_ratio);
        let val_end = floor_index(n, train_ratio + validation_ratio).max(train_end);

        let view = series.view();
        let split = TemporalSplit {
            training: slice(&view, 0, train_end)?,
            validation: slice(&view, train_end, val_end)?,
            test: slice(&view, val_end, n)?,
        };

        let min = self.config.min_slice_len;
        for (name, part) in [
            ("training", &split.training),
            ("validation", &split.validation),
            ("test", &split.test),
        ] {
            if part.len() < min {
                return Err(CandlecastError::InsufficientData {
                    slice: name,
                    len: part.len(),
                    min,
                });
            }
        }

        Ok(split)
    }
}

fn floor_index(n: usize, ratio: f64) -> usize {
    ((n as f64 * ratio + RATIO_EPSILON).floor() as usize).min(n)
}

fn slice<'a>(view: &SeriesView<'a>, from: usize, to: usize) -> Result<SeriesView<'a>> {
    view.slice(from, to).ok_or(CandlecastError::InsufficientData {
        slice: "series",
        len: view.len(),
        min: to,
    })
}
