use thiserror::Error;

/// Errors raised by one instrument's validation pipeline.
/// None of them are retried automatically; the caller decides whether to
/// re-run once more data is available.
#[derive(Debug, Error)]
pub enum CandlecastError {
    #[error("{instrument}: timestamp {timestamp} is not after last stored timestamp {last_timestamp}")]
    OutOfOrder {
        instrument: String,
        timestamp: i64,
        last_timestamp: i64,
    },

    #[error("candle for {found} appended to series of {expected}")]
    InstrumentMismatch { expected: String, found: String },

    #[error("{instrument} @ {timestamp}: invalid candle ({reason})")]
    InvalidCandle {
        instrument: String,
        timestamp: i64,
        reason: String,
    },

    #[error("invalid split ratios: train={train_ratio}, validation={validation_ratio}")]
    InvalidRatio {
        train_ratio: f64,
        validation_ratio: f64,
    },

    #[error("{slice} slice has {len} candles, need at least {min}")]
    InsufficientData {
        slice: &'static str,
        len: usize,
        min: usize,
    },

    #[error("all {tags} pattern weights collapsed to the floor {floor}")]
    DegenerateWeights { floor: f64, tags: usize },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CandlecastError>;
