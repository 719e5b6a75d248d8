use crate::domain::indicators::{closes, momentum, rsi, sma};
use crate::domain::{Candle, CandleColor, PatternTag};
use serde::{Deserialize, Serialize};

pub const CONTINUATION_UP: &str = "two-candle-continuation-up";
pub const CONTINUATION_DOWN: &str = "two-candle-continuation-down";
pub const PULLBACK_REVERSAL_UP: &str = "pullback-reversal-up";
pub const PULLBACK_REVERSAL_DOWN: &str = "pullback-reversal-down";
pub const RSI_OVERSOLD: &str = "rsi-oversold";
pub const RSI_OVERBOUGHT: &str = "rsi-overbought";
pub const MOMENTUM_UP: &str = "momentum-up";
pub const MOMENTUM_DOWN: &str = "momentum-down";
pub const TREND_UP: &str = "trend-up";
pub const TREND_DOWN: &str = "trend-down";

/// Thresholds for the built-in heuristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub momentum_period: usize,
    /// Percent move over `momentum_period` to count as momentum.
    pub momentum_threshold_pct: f64,
    pub fast_sma: usize,
    pub slow_sma: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            momentum_period: 5,
            momentum_threshold_pct: 1.0,
            fast_sma: 5,
            slow_sma: 10,
        }
    }
}

/// A tag found at the last candle of a history, with the color it votes for.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedPattern {
    pub tag: PatternTag,
    pub direction: CandleColor,
}

impl DetectedPattern {
    fn new(tag: &str, direction: CandleColor) -> Self {
        Self {
            tag: PatternTag::from(tag),
            direction,
        }
    }
}

/// Detect every pattern present at the end of `history`.
/// Only reads `history`; the last candle is the one that just closed.
pub fn detect_patterns(history: &[Candle], config: &PatternConfig) -> Vec<DetectedPattern> {
    let mut found = Vec::new();
    let n = history.len();

    if n >= 2 {
        let (prev, last) = (&history[n - 2], &history[n - 1]);
        match (prev.color(), last.color()) {
            (CandleColor::Green, CandleColor::Green) if last.close() > prev.close() => {
                found.push(DetectedPattern::new(CONTINUATION_UP, CandleColor::Green));
            }
            (CandleColor::Red, CandleColor::Red) if last.close() < prev.close() => {
                found.push(DetectedPattern::new(CONTINUATION_DOWN, CandleColor::Red));
            }
            _ => {}
        }
    }

    if n >= 3 {
        let (first, pullback, last) = (&history[n - 3], &history[n - 2], &history[n - 1]);
        match (first.color(), pullback.color(), last.color()) {
            (CandleColor::Green, CandleColor::Red, CandleColor::Green)
                if last.close() > pullback.open() =>
            {
                found.push(DetectedPattern::new(PULLBACK_REVERSAL_UP, CandleColor::Green));
            }
            (CandleColor::Red, CandleColor::Green, CandleColor::Red)
                if last.close() < pullback.open() =>
            {
                found.push(DetectedPattern::new(PULLBACK_REVERSAL_DOWN, CandleColor::Red));
            }
            _ => {}
        }
    }

    let prices = closes(history);

    if prices.len() > config.rsi_period {
        let r = rsi(&prices, config.rsi_period);
        if r <= config.rsi_oversold {
            found.push(DetectedPattern::new(RSI_OVERSOLD, CandleColor::Green));
        } else if r >= config.rsi_overbought {
            found.push(DetectedPattern::new(RSI_OVERBOUGHT, CandleColor::Red));
        }
    }

    if prices.len() > config.momentum_period {
        let m = momentum(&prices, config.momentum_period);
        if m >= config.momentum_threshold_pct {
            found.push(DetectedPattern::new(MOMENTUM_UP, CandleColor::Green));
        } else if m <= -config.momentum_threshold_pct {
            found.push(DetectedPattern::new(MOMENTUM_DOWN, CandleColor::Red));
        }
    }

    if prices.len() >= config.slow_sma && config.fast_sma < config.slow_sma {
        let fast = sma(&prices, config.fast_sma);
        let slow = sma(&prices, config.slow_sma);
        if fast > slow {
            found.push(DetectedPattern::new(TREND_UP, CandleColor::Green));
        } else if fast < slow {
            found.push(DetectedPattern::new(TREND_DOWN, CandleColor::Red));
        }
    }

    found
}
