pub mod backtest;
pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod strategy;

pub use error::{CandlecastError, Result};
