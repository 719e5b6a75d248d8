use crate::domain::{Candle, CandleRecord, CandleSeries, Instrument};
use crate::engine::scheduler::CandleSource;
use crate::error::{CandlecastError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Read candle rows from a CSV file with the header
/// `instrument,timestamp,open,high,low,close,volume`.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<CandleRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(CandlecastError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("candle file not found: {}", path.display()),
        )));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        let record: CandleRecord = row?;
        records.push(record);
    }
    Ok(records)
}

/// Write candles in the layout [`load_records`] reads.
pub fn save_candles(candles: &[Candle], path: impl AsRef<Path>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for c in candles {
        writer.serialize(CandleRecord {
            instrument: c.instrument().0.clone(),
            timestamp: c.timestamp(),
            open: c.open(),
            high: c.high(),
            low: c.low(),
            close: c.close(),
            volume: c.volume(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Group rows by instrument and append them in file order.
///
/// Each instrument stands alone: an invalid or out-of-order row fails that
/// instrument only. Exact duplicates are skipped.
pub fn build_series(records: Vec<CandleRecord>) -> BTreeMap<Instrument, Result<CandleSeries>> {
    let mut grouped: BTreeMap<Instrument, Vec<CandleRecord>> = BTreeMap::new();
    for r in records {
        grouped
            .entry(Instrument(r.instrument.clone()))
            .or_default()
            .push(r);
    }

    grouped
        .into_iter()
        .map(|(instrument, rows)| {
            let result = append_all(&instrument, rows);
            match &result {
                Ok(series) => {
                    tracing::debug!(instrument = %instrument, candles = series.len(), "series built")
                }
                Err(e) => tracing::warn!(instrument = %instrument, "rejected series: {}", e),
            }
            (instrument, result)
        })
        .collect()
}

fn append_all(instrument: &Instrument, rows: Vec<CandleRecord>) -> Result<CandleSeries> {
    let mut series = CandleSeries::new(instrument.clone());
    let mut duplicates = 0usize;
    for row in rows {
        if !series.append(Candle::try_from(row)?)? {
            duplicates += 1;
        }
    }
    if duplicates > 0 {
        tracing::debug!(instrument = %instrument, duplicates, "skipped duplicate candles");
    }
    Ok(series)
}

/// Re-reads one CSV file on every scheduler tick. Instruments that fail to
/// build are logged and left out of that tick.
#[derive(Debug, Clone)]
pub struct CsvCandleSource {
    path: PathBuf,
}

impl CsvCandleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CandleSource for CsvCandleSource {
    fn fetch(&self) -> Result<Vec<CandleSeries>> {
        let records = load_records(&self.path)?;
        Ok(build_series(records)
            .into_values()
            .filter_map(|r| r.ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn candle(instrument: &str, ts: i64, close: f64) -> Candle {
        Candle::new(instrument, ts, 100.0, 102.0, 98.0, close, 10.0).unwrap()
    }

    fn record(instrument: &str, ts: i64) -> CandleRecord {
        CandleRecord {
            instrument: instrument.to_string(),
            timestamp: ts,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 1.0,
        }
    }

    #[test]
    fn test_csv_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candles.csv");
        let candles = vec![candle("BTCUSDT", 0, 101.0), candle("BTCUSDT", 60_000, 99.0)];
        save_candles(&candles, &path).unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].timestamp, 60_000);
        let built = build_series(records);
        let series = built[&Instrument::from("BTCUSDT")].as_ref().unwrap();
        assert_eq!(series.candles(), candles.as_slice());
    }

    #[test]
    fn test_load_hand_written_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "instrument,timestamp,open,high,low,close,volume").unwrap();
        writeln!(file, "ETHUSDT,0,10,11,9,10.5,3").unwrap();
        writeln!(file, "BTCUSDT,0,100,101,99,99.5,1").unwrap();
        writeln!(file, "ETHUSDT,60000,10.5,11,10,10.2,4").unwrap();
        let built = build_series(load_records(file.path()).unwrap());
        assert_eq!(built.len(), 2);
        assert_eq!(built[&Instrument::from("ETHUSDT")].as_ref().unwrap().len(), 2);
        assert_eq!(built[&Instrument::from("BTCUSDT")].as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_out_of_order_fails_only_that_instrument() {
        let records = vec![
            record("BTCUSDT", 0),
            record("ETHUSDT", 60_000),
            record("BTCUSDT", 60_000),
            record("ETHUSDT", 0),
        ];
        let built = build_series(records);
        assert_eq!(built[&Instrument::from("BTCUSDT")].as_ref().unwrap().len(), 2);
        assert!(matches!(
            built[&Instrument::from("ETHUSDT")],
            Err(CandlecastError::OutOfOrder { timestamp: 0, last_timestamp: 60_000, .. })
        ));
    }

    #[test]
    fn test_duplicates_skipped() {
        let records = vec![record("BTCUSDT", 0), record("BTCUSDT", 0), record("BTCUSDT", 60_000)];
        let built = build_series(records);
        assert_eq!(built[&Instrument::from("BTCUSDT")].as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_candle_rejected() {
        let mut bad = record("BTCUSDT", 0);
        bad.high = 50.0;
        let built = build_series(vec![bad]);
        assert!(matches!(
            built[&Instrument::from("BTCUSDT")],
            Err(CandlecastError::InvalidCandle { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_records("/nonexistent/candles.csv"),
            Err(CandlecastError::Io(_))
        ));
    }

    #[test]
    fn test_csv_source_skips_broken_instruments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "instrument,timestamp,open,high,low,close,volume").unwrap();
        writeln!(file, "BTCUSDT,0,100,101,99,99.5,1").unwrap();
        writeln!(file, "ETHUSDT,60000,10,11,9,10.5,3").unwrap();
        writeln!(file, "ETHUSDT,0,10,11,9,10.5,3").unwrap();
        let source = CsvCandleSource::new(file.path());
        let series = source.fetch().unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].instrument(), &Instrument::from("BTCUSDT"));
    }
}
