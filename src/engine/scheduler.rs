use super::pipeline::{run_fan_out, LearningState};
use crate::config::PipelineConfig;
use crate::data::snapshot::{LearningSnapshot, SnapshotSink};
use crate::domain::CandleSeries;
use crate::error::{CandlecastError, Result};
use crate::strategy::scorer::PatternScorer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Hands over pre-fetched series at the start of every tick.
pub trait CandleSource: Send + Sync {
    fn fetch(&self) -> Result<Vec<CandleSeries>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    /// Ticks that ran to completion, failed ones included.
    pub ticks: u64,
}

struct Shared<S> {
    source: Arc<dyn CandleSource>,
    sink: Arc<dyn SnapshotSink>,
    scorer: S,
    config: PipelineConfig,
    learning: Mutex<LearningState>,
    ticks: AtomicU64,
    state_tx: watch::Sender<SchedulerState>,
}

impl<S> Shared<S>
where
    S: PatternScorer + Clone + Send + Sync,
{
    /// One full pass. Runs on a blocking thread.
    fn tick(&self) -> Result<usize> {
        let series = self.source.fetch()?;

        let mut learning = self.learning.blocking_lock();
        let outcome = run_fan_out(&series, &self.scorer, &learning, &self.config);
        learning.apply(&outcome);
        drop(learning);

        let now = chrono::Utc::now();
        let snapshots: Vec<LearningSnapshot> = outcome
            .successes()
            .map(|r| LearningSnapshot::from_report(r, now))
            .collect();
        self.sink.publish(&snapshots)?;
        Ok(snapshots.len())
    }
}

/// Periodic re-validation owned by the caller.
///
/// Every tick pulls series from the source, runs the fan-out on a blocking
/// thread, folds the new weights and phases into the learning state and
/// publishes snapshots. [`stop`](Self::stop) lets an in-flight tick finish
/// and publish, then no further tick starts.
pub struct LearningScheduler<S> {
    shared: Arc<Shared<S>>,
    interval: Duration,
    max_ticks: Option<u64>,
    cancel_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl<S> LearningScheduler<S>
where
    S: PatternScorer + Clone + Send + Sync + 'static,
{
    pub fn new(
        source: Arc<dyn CandleSource>,
        sink: Arc<dyn SnapshotSink>,
        scorer: S,
        config: PipelineConfig,
        interval: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        Self {
            shared: Arc::new(Shared {
                source,
                sink,
                scorer,
                config,
                learning: Mutex::new(LearningState::new()),
                ticks: AtomicU64::new(0),
                state_tx,
            }),
            interval,
            max_ticks: None,
            cancel_tx: None,
            handle: None,
        }
    }

    /// Stop by itself after this many ticks.
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }

    /// Seed the per-instrument memory, e.g. from a previous run.
    /// Only takes effect before [`start`](Self::start).
    pub fn with_learning_state(mut self, learning: LearningState) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => *shared.learning.get_mut() = learning,
            None => tracing::warn!("learning state can only be seeded before start"),
        }
        self
    }

    /// Spawn the interval loop. The first tick fires immediately.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if *self.shared.state_tx.borrow() == SchedulerState::Running {
            return Err(CandlecastError::Config("scheduler already running".into()));
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.shared.state_tx.send_replace(SchedulerState::Running);
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.shared),
            self.interval,
            self.max_ticks,
            cancel_rx,
        ));

        self.cancel_tx = Some(cancel_tx);
        self.handle = Some(handle);
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "learning scheduler started");
        Ok(())
    }

    /// Prevent further ticks and wait for the loop to exit.
    pub async fn stop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(true);
        }
        self.join().await;
    }

    /// Wait for the loop to exit on its own (after `max_ticks`).
    /// Cancel-safe: dropping this future leaves the loop attached.
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            let joined = handle.await;
            self.handle = None;
            if let Err(e) = joined {
                tracing::error!("learning scheduler task failed: {}", e);
            }
        }
        if *self.shared.state_tx.borrow() != SchedulerState::Idle {
            self.shared.state_tx.send_replace(SchedulerState::Stopped);
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            state: *self.shared.state_tx.borrow(),
            ticks: self.shared.ticks.load(Ordering::SeqCst),
        }
    }

    /// Copy of the current per-instrument memory.
    pub async fn learning_state(&self) -> LearningState {
        self.shared.learning.lock().await.clone()
    }
}

async fn run_loop<S>(
    shared: Arc<Shared<S>>,
    period: Duration,
    max_ticks: Option<u64>,
    mut cancel_rx: watch::Receiver<bool>,
) where
    S: PatternScorer + Clone + Send + Sync + 'static,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut completed = 0u64;

    loop {
        tokio::select! {
            biased;
            changed = cancel_rx.changed() => {
                if changed.is_err() || *cancel_rx.borrow() {
                    break;
                }
                continue;
            }
            _ = interval.tick() => {}
        }

        let worker = Arc::clone(&shared);
        match tokio::task::spawn_blocking(move || worker.tick()).await {
            Ok(Ok(published)) => {
                tracing::info!(tick = completed + 1, published, "learning tick complete");
            }
            Ok(Err(e)) => {
                tracing::warn!(tick = completed + 1, "learning tick failed: {}", e);
            }
            Err(e) => {
                tracing::error!(tick = completed + 1, "learning tick panicked: {}", e);
            }
        }

        completed += 1;
        shared.ticks.fetch_add(1, Ordering::SeqCst);
        if max_ticks.is_some_and(|max| completed >= max) {
            tracing::info!(ticks = completed, "learning scheduler reached max ticks");
            break;
        }
    }

    shared.state_tx.send_replace(SchedulerState::Stopped);
    tracing::info!(ticks = completed, "learning scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::snapshot::MemorySink;
    use crate::domain::{Candle, Instrument};
    use crate::engine::phase::LearningPhase;
    use crate::strategy::scorer::ConstantScorer;

    fn trending(instrument: &str, n: usize) -> CandleSeries {
        CandleSeries::from_candles(
            instrument,
            (0..n).map(|i| {
                let o = 100.0 + i as f64;
                Candle::new(instrument, i as i64 * 60_000, o, o + 1.5, o - 0.5, o + 1.0, 1.0).unwrap()
            }),
        )
        .unwrap()
    }

    struct FixedSource {
        series: Vec<CandleSeries>,
        delay: Duration,
    }

    impl CandleSource for FixedSource {
        fn fetch(&self) -> Result<Vec<CandleSeries>> {
            std::thread::sleep(self.delay);
            Ok(self.series.clone())
        }
    }

    struct FailingSource;

    impl CandleSource for FailingSource {
        fn fetch(&self) -> Result<Vec<CandleSeries>> {
            Err(CandlecastError::Config("feed offline".into()))
        }
    }

    fn config() -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        cfg.phase.min_trials = 10;
        cfg
    }

    fn scheduler(
        delay: Duration,
        interval: Duration,
    ) -> (LearningScheduler<ConstantScorer>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let source = Arc::new(FixedSource {
            series: vec![trending("BTCUSDT", 300), trending("ETHUSDT", 25)],
            delay,
        });
        let scorer = ConstantScorer::new(crate::domain::PredictedColor::Green, 0.8).with_tags(["always-green"]);
        let s = LearningScheduler::new(source, sink.clone(), scorer, config(), interval);
        (s, sink)
    }

    async fn wait_for_ticks(s: &LearningScheduler<ConstantScorer>, ticks: u64) {
        for _ in 0..200 {
            if s.status().ticks >= ticks {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("scheduler never reached {} ticks", ticks);
    }

    #[tokio::test]
    async fn test_idle_before_start() {
        let (s, _) = scheduler(Duration::ZERO, Duration::from_millis(10));
        assert_eq!(
            s.status(),
            SchedulerStatus {
                state: SchedulerState::Idle,
                ticks: 0
            }
        );
    }

    #[tokio::test]
    async fn test_max_ticks_stops_on_its_own() {
        let (s, sink) = scheduler(Duration::ZERO, Duration::from_millis(10));
        let mut s = s.with_max_ticks(3);
        s.start().unwrap();
        s.join().await;

        assert_eq!(s.status().state, SchedulerState::Stopped);
        assert_eq!(s.status().ticks, 3);
        let batches = sink.batches();
        assert_eq!(batches.len(), 3);
        // ETHUSDT is too short and never published
        assert!(batches.iter().all(|b| b.len() == 1));
        assert_eq!(batches[0][0].instrument, Instrument::from("BTCUSDT"));
    }

    #[tokio::test]
    async fn test_stop_prevents_further_ticks() {
        let (mut s, sink) = scheduler(Duration::ZERO, Duration::from_secs(3600));
        s.start().unwrap();
        wait_for_ticks(&s, 1).await;
        s.stop().await;

        assert_eq!(s.status().state, SchedulerState::Stopped);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(s.status().ticks, 1);
        assert_eq!(sink.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_tick_completes_and_publishes() {
        let (mut s, sink) = scheduler(Duration::from_millis(150), Duration::from_secs(3600));
        s.start().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(s.status().ticks, 0);
        s.stop().await;

        assert_eq!(s.status().ticks, 1);
        assert_eq!(sink.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let (mut s, _) = scheduler(Duration::ZERO, Duration::from_secs(3600));
        s.start().unwrap();
        assert!(matches!(s.start(), Err(CandlecastError::Config(_))));
        s.stop().await;
    }

    #[tokio::test]
    async fn test_learning_state_carries_across_ticks() {
        let (s, sink) = scheduler(Duration::ZERO, Duration::from_millis(10));
        let mut s = s.with_max_ticks(2);
        s.start().unwrap();
        s.join().await;

        let learning = s.learning_state().await;
        let btc = learning.get(&Instrument::from("BTCUSDT")).unwrap();
        assert_eq!(btc.phase.current(), LearningPhase::Master);
        assert!(learning.get(&Instrument::from("ETHUSDT")).is_none());

        let batches = sink.batches();
        let w1 = batches[0][0].weights.get(&"always-green".into()).unwrap();
        let w2 = batches[1][0].weights.get(&"always-green".into()).unwrap();
        assert!(w2 > w1);
    }

    #[tokio::test]
    async fn test_failed_fetch_still_counts_tick() {
        let sink = Arc::new(MemorySink::new());
        let mut s = LearningScheduler::new(
            Arc::new(FailingSource),
            sink.clone(),
            ConstantScorer::neutral(),
            config(),
            Duration::from_millis(10),
        )
        .with_max_ticks(2);
        s.start().unwrap();
        s.join().await;
        assert_eq!(s.status().ticks, 2);
        assert!(sink.batches().is_empty());
    }
}
