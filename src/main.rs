use candlecast::config::PipelineConfig;
use candlecast::data::{self, CsvCandleSource, JsonFileSink, LearningSnapshot, SnapshotSink};
use candlecast::domain::CandleSeries;
use candlecast::engine::{run_fan_out, FanOutResult, LearningScheduler, LearningState};
use candlecast::strategy::{PatternScorer, RuleBasedScorer, SeededRandomScorer};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "candlecast", about = "Walk-forward validation of next-candle color predictions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Validate every instrument in a CSV file once
    Validate {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write learning snapshots to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// rule-based | random
        #[arg(short, long, default_value = "rule-based")]
        scorer: String,
        #[arg(long, default_value = "42")]
        seed: u64,
    },
    /// Re-validate on an interval, carrying weights and phases between ticks
    Learn {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long, default_value = "learning.json")]
        output: PathBuf,
        #[arg(long, default_value = "3600")]
        interval_secs: u64,
        /// Stop after this many ticks (default: run until Ctrl-C)
        #[arg(long)]
        ticks: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate {
            input,
            config,
            output,
            scorer,
            seed,
        } => {
            let config = load_config(config.as_deref())?;
            run_validate(&input, &config, output.as_deref(), &scorer, seed)?;
        }
        Commands::Learn {
            input,
            config,
            output,
            interval_secs,
            ticks,
        } => {
            let config = load_config(config.as_deref())?;
            run_learn(input, config, output, interval_secs, ticks).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(p) => PipelineConfig::from_json_file(p)?,
        None => PipelineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn run_validate(
    input: &Path,
    config: &PipelineConfig,
    output: Option<&Path>,
    scorer: &str,
    seed: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== candlecast walk-forward validation ===");
    println!("Input: {}", input.display());
    println!(
        "Split: train {:.0}% / validation {:.0}% / test {:.0}%",
        config.train_ratio * 100.0,
        config.validation_ratio * 100.0,
        (1.0 - config.train_ratio - config.validation_ratio) * 100.0
    );

    let mut series: Vec<CandleSeries> = Vec::new();
    for (instrument, result) in data::build_series(data::load_records(input)?) {
        match result {
            Ok(s) => {
                println!("{}: {} candles", instrument, s.len());
                series.push(s);
            }
            Err(e) => eprintln!("  Warning: skipping {}: {}", instrument, e),
        }
    }

    let state = LearningState::new();
    let outcome = match scorer {
        "rule-based" => {
            let scorer = RuleBasedScorer::new(config.patterns.clone(), config.optimizer.initial_weight);
            fan_out(&series, &scorer, &state, config)
        }
        "random" => fan_out(&series, &SeededRandomScorer::new(seed), &state, config),
        other => return Err(format!("unknown scorer: {}", other).into()),
    };

    for report in outcome.successes() {
        report.print_summary();
    }
    for (instrument, e) in outcome.failures() {
        println!("\n  {} skipped: {}", instrument, e);
    }

    let merged = &outcome.merged;
    println!("\n{}", "=".repeat(60));
    println!("  ALL INSTRUMENTS (test replay)");
    println!("{}", "=".repeat(60));
    println!("  Trials:       {:>8}", merged.overall.trials);
    println!("  Correct:      {:>8}", merged.overall.correct);
    println!("  Accuracy:     {:>7.2}%", merged.overall.accuracy * 100.0);
    for (segment, stats) in merged.by_segment.iter() {
        println!(
            "  {:<8} trials={:>5} acc={:>6.1}%",
            format!("{:?}", segment),
            stats.trials,
            stats.accuracy * 100.0
        );
    }

    if let Some(path) = output {
        let now = chrono::Utc::now();
        let snapshots: Vec<LearningSnapshot> = outcome
            .successes()
            .map(|r| LearningSnapshot::from_report(r, now))
            .collect();
        JsonFileSink::new(path).publish(&snapshots)?;
        println!("\nWrote {} snapshots to {}", snapshots.len(), path.display());
    }

    Ok(())
}

fn fan_out<S>(
    series: &[CandleSeries],
    scorer: &S,
    state: &LearningState,
    config: &PipelineConfig,
) -> FanOutResult
where
    S: PatternScorer + Clone + Send + Sync,
{
    println!("\nScorer: {}", scorer.name());
    run_fan_out(series, scorer, state, config)
}

async fn run_learn(
    input: PathBuf,
    config: PipelineConfig,
    output: PathBuf,
    interval_secs: u64,
    ticks: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let scorer = RuleBasedScorer::new(config.patterns.clone(), config.optimizer.initial_weight);
    let mut scheduler = LearningScheduler::new(
        Arc::new(CsvCandleSource::new(input)),
        Arc::new(JsonFileSink::new(&output)),
        scorer,
        config,
        Duration::from_secs(interval_secs.max(1)),
    );
    if let Some(n) = ticks {
        scheduler = scheduler.with_max_ticks(n);
    }

    scheduler.start()?;
    println!(
        "Learning every {}s, snapshots -> {} (Ctrl-C to stop)",
        interval_secs.max(1),
        output.display()
    );

    if ticks.is_some() {
        tokio::select! {
            _ = scheduler.join() => {}
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping after the current tick...");
            }
        }
    } else {
        tokio::signal::ctrl_c().await?;
        println!("Stopping after the current tick...");
    }
    scheduler.stop().await;

    let status = scheduler.status();
    println!("Scheduler {:?} after {} ticks", status.state, status.ticks);
    for (instrument, st) in scheduler.learning_state().await.iter() {
        println!("  {:<12} phase={} weights={}", instrument, st.phase.current(), st.weights.len());
    }
    Ok(())
}
