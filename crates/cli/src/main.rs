// Revive CLI
//
// Design Decision: Use clap derive with env fallbacks; REVIVE_* variables and
// flags configure the same knobs.
// Design Decision: Logs go to stderr, the report to stdout (text or json).
// Design Decision: Ctrl-C interrupts the run; unfinished jobs are reported
// as interrupted instead of being lost.

mod output;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use revive_engine::{
    EngineConfig, EventSink, JobEvent, MemorySink, RevivalScheduler, SinkError, TracingSink,
};
use tokio_util::sync::CancellationToken;

use crate::output::OutputFormat;
use crate::telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "revive")]
#[command(about = "Run jobs on a bounded worker pool, reviving failed jobs until they complete")]
#[command(version)]
pub struct Cli {
    /// Job id to run (repeatable); defaults to numbered jobs 1..=jobs
    #[arg(long = "job", short = 'j', value_name = "ID")]
    pub job_ids: Vec<String>,

    /// Number of numbered jobs when no --job is given
    #[arg(long, short = 'n', env = "REVIVE_JOBS", default_value = "10")]
    pub jobs: u32,

    /// Concurrent attempts
    #[arg(long, short = 'p', env = "REVIVE_POOL_SIZE")]
    pub pool_size: Option<usize>,

    /// Units per job
    #[arg(long, env = "REVIVE_TOTAL_UNITS")]
    pub total_units: Option<u32>,

    /// Simulated cost of one unit in milliseconds
    #[arg(long, env = "REVIVE_UNIT_DELAY_MS")]
    pub unit_delay_ms: Option<u64>,

    /// Largest simulated divisor; a draw of zero fails the unit
    #[arg(long, env = "REVIVE_MAX_DIVISOR")]
    pub max_divisor: Option<u32>,

    /// Seed for reproducible failures
    #[arg(long, env = "REVIVE_SEED")]
    pub seed: Option<u64>,

    /// Attempts per job before it is abandoned (0 = unlimited)
    #[arg(long, env = "REVIVE_MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,

    /// Delay before each revival in milliseconds
    #[arg(long, env = "REVIVE_REVIVAL_DELAY_MS")]
    pub revival_delay_ms: Option<u64>,

    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json"])]
    pub output: String,

    /// Write every job event to this file as JSON
    #[arg(long, value_name = "PATH")]
    pub trace_events: Option<PathBuf>,

    /// Debug logging unless RUST_LOG or LOG_LEVEL is set
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    /// Layer flags over environment configuration
    fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::from_env();

        if let Some(size) = self.pool_size {
            config = config.with_pool_size(size);
        }
        if let Some(units) = self.total_units {
            config = config.with_total_units(units);
        }
        if let Some(ms) = self.unit_delay_ms {
            config = config.with_unit_delay(Duration::from_millis(ms));
        }
        if let Some(max_divisor) = self.max_divisor {
            config.max_divisor = max_divisor;
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        match self.max_attempts {
            Some(0) => config.revival = config.revival.without_limit(),
            Some(max) => config.revival = config.revival.with_max_attempts(max),
            None => {}
        }
        if let Some(ms) = self.revival_delay_ms {
            let interval = Duration::from_millis(ms);
            config.revival = config
                .revival
                .with_initial_interval(interval)
                .with_max_interval(interval);
        }

        config
    }

    fn job_ids(&self) -> Vec<String> {
        if self.job_ids.is_empty() {
            (1..=self.jobs).map(|i| i.to_string()).collect()
        } else {
            self.job_ids.clone()
        }
    }
}

/// Logs every event, keeping a copy only when `--trace-events` is set
struct RecordingSink {
    log: TracingSink,
    events: Option<MemorySink>,
}

impl RecordingSink {
    fn new(record: bool) -> Self {
        Self {
            log: TracingSink,
            events: record.then(MemorySink::new),
        }
    }

    fn recorded(&self) -> Vec<JobEvent> {
        self.events
            .as_ref()
            .map(MemorySink::events)
            .unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &JobEvent) -> Result<(), SinkError> {
        self.log.emit(event)?;
        match &self.events {
            Some(events) => events.emit(event),
            None => Ok(()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let dotenv = dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut telemetry_config = TelemetryConfig::from_env();
    if cli.verbose {
        telemetry_config = telemetry_config.verbose();
    }
    init_telemetry(telemetry_config);

    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    let config = cli.engine_config();
    let output_format = OutputFormat::from_str(&cli.output);

    tracing::info!(
        pool_size = config.pool.max_concurrency,
        total_units = config.total_units,
        seed = ?config.seed,
        "revive starting..."
    );

    config
        .validate_simulation()
        .context("Invalid configuration")?;

    let sink = Arc::new(RecordingSink::new(cli.trace_events.is_some()));
    let scheduler = RevivalScheduler::from_config(
        &config,
        Arc::new(config.simulated_work()),
        sink.clone(),
    )
    .context("Invalid configuration")?;

    let shutdown = CancellationToken::new();
    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            interrupt.cancel();
        }
    });

    let report = scheduler
        .run_until(config.job_specs(cli.job_ids()), shutdown)
        .await
        .context("Revival run failed")?;

    if let Some(path) = &cli.trace_events {
        let json = serde_json::to_vec_pretty(&sink.recorded())
            .context("Failed to serialize job events")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write events to {}", path.display()))?;
    }

    output::print_report(&report, output_format)?;

    if report.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_job_ids() {
        let cli = Cli::try_parse_from(["revive", "-n", "3"]).unwrap();
        assert_eq!(cli.job_ids(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_explicit_job_ids() {
        let cli = Cli::try_parse_from(["revive", "--job", "A", "-j", "B"]).unwrap();
        assert_eq!(cli.job_ids(), vec!["A", "B"]);
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "revive",
            "--pool-size",
            "1",
            "--total-units",
            "5",
            "--seed",
            "7",
            "--max-attempts",
            "0",
            "--revival-delay-ms",
            "20",
        ])
        .unwrap();
        let config = cli.engine_config();

        assert_eq!(config.pool.max_concurrency, 1);
        assert_eq!(config.total_units, 5);
        assert_eq!(config.seed, Some(7));
        assert!(config.revival.max_attempts.is_none());
        assert_eq!(config.revival.initial_interval, Duration::from_millis(20));
        assert!(config.validate_simulation().is_ok());
    }

    #[test]
    fn test_recording_sink_only_keeps_events_when_tracing() {
        let event = JobEvent::Exited {
            job_id: "a".into(),
            completed: 3,
        };

        let quiet = RecordingSink::new(false);
        quiet.emit(&event).unwrap();
        assert!(quiet.events.is_none());
        assert!(quiet.recorded().is_empty());

        let tracing = RecordingSink::new(true);
        tracing.emit(&event).unwrap();
        assert_eq!(tracing.recorded(), vec![event]);
    }

    #[test]
    fn test_rejects_unknown_output() {
        assert!(Cli::try_parse_from(["revive", "--output", "yaml"]).is_err());
    }
}
