//! Stepper worker: runs journeys against an in-memory store and queue.
//!
//! Polls the task queue, runs scheduling cycles when the cyclic scheduler is
//! selected and performs housekeeping on an interval.

mod demo;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};

use stepper_core::config::SchedulerKind;
use stepper_core::event_bus::log_sink;
use stepper_core::{StepperConfig, SystemClock};
use stepper_journey::{
    CyclicScheduler, ForwardScheduler, HousekeepingPolicy, InMemoryJourneyStore,
    InMemoryTaskQueue, JourneyEngine, Scheduler, Worker,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SchedulerArg {
    Forward,
    Cyclic,
}

impl From<SchedulerArg> for SchedulerKind {
    fn from(arg: SchedulerArg) -> Self {
        match arg {
            SchedulerArg::Forward => SchedulerKind::Forward,
            SchedulerArg::Cyclic => SchedulerKind::Cyclic,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "stepper-worker")]
#[command(about = "Durable multi-step journey worker")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "STEPPER__NODE_ID")]
    node_id: Option<String>,

    /// Scheduling strategy (overrides config)
    #[arg(long, value_enum)]
    scheduler: Option<SchedulerArg>,

    /// Scheduling cycle in seconds (overrides config)
    #[arg(long)]
    cycle_secs: Option<u64>,

    /// Number of concurrent queue pollers (overrides config)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Start this many sample onboarding journeys
    #[arg(long, default_value_t = 0)]
    demo_journeys: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stepper_worker=info,stepper_journey=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Stepper worker starting up");

    let mut config = StepperConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        StepperConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(kind) = cli.scheduler {
        config.scheduler.kind = kind.into();
    }
    if let Some(secs) = cli.cycle_secs {
        config.scheduler.cycle_duration_secs = secs;
    }
    if let Some(concurrency) = cli.concurrency {
        config.worker.concurrency = concurrency;
    }

    config.validate()?;

    info!(
        node_id = %config.node_id,
        scheduler = ?config.scheduler.kind,
        concurrency = config.worker.concurrency,
        "Configuration loaded"
    );

    let clock = Arc::new(SystemClock);
    let store = Arc::new(InMemoryJourneyStore::new());
    let queue = Arc::new(InMemoryTaskQueue::new());

    let mut cyclic = None;
    let scheduler: Arc<dyn Scheduler> = match config.scheduler.kind {
        SchedulerKind::Forward => Arc::new(ForwardScheduler::new(queue.clone(), clock.clone())),
        SchedulerKind::Cyclic => {
            let scheduler = Arc::new(CyclicScheduler::new(
                queue.clone(),
                store.clone(),
                config.scheduler.cycle_duration()?,
                clock.clone(),
            )?);
            cyclic = Some(scheduler.clone());
            scheduler
        }
    };

    let engine = JourneyEngine::new(store, scheduler)
        .with_clock(clock)
        .with_event_sink(log_sink());

    if cli.demo_journeys > 0 {
        demo::seed(&engine, cli.demo_journeys)?;
    }

    // Queue pollers
    let poll_interval = Duration::from_millis(config.worker.poll_interval_ms);
    for slot in 0..config.worker.concurrency {
        let worker = Worker::new(engine.clone(), queue.clone());
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            loop {
                interval.tick().await;
                let worker = worker.clone();
                match tokio::task::spawn_blocking(move || worker.run_due()).await {
                    Ok(report) if report.failed > 0 => {
                        warn!(slot, failed = report.failed, "Some tasks failed");
                    }
                    Ok(_) => {}
                    Err(e) => error!(slot, error = %e, "Worker task panicked"),
                }
            }
        });
    }

    // Scheduling cycle
    if let Some(scheduler) = cyclic {
        let period = Duration::from_secs(config.scheduler.cycle_duration_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let scheduler = scheduler.clone();
                match tokio::task::spawn_blocking(move || scheduler.run_scheduling_cycle()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => error!(error = %e, "Scheduling cycle failed"),
                    Err(e) => error!(error = %e, "Scheduling cycle panicked"),
                }
            }
        });
    }

    // Housekeeping
    let policy = HousekeepingPolicy::from_config(&config.recovery, &config.housekeeping)?;
    let housekeeping_period = Duration::from_secs(config.housekeeping.interval_secs);
    let housekeeping_engine = engine.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(housekeeping_period);
        loop {
            interval.tick().await;
            let engine = housekeeping_engine.clone();
            match tokio::task::spawn_blocking(move || engine.run_housekeeping(&policy)).await {
                Ok(Ok(report)) => info!(
                    recovered = report.recovery.recovered,
                    deleted = report.deleted,
                    "Housekeeping done"
                ),
                Ok(Err(e)) => error!(error = %e, "Housekeeping failed"),
                Err(e) => error!(error = %e, "Housekeeping panicked"),
            }
        }
    });

    info!("Stepper worker is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    Ok(())
}
