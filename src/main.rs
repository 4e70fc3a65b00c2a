use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::Parser;
use env_logger::Env;
use flight_fusion_rs::{Dispatcher, FusionConfig, FusionEvent, FusionSnapshot};
use serde::Serialize;
use tokio::time::{interval, Duration};

mod sensors;

use sensors::{MockFlight, DEMO_RATES};

#[derive(Parser, Debug)]
#[command(name = "flight_fusion")]
#[command(about = "Per-axis position/velocity fusion on simulated flight sensors", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous)
    #[arg(value_name = "SECONDS", default_value = "30")]
    duration: u64,

    /// JSON fusion config; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds between status lines
    #[arg(long, default_value = "5")]
    status_interval: u64,

    /// Reset home once after this many seconds
    #[arg(long)]
    reset_after: Option<u64>,

    /// Output directory
    #[arg(long, default_value = "flight_fusion_sessions")]
    output_dir: PathBuf,
}

#[derive(Serialize)]
struct SessionSummary {
    started: String,
    duration_s: f64,
    timeouts: u64,
    overflows: u64,
    failures: u64,
    snapshot: FusionSnapshot,
    health: String,
}

#[derive(Default)]
struct DiagnosticCounts {
    timeouts: u64,
    overflows: u64,
    failures: u64,
}

impl DiagnosticCounts {
    fn absorb(&mut self, event: &FusionEvent) {
        match event {
            FusionEvent::SensorTimeout { .. } => self.timeouts += 1,
            FusionEvent::QueueOverflow { .. } => self.overflows += 1,
            FusionEvent::ComputationFailure(_) => self.failures += 1,
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => FusionConfig::from_json_file(path)?,
        None => FusionConfig::default(),
    };

    log::info!("Flight fusion starting");
    log::info!("  Duration: {} seconds (0=continuous)", args.duration);
    log::info!("  Queue capacity: {}", config.queue_capacity);
    log::info!("  Sensor timeout: {} ms", config.sensor_timeout_ms);
    log::info!("  Output Dir: {}", args.output_dir.display());

    std::fs::create_dir_all(&args.output_dir)?;
    let started = Utc::now();

    let (mut dispatcher, tx, control) = Dispatcher::from_config(config)?;
    dispatcher.add_home_listener(Box::new(|| log::info!("Navigation home updated")));
    let (diag_tx, diag_rx) = crossbeam::channel::bounded(256);
    let dispatcher = dispatcher.with_diagnostics(diag_tx);
    let estimate = dispatcher.estimate_handle();
    let fusion_thread = dispatcher.spawn()?;

    let flight = MockFlight::new();
    let producers: Vec<_> = DEMO_RATES
        .iter()
        .map(|&(kind, rate_hz)| tokio::spawn(sensors::sensor_loop(kind, rate_hz, flight, tx.clone())))
        .collect();
    drop(tx);

    let start = Instant::now();
    let mut status = interval(Duration::from_secs(args.status_interval.max(1)));
    let mut counts = DiagnosticCounts::default();
    let mut reset_pending = args.reset_after;

    loop {
        status.tick().await;
        let elapsed = start.elapsed().as_secs();

        for event in diag_rx.try_iter() {
            counts.absorb(&event);
        }

        if let Some(after) = reset_pending {
            if elapsed >= after {
                if !control.reset_home() {
                    log::warn!("Dispatcher gone, home reset not delivered");
                }
                reset_pending = None;
            }
        }

        let snap = estimate.latest();
        log::info!(
            "[{:>4}s] pos=({:.2}, {:.2}, {:.2}) m σz={:.3} m vel=({:.2}, {:.2}, {:.2}) m/s | events={} timeouts={} overflows={}",
            elapsed,
            snap.x.position,
            snap.y.position,
            snap.z.position,
            snap.z.position_sigma(),
            snap.x.velocity,
            snap.y.velocity,
            snap.z.velocity,
            snap.stats.events_processed,
            counts.timeouts,
            counts.overflows
        );

        if args.duration > 0 && elapsed >= args.duration {
            break;
        }
    }

    for producer in &producers {
        producer.abort();
    }
    for producer in producers {
        // Cancelled on purpose
        let _ = producer.await;
    }

    let engine = tokio::task::spawn_blocking(move || fusion_thread.join())
        .await?
        .map_err(|_| anyhow!("fusion thread panicked"))?;
    for event in diag_rx.try_iter() {
        counts.absorb(&event);
    }

    let health = engine.health().format_status();
    log::info!("{health}");

    let summary = SessionSummary {
        started: started.to_rfc3339(),
        duration_s: start.elapsed().as_secs_f64(),
        timeouts: counts.timeouts,
        overflows: counts.overflows,
        failures: counts.failures,
        snapshot: engine.snapshot(),
        health,
    };
    let path = args
        .output_dir
        .join(format!("flight_{}.json", started.format("%Y%m%d_%H%M%S")));
    std::fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
    log::info!("Saved session summary to {}", path.display());

    Ok(())
}
