use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use flate2::read::GzDecoder;
use flight_fusion_rs::{FusionConfig, FusionEngine, FusionEvent, SensorEvent};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(about = "Replay a recorded sensor event log through the fusion engine", long_about = None)]
struct Args {
    /// Path to an event log, one JSON event per line (.jsonl or .jsonl.gz)
    #[arg(long)]
    log: PathBuf,

    /// JSON fusion config; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reset home before the first event at or after this timestamp [µs]
    #[arg(long)]
    reset_at: Option<i64>,
}

fn open_log(path: &Path) -> anyhow::Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader: Box<dyn Read> = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

fn load_events(path: &Path) -> anyhow::Result<Vec<SensorEvent>> {
    let mut events = Vec::new();
    for (lineno, line) in open_log(path)?.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: SensorEvent = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: bad event", path.display(), lineno + 1))?;
        events.push(event);
    }
    Ok(events)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => FusionConfig::from_json_file(path)?,
        None => FusionConfig::default(),
    };
    let events = load_events(&args.log)?;
    log::info!("Loaded {} events from {}", events.len(), args.log.display());

    let mut engine = FusionEngine::new(config)?;
    let mut reset_pending = args.reset_at;
    let mut timeouts = 0u64;
    let mut recoveries = 0u64;
    let mut failures = Vec::new();

    for event in &events {
        if let Some(at) = reset_pending {
            if event.timestamp_us >= at {
                engine.reset_home();
                reset_pending = None;
            }
        }

        for out in engine.process(event) {
            match out {
                FusionEvent::SensorTimeout { .. } => timeouts += 1,
                FusionEvent::SensorRecovered { .. } => recoveries += 1,
                FusionEvent::ComputationFailure(err) => failures.push(err.to_string()),
                _ => {}
            }
        }
    }

    let snapshot = engine.snapshot();
    let summary = json!({
        "log": args.log.display().to_string(),
        "events": events.len(),
        "timeout_reports": timeouts,
        "recoveries": recoveries,
        "failures": failures,
        "health": engine.health().format_status(),
        "snapshot": snapshot,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
