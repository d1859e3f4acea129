//! `ipstrack` CLI: scenario runs, replay evaluation, and a JSON-lines
//! message bridge.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use positioning_core::messages::{self, Inbound, Outbound};
use positioning_core::{AnchorStatus, IpsConfig, Timestamp, Tracker};
use serde::Deserialize;
use sim::replay::{load_replay, save_replay};
use sim::run::{evaluate, simulate, Evaluation};
use sim::scenarios::{Scenario, ScenarioKind};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "ipstrack", about = "Indoor positioning from anchor distance reports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a named scenario in batch mode and output metrics.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also save the full replay log
        #[arg(long)]
        save_replay: Option<PathBuf>,
    },
    /// Load and evaluate a previously recorded scenario log.
    Replay {
        /// Path to replay JSON file
        input: PathBuf,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Bridge messages: JSON lines `{topic, payload, timestamp?}` on stdin,
    /// JSON lines `{topic, payload}` on stdout.
    Process {
        /// Engine configuration (JSON)
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::RunScenario {
            scenario,
            seed,
            output,
            save_replay: save_path,
        } => {
            run_scenario(scenario, seed, output.as_deref(), save_path.as_deref())?;
        }
        Commands::Replay { input, output } => {
            run_replay(&input, output.as_deref())?;
        }
        Commands::Process { config } => {
            run_process(&config)?;
        }
    }

    Ok(())
}

fn run_scenario(
    kind: ScenarioKind,
    seed: u64,
    output_path: Option<&Path>,
    replay_path: Option<&Path>,
) -> Result<()> {
    let scenario = Scenario::build(kind, seed);
    eprintln!(
        "Running scenario '{}' (seed={}, duration={:.0}s)...",
        scenario.name, seed, scenario.duration
    );

    let start = std::time::Instant::now();
    let log = simulate(&scenario);
    let eval = evaluate(&log);
    let elapsed = start.elapsed();
    print_summary(&eval, elapsed.as_secs_f64());

    if let Some(rpath) = replay_path {
        save_replay(&log, rpath)?;
        eprintln!("Replay saved to {}", rpath.display());
    }
    if let Some(opath) = output_path {
        write_metrics(&eval, elapsed.as_secs_f64(), opath)?;
        eprintln!("Metrics saved to {}", opath.display());
    }
    Ok(())
}

fn run_replay(input: &Path, output_path: Option<&Path>) -> Result<()> {
    let log = load_replay(input).with_context(|| format!("loading {}", input.display()))?;
    eprintln!(
        "Replaying '{}' ({} observations)...",
        log.scenario_name,
        log.observations.len()
    );

    let start = std::time::Instant::now();
    let eval = evaluate(&log);
    let elapsed = start.elapsed();
    print_summary(&eval, elapsed.as_secs_f64());

    if let Some(opath) = output_path {
        write_metrics(&eval, elapsed.as_secs_f64(), opath)?;
    }
    Ok(())
}

fn print_summary(eval: &Evaluation, elapsed_s: f64) {
    let m = &eval.metrics;
    eprintln!(
        "Done: {} observations, {} reports, elapsed={:.2}s",
        eval.observations, eval.reports, elapsed_s
    );
    eprintln!(
        "RMSE={:.2}m (2D {:.2}m), max={:.2}m, room accuracy={:.1}%, failures={}, not-present={}",
        m.rmse(),
        m.rmse_2d(),
        m.max_err,
        m.room_accuracy() * 100.0,
        m.solve_failures,
        m.not_present_events,
    );
}

fn write_metrics(eval: &Evaluation, elapsed_s: f64, path: &Path) -> Result<()> {
    let json = serde_json::json!({
        "scenario": eval.scenario,
        "seed": eval.seed,
        "elapsed_s": elapsed_s,
        "observations": eval.observations,
        "reports": eval.reports,
        "rmse": eval.metrics.rmse(),
        "rmse_2d": eval.metrics.rmse_2d(),
        "room_accuracy": eval.metrics.room_accuracy(),
        "metrics": eval.metrics,
        "final_rooms": eval.final_rooms,
    });
    std::fs::write(path, serde_json::to_string_pretty(&json)?)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Message bridge
// ---------------------------------------------------------------------------

/// One inbound line. `payload` may be a string or inline JSON.
#[derive(Debug, Deserialize)]
struct InboundLine {
    topic: String,
    payload: serde_json::Value,
    timestamp: Option<f64>,
}

fn wall_clock() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

fn run_process(config_path: &Path) -> Result<()> {
    let config = IpsConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let mut tracker = Tracker::from_config(&config);
    info!(
        devices = config.devices.len(),
        anchors = config.anchors.len(),
        rooms = config.rooms.len(),
        "tracker ready"
    );

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let msg: InboundLine = match serde_json::from_str(&line) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "dropping unreadable line");
                continue;
            }
        };
        let payload = match &msg.payload {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let now = msg.timestamp.unwrap_or_else(wall_clock);

        for o in handle(&config, &mut tracker, &msg.topic, &payload, now) {
            writeln!(out, "{}", serde_json::to_string(&o)?)?;
        }
        out.flush()?;
    }
    Ok(())
}

/// Route one message through the tracker and collect what to publish.
fn handle(
    config: &IpsConfig,
    tracker: &mut Tracker,
    topic: &str,
    payload: &str,
    now: Timestamp,
) -> Vec<Outbound> {
    let inbound = match messages::decode(&config.topics, topic, payload, now) {
        Ok(m) => m,
        Err(e) => {
            debug!(topic, error = %e, "dropping message");
            return Vec::new();
        }
    };

    match inbound {
        Inbound::Observation(obs) => match tracker.observe(&obs) {
            Ok(Some(report)) => {
                let mut out = messages::encode_position(&config.topics, &report);
                if let Some(geo) = &config.geo {
                    out.push(messages::encode_location(&config.topics, geo, &report));
                }
                out
            }
            Ok(None) | Err(_) => Vec::new(),
        },
        Inbound::AnchorStatus { anchor_id, status } => {
            let known = match status {
                AnchorStatus::Online => tracker.mark_online(&anchor_id),
                AnchorStatus::Offline => tracker.mark_offline(&anchor_id),
                AnchorStatus::Unknown => true,
            };
            if !known {
                debug!(anchor = %anchor_id, "status for unconfigured anchor");
            }
            Vec::new()
        }
        Inbound::Telemetry { .. } => tracker
            .scan_liveness(now)
            .iter()
            .flat_map(|r| messages::encode_not_present(&config.topics, r))
            .collect(),
    }
}
