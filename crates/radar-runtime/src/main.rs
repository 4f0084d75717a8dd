//! # tx-radar
//!
//! Connects to a pool of peers, then reads raw transactions (hex, one per
//! line) from stdin and broadcasts each. Every peer that announces a
//! broadcast transaction back counts towards its propagation.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (`RADAR_CONFIG` file, then `RADAR_*` overrides)
//! 2. Install logging and register metrics
//! 3. Build the discovery source from `[seeds]`, or the network's DNS seeds
//! 4. Start the sentinel with printing callbacks
//! 5. Broadcast stdin lines until EOF or an empty line, then stop
//!
//! ## Environment
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `RADAR_CONFIG` | unset | TOML config path |
//! | `RADAR_PEERS` | 10 | Peers to monitor |
//! | `RADAR_THREADS` | 2 | Network worker threads |

mod seeds;

use anyhow::{bail, Context, Result};
use radar_discovery::CandidateSource;
use radar_telemetry::{encode_metrics, init_telemetry, TelemetryConfig};
use shared_types::TxHash;
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{info, warn};
use tx_sentinel::{PropagationRadar, SentinelConfig, SentinelEngine, StartStatus};

const DEFAULT_PEERS: usize = 10;
const DEFAULT_THREADS: usize = 2;

fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    init_telemetry(&telemetry).context("failed to initialize telemetry")?;

    let mut config = load_config()?;
    let peers = count_from_env("RADAR_PEERS", DEFAULT_PEERS)?;
    let threads = count_from_env("RADAR_THREADS", DEFAULT_THREADS)?;

    if config.seeds.is_empty() {
        config.seeds.dns = seeds::dns_seeds(config.network)
            .iter()
            .map(|s| s.to_string())
            .collect();
        info!(network = %config.network, seeds = config.seeds.dns.len(), "Using built-in DNS seeds");
    }
    let discovery: Arc<dyn CandidateSource> =
        Arc::from(config.seeds.clone().into_source(config.network.default_port()));

    let engine = SentinelEngine::new(config, discovery);
    engine
        .start(
            peers,
            threads,
            Box::new(|hash: TxHash| println!("tx: {hash}")),
            Box::new(|status: StartStatus| println!("started: {} ({status})", status.code())),
        )
        .context("failed to start sentinel")?;

    let outcome = broadcast_stdin(&engine);
    engine.stop();

    if telemetry.metrics_dump {
        print!("{}", encode_metrics()?);
    }
    outcome
}

/// Config file from `RADAR_CONFIG` if set, defaults otherwise; env overrides
/// apply either way.
fn load_config() -> Result<SentinelConfig> {
    let mut config = match env::var("RADAR_CONFIG") {
        Ok(path) => {
            info!(%path, "Loading configuration");
            SentinelConfig::load(&path).with_context(|| format!("failed to load {path}"))?
        }
        Err(_) => SentinelConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("invalid environment override")?;
    Ok(config)
}

fn count_from_env(key: &str, default: usize) -> Result<usize> {
    match env::var(key) {
        Ok(raw) => parse_count(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_count(key: &str, raw: &str) -> Result<usize> {
    let value: usize = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a positive integer, got '{raw}'"))?;
    if value == 0 {
        bail!("{key} must be at least 1");
    }
    Ok(value)
}

/// Broadcast each hex line from stdin. Stops on EOF or an empty line.
fn broadcast_stdin(engine: &SentinelEngine) -> Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        let line = line.trim();
        if line.is_empty() {
            break;
        }

        match decode_transaction(line) {
            Ok(payload) => {
                let hash = TxHash::of_payload(&payload);
                let sent = engine.broadcast(&payload);
                println!("broadcast: {hash} to {sent} peers");
            }
            Err(e) => warn!(error = %e, "Skipping line"),
        }
        io::stdout().flush().ok();
    }
    Ok(())
}

fn decode_transaction(line: &str) -> Result<Vec<u8>> {
    let payload = hex::decode(line).context("not valid hex")?;
    if payload.is_empty() {
        bail!("empty transaction");
    }
    Ok(payload)
}
