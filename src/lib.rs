pub mod config;
pub mod engine;
pub mod error;
pub mod hit;
pub mod identity;
pub mod ledger;
pub mod meter;
pub mod parser;
pub mod ranking;
pub mod registry;
pub mod report;
pub mod snapshot;
pub mod tailer;

pub use hit::{CombatantId, HitRecord, RawHeal, RawHit, UNKNOWN_NAME};
pub use identity::{IdentityResolver, Roster};
pub use ledger::{AttackerLedger, TargetTotal};
pub use meter::{DamageMeter, HitSink};
pub use ranking::{RankingView, SortColumn, SortDirection, SortSpec};
pub use registry::DamageRegistry;
pub use snapshot::MeterSnapshot;

use anyhow::Result;
use std::path::Path;
use tokio::sync::mpsc;

pub fn run(config_arg: Option<String>) -> Result<()> {
    let config_dir = config::config_dir(config_arg);

    // -----------------------------------------------------------------------
    // Logging — daily rolling file under <config dir>/logs.
    // -----------------------------------------------------------------------
    let log_dir = config_dir.join("logs");
    let _ = std::fs::create_dir_all(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, "meter.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("damage_meter_lib=debug".parse()?),
        )
        .with_writer(non_blocking)
        .with_ansi(false) // log files should not contain ANSI colour codes
        .init();

    // -----------------------------------------------------------------------
    // Panic hook — log panics through tracing before the process dies.
    // -----------------------------------------------------------------------
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        tracing::error!("PANIC at {}: {}", location, message);
    }));

    tracing::info!("Damage meter starting — logs → {}", log_dir.display());

    let cfg = config::load_or_default(&config_dir)?;
    if !config_dir.join(config::CONFIG_FILE).exists() {
        // Write the defaults out so there is a file to edit
        if let Err(e) = config::save(&cfg, &config_dir) {
            tracing::warn!("Could not write default config: {}", e);
        }
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(start_pipeline(cfg, &config_dir));
    // The file watchers block on their own threads; don't wait for them
    runtime.shutdown_background();
    result
}

/// Spawns every pipeline task and waits for the engine to finish.
///
/// Pipeline: tailer -> parser -> engine -> report, plus roster -> engine.
async fn start_pipeline(cfg: config::MeterConfig, config_dir: &Path) -> Result<()> {
    let (raw_tx, raw_rx)       = mpsc::channel::<String>(2048);
    let (event_tx, mut event_rx) = mpsc::channel::<parser::MeterEvent>(1024);
    let (roster_tx, roster_rx) = mpsc::channel::<Roster>(4);
    let (snap_tx, snap_rx)     = mpsc::channel::<MeterSnapshot>(16);
    let (handle, cmd_rx)       = engine::channel(1024);

    if cfg.feed_path.as_os_str().is_empty() {
        tracing::info!("No feed configured — set feed_path in {}", config::CONFIG_FILE);
        eprintln!("No feed configured; set feed_path in {}", config_dir.join(config::CONFIG_FILE).display());
        return Ok(());
    }

    if cfg.roster_path.as_os_str().is_empty() {
        tracing::info!("No roster configured — every name resolves to {}", UNKNOWN_NAME);
    } else {
        let roster_path = config::resolve_path(config_dir, &cfg.roster_path);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = identity::run(roster_path, roster_tx) {
                tracing::error!("Roster watcher stopped: {}", e);
            }
        });
    }

    let feed_path = config::resolve_path(config_dir, &cfg.feed_path);
    tokio::task::spawn_blocking(move || {
        if let Err(e) = tailer::run(feed_path, raw_tx) {
            tracing::error!("Tailer stopped: {}", e);
        }
    });
    tokio::spawn(parser::run(raw_rx, event_tx));
    tokio::spawn(report::run(snap_rx, cfg.clone()));

    // Forward parsed events into the engine through its handle
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if handle.send_event(event).await.is_err() {
                break;
            }
        }
    });

    let engine_task = tokio::spawn(engine::run(cmd_rx, roster_rx, snap_tx, cfg));

    tokio::select! {
        joined = engine_task => joined?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted — shutting down");
            Ok(())
        }
    }
}
