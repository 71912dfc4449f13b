/// Meter configuration — persisted as TOML in the config directory.
///
/// The config directory is the first command-line argument, else
/// `$DAMAGE_METER_HOME`, else the working directory. It holds:
///   config.toml   — this file
///   logs/         — daily rolling log files
///
/// NOTE: an empty `feed_path` leaves the pipeline idle; nothing is tailed
/// until a feed is configured.
use crate::ranking::SortSpec;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.toml";
pub const HOME_ENV: &str = "DAMAGE_METER_HOME";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Event feed file to tail (see `parser` for the line format).
    #[serde(default)]
    pub feed_path: PathBuf,

    /// Roster TOML used to resolve names and pet owners.
    #[serde(default)]
    pub roster_path: PathBuf,

    /// Minimum feed time between hit-driven snapshots.
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,

    /// Leaderboard rows printed per report.
    #[serde(default = "default_report_rows")]
    pub report_rows: usize,

    /// Print per-target sub-rows under each attacker.
    #[serde(default = "default_true")]
    pub report_breakdown: bool,

    #[serde(default = "default_report_format")]
    pub report_format: ReportFormat,

    /// Criteria applied before the first explicit sort request. Kept last:
    /// it serializes as an array of tables.
    #[serde(default = "default_sort")]
    pub default_sort: Vec<SortSpec>,
}

fn default_sort() -> Vec<SortSpec> { vec![SortSpec::damage_descending()] }
fn default_snapshot_interval_ms() -> u64 { 1_000 }
fn default_report_rows() -> usize { 10 }
fn default_true() -> bool { true }
fn default_report_format() -> ReportFormat { ReportFormat::Table }

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            feed_path:            PathBuf::new(),
            roster_path:          PathBuf::new(),
            default_sort:         default_sort(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            report_rows:          default_report_rows(),
            report_breakdown:     default_true(),
            report_format:        default_report_format(),
        }
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

pub fn load_or_default(config_dir: &Path) -> Result<MeterConfig> {
    let path = config_dir.join(CONFIG_FILE);
    if path.exists() {
        let raw = std::fs::read_to_string(&path)?;
        let cfg: MeterConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Config parse error: {}", e))?;
        Ok(cfg)
    } else {
        Ok(MeterConfig::default())
    }
}

pub fn save(config: &MeterConfig, config_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(config_dir)?;
    let raw = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("Config serialize error: {}", e))?;
    std::fs::write(config_dir.join(CONFIG_FILE), raw)?;
    Ok(())
}

/// Resolve the config directory from an optional CLI argument.
pub fn config_dir(arg: Option<String>) -> PathBuf {
    arg.map(PathBuf::from)
        .or_else(|| std::env::var_os(HOME_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Relative feed/roster paths are taken relative to the config directory.
pub fn resolve_path(config_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        config_dir.join(path)
    }
}
