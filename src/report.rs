/// Plain-text leaderboard — the binary's stand-in for a presentation layer.
///
/// Renders each pushed `MeterSnapshot` as a table of attackers with a share
/// bar scaled to the grand total, optionally followed by every attacker's
/// per-target sub-rows. Expand/collapse is not modelled: sub-rows are either
/// all shown or all hidden.
use crate::{
    config::{MeterConfig, ReportFormat},
    snapshot::{AttackerRow, MeterSnapshot},
};
use anyhow::Result;
use std::fmt::Write as _;
use std::io::Write as _;
use tokio::sync::mpsc::Receiver;

const BAR_WIDTH: usize = 20;
const NAME_WIDTH: usize = 24;

fn bar(share: f64) -> String {
    let filled = (share.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

fn push_row(out: &mut String, rank: usize, row: &AttackerRow, breakdown: bool) {
    let _ = write!(
        out,
        "{:>3}. {:<name$} {:>10} [{}] {:>5.1}%",
        rank,
        row.attacker_name,
        row.total,
        bar(row.share),
        row.share * 100.0,
        name = NAME_WIDTH,
    );
    if row.pet_damage > 0 {
        let _ = write!(out, "  (pets {})", row.pet_damage);
    }
    out.push('\n');
    if breakdown {
        for sub in &row.breakdown {
            let _ = writeln!(
                out,
                "       - {:<name$} {:>8} [{}] {:>5.1}%",
                sub.target_name,
                sub.subtotal,
                bar(sub.share),
                sub.share * 100.0,
                name = NAME_WIDTH - 2,
            );
        }
    }
}

pub fn render_table(snap: &MeterSnapshot, max_rows: usize, breakdown: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "== damage: {} total, {} attackers ==",
        snap.grand_total,
        snap.rows.len()
    );
    if snap.rows.is_empty() {
        out.push_str("   (no damage recorded)\n");
        return out;
    }
    for (i, row) in snap.rows.iter().take(max_rows).enumerate() {
        push_row(&mut out, i + 1, row, breakdown);
    }
    if snap.rows.len() > max_rows {
        let _ = writeln!(out, "   ... {} more", snap.rows.len() - max_rows);
    }
    out
}

pub fn render_json(snap: &MeterSnapshot) -> Result<String> {
    Ok(serde_json::to_string(snap)?)
}

pub fn render(snap: &MeterSnapshot, config: &MeterConfig) -> Result<String> {
    match config.report_format {
        ReportFormat::Table => Ok(render_table(snap, config.report_rows, config.report_breakdown)),
        ReportFormat::Json  => render_json(snap).map(|mut s| {
            s.push('\n');
            s
        }),
    }
}

/// Print every snapshot the engine pushes until the channel closes.
pub async fn run(mut snap_rx: Receiver<MeterSnapshot>, config: MeterConfig) -> Result<()> {
    while let Some(snap) = snap_rx.recv().await {
        match render(&snap, &config) {
            Ok(text) => {
                let mut stdout = std::io::stdout().lock();
                if let Err(e) = stdout.write_all(text.as_bytes()).and_then(|_| stdout.flush()) {
                    tracing::warn!("Report write failed: {}", e);
                }
            }
            Err(e) => tracing::warn!("Report render failed: {}", e),
        }
    }
    Ok(())
}
