/// Read-only projection of the meter for the presentation side.
///
/// Everything here is owned data, built in one pass while the writer holds
/// the registry, so a consumer can never see a half-applied hit.
use crate::{
    hit::CombatantId,
    ledger::AttackerLedger,
    ranking::{RankingView, SortSpec},
    registry::DamageRegistry,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownRow {
    pub target_id:   CombatantId,
    pub target_name: String,
    pub subtotal:    u64,
    /// Fraction of the grand total (not of the attacker's total), so sub-rows
    /// and top-level bars share one scale.
    pub share:       f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttackerRow {
    pub attacker_id:    CombatantId,
    pub attacker_name:  String,
    pub total:          u64,
    /// Part of `total` landed by pets.
    pub pet_damage:     u64,
    pub hit_count:      usize,
    pub active_span_ms: u64,
    pub share:          f64,
    pub breakdown:      Vec<BreakdownRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterSnapshot {
    pub generation:  u64,
    pub grand_total: u64,
    pub criteria:    Vec<SortSpec>,
    pub rows:        Vec<AttackerRow>,
}

fn share(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

impl AttackerRow {
    fn from_ledger(ledger: &AttackerLedger, grand_total: u64) -> Self {
        let total = ledger.total();
        Self {
            attacker_id:    ledger.attacker_id(),
            attacker_name:  ledger.attacker_name().to_owned(),
            total,
            pet_damage:     ledger.pet_total(),
            hit_count:      ledger.hit_count(),
            active_span_ms: ledger.active_span_ms(),
            share:          share(total, grand_total),
            breakdown:      ledger
                .breakdown()
                .into_iter()
                .map(|t| BreakdownRow {
                    share:       share(t.subtotal, grand_total),
                    target_id:   t.target_id,
                    target_name: t.target_name,
                    subtotal:    t.subtotal,
                })
                .collect(),
        }
    }
}

impl MeterSnapshot {
    pub fn empty() -> Self {
        Self { generation: 0, grand_total: 0, criteria: Vec::new(), rows: Vec::new() }
    }

    /// Build from a view that is current for `registry`. A stale view falls
    /// back to first-sighting order rather than failing.
    pub fn build(registry: &DamageRegistry, view: &RankingView) -> Self {
        let grand_total = registry.grand_total();
        let ordered = match view.ledgers(registry) {
            Ok(ledgers) => ledgers,
            Err(e) => {
                tracing::warn!("Snapshot from unsorted registry: {}", e);
                registry.ledgers().iter().collect()
            }
        };
        Self {
            generation:  registry.generation(),
            grand_total,
            criteria:    view.criteria().to_vec(),
            rows:        ordered
                .into_iter()
                .map(|l| AttackerRow::from_ledger(l, grand_total))
                .collect(),
        }
    }
}
