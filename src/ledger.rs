/// Per-attacker aggregation of recorded hits.
///
/// Hits are grouped by target id. Groups are kept in the order their target
/// was first hit, and hits inside a group keep their arrival order, so the
/// breakdown is a single pass over the groups with no re-sorting.
///
/// Totals are always folded from the stored hits rather than kept in a
/// running counter; the hit list is the only source of truth.
use crate::hit::{CombatantId, HitRecord};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct TargetHits {
    target_id: CombatantId,
    hits:      Vec<HitRecord>,
}

impl TargetHits {
    fn subtotal(&self) -> u64 {
        self.hits.iter().map(|h| h.amount).sum()
    }
}

/// One row of an attacker's per-target breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetTotal {
    pub target_id:   CombatantId,
    pub target_name: String,
    pub subtotal:    u64,
}

#[derive(Debug, Clone)]
pub struct AttackerLedger {
    attacker_id:   CombatantId,
    attacker_name: String,
    targets:       Vec<TargetHits>,
    /// target_id -> position in `targets`
    index:         HashMap<CombatantId, usize>,
}

impl AttackerLedger {
    pub fn new(attacker_id: CombatantId, attacker_name: impl Into<String>) -> Self {
        Self {
            attacker_id,
            attacker_name: attacker_name.into(),
            targets:       Vec::new(),
            index:         HashMap::new(),
        }
    }

    pub fn attacker_id(&self) -> CombatantId {
        self.attacker_id
    }

    /// Name resolved when this attacker was first seen. Never refreshed.
    pub fn attacker_name(&self) -> &str {
        &self.attacker_name
    }

    /// Append a hit under its target id. Hits credited to a different
    /// attacker are refused so the ledger can't mix identities.
    pub(crate) fn insert(&mut self, hit: HitRecord) -> bool {
        if hit.source_id != self.attacker_id {
            tracing::warn!(
                "Ledger {} refused hit credited to {}",
                self.attacker_id, hit.source_id
            );
            return false;
        }

        match self.index.get(&hit.target_id) {
            Some(&slot) => self.targets[slot].hits.push(hit),
            None => {
                self.index.insert(hit.target_id, self.targets.len());
                self.targets.push(TargetHits { target_id: hit.target_id, hits: vec![hit] });
            }
        }
        true
    }

    pub fn total(&self) -> u64 {
        self.targets.iter().map(TargetHits::subtotal).sum()
    }

    pub fn total_for(&self, target_id: CombatantId) -> u64 {
        self.index
            .get(&target_id)
            .map(|&slot| self.targets[slot].subtotal())
            .unwrap_or(0)
    }

    /// One row per distinct target, in first-hit order.
    pub fn breakdown(&self) -> Vec<TargetTotal> {
        self.targets
            .iter()
            .filter_map(|group| {
                let first = group.hits.first()?;
                Some(TargetTotal {
                    target_id:   group.target_id,
                    target_name: first.target_name.clone(),
                    subtotal:    group.subtotal(),
                })
            })
            .collect()
    }

    /// All hits, grouped by target in first-hit order.
    pub fn hits(&self) -> impl Iterator<Item = &HitRecord> {
        self.targets.iter().flat_map(|group| group.hits.iter())
    }

    pub fn hit_count(&self) -> usize {
        self.targets.iter().map(|group| group.hits.len()).sum()
    }

    /// Damage landed by pets and credited to this attacker.
    pub fn pet_total(&self) -> u64 {
        self.hits().filter(|h| h.is_redirected()).map(|h| h.amount).sum()
    }

    pub fn first_hit_ms(&self) -> Option<u64> {
        self.hits().map(|h| h.timestamp_ms).min()
    }

    pub fn last_hit_ms(&self) -> Option<u64> {
        self.hits().map(|h| h.timestamp_ms).max()
    }

    /// Time between the earliest and latest hit. 0 with fewer than two hits.
    pub fn active_span_ms(&self) -> u64 {
        match (self.first_hit_ms(), self.last_hit_ms()) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => 0,
        }
    }
}
