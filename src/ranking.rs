/// Leaderboard ordering over the registry's ledgers.
///
/// The view is lazy: it re-sorts only when the criteria change (or the
/// caller forces it). Between sorts the registry keeps mutating, so every
/// read is checked against the registry generation, and a stale view has to
/// be revalidated before it can be read again. Revalidation fixes
/// membership without re-sorting.
use crate::{
    error::RankingError,
    hit::CombatantId,
    ledger::AttackerLedger,
    registry::DamageRegistry,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortColumn {
    Name,
    Damage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub column:    SortColumn,
    pub direction: SortDirection,
}

impl SortSpec {
    pub const fn new(column: SortColumn, direction: SortDirection) -> Self {
        Self { column, direction }
    }

    pub const fn damage_descending() -> Self {
        Self::new(SortColumn::Damage, SortDirection::Descending)
    }
}

// ---------------------------------------------------------------------------
// Comparator
// ---------------------------------------------------------------------------

/// Sort key for one ledger, with the total folded once per sort.
struct Keyed<'a> {
    id:    CombatantId,
    name:  &'a str,
    total: u64,
}

fn compare(a: &Keyed, b: &Keyed, criteria: &[SortSpec]) -> Ordering {
    for spec in criteria {
        let ord = match spec.column {
            SortColumn::Name   => a.name.cmp(b.name),
            SortColumn::Damage => a.total.cmp(&b.total),
        };
        let ord = match spec.direction {
            SortDirection::Ascending  => ord,
            SortDirection::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    // Default tie-break: ascending total
    a.total.cmp(&b.total)
}

/// Ids of `ledgers` ordered by `criteria`. Stable over the input order, so
/// feeding it first-sighting order makes the result reproducible.
pub fn rank(ledgers: &[AttackerLedger], criteria: &[SortSpec]) -> Vec<CombatantId> {
    let mut keyed: Vec<Keyed> = ledgers
        .iter()
        .map(|l| Keyed { id: l.attacker_id(), name: l.attacker_name(), total: l.total() })
        .collect();
    keyed.sort_by(|a, b| compare(a, b, criteria));
    keyed.into_iter().map(|k| k.id).collect()
}

// ---------------------------------------------------------------------------
// RankingView
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RankingView {
    criteria:   Vec<SortSpec>,
    order:      Vec<CombatantId>,
    generation: u64,
    sorted:     bool,
}

impl RankingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn criteria(&self) -> &[SortSpec] {
        &self.criteria
    }

    /// Apply `criteria`. Re-sorts only if they differ from the current ones
    /// or the view has not been sorted over two or more attackers yet;
    /// otherwise just revalidates.
    /// Returns whether a sort actually ran.
    pub fn sort(&mut self, registry: &DamageRegistry, criteria: &[SortSpec]) -> bool {
        if self.sorted && self.criteria == criteria {
            self.revalidate(registry);
            return false;
        }
        self.criteria = criteria.to_vec();
        self.force_sort(registry);
        true
    }

    /// Re-sort with the current criteria regardless of whether they changed.
    /// A sort over fewer than two attackers orders nothing, so the view stays
    /// unsorted and the next `sort` applies the criteria again.
    pub fn force_sort(&mut self, registry: &DamageRegistry) {
        self.order = rank(registry.ledgers(), &self.criteria);
        self.generation = registry.generation();
        self.sorted = self.order.len() > 1;
        tracing::debug!("Ranking sorted: {} attackers, criteria {:?}", self.order.len(), self.criteria);
    }

    /// Whether the criteria have been applied to at least two attackers.
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn is_current(&self, registry: &DamageRegistry) -> bool {
        self.generation == registry.generation()
    }

    /// Bring the view back in line with the registry without re-sorting:
    /// forget attackers that no longer exist and append newcomers in
    /// first-sighting order.
    pub fn revalidate(&mut self, registry: &DamageRegistry) {
        if self.is_current(registry) {
            return;
        }
        self.order.retain(|&id| registry.ledger(id).is_some());
        let known: HashSet<CombatantId> = self.order.iter().copied().collect();
        self.order.extend(
            registry
                .ledgers()
                .iter()
                .map(AttackerLedger::attacker_id)
                .filter(|id| !known.contains(id)),
        );
        self.generation = registry.generation();
    }

    pub fn order(&self, registry: &DamageRegistry) -> Result<&[CombatantId], RankingError> {
        self.check(registry)?;
        Ok(&self.order)
    }

    /// Ledgers in ranked order, borrowed from `registry`.
    pub fn ledgers<'r>(&self, registry: &'r DamageRegistry) -> Result<Vec<&'r AttackerLedger>, RankingError> {
        self.check(registry)?;
        Ok(self.order.iter().filter_map(|&id| registry.ledger(id)).collect())
    }

    fn check(&self, registry: &DamageRegistry) -> Result<(), RankingError> {
        if self.is_current(registry) {
            Ok(())
        } else {
            Err(RankingError::Stale { view: self.generation, registry: registry.generation() })
        }
    }
}
