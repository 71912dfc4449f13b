/// Top-level collection of attacker ledgers for one tracking session.
///
/// Ledgers are kept in first-sighting order and found by linear scan; an
/// encounter has tens of attackers, not thousands. Every hit is credited to
/// the attacker's master when the resolver reports one (one level only: a
/// pet's pet is credited to the first pet's master lookup, nothing deeper).
use crate::{
    hit::{CombatantId, HitRecord, RawHit, UNKNOWN_NAME},
    identity::IdentityResolver,
    ledger::AttackerLedger,
};

#[derive(Debug, Default)]
pub struct DamageRegistry {
    ledgers:    Vec<AttackerLedger>,
    /// Bumped on every accepted mutation so views can tell they are stale.
    generation: u64,
}

impl DamageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one raw hit. Returns the credited attacker id, or `None` when
    /// the hit was dropped for a non-positive amount.
    pub fn record_hit<R>(&mut self, raw: RawHit, resolver: &R, timestamp_ms: u64) -> Option<CombatantId>
    where
        R: IdentityResolver + ?Sized,
    {
        let amount = raw.damage()?;

        let attacker_id = match resolver.resolve_master_id(raw.attacker_id) {
            Some(master) if master > 0 => master,
            _ => raw.attacker_id,
        };

        let slot = match self.position(attacker_id) {
            Some(slot) => slot,
            None => {
                let name = resolver
                    .resolve_name(attacker_id)
                    .unwrap_or_else(|| UNKNOWN_NAME.to_owned());
                tracing::debug!("New attacker {} '{}'", attacker_id, name);
                self.ledgers.push(AttackerLedger::new(attacker_id, name));
                self.ledgers.len() - 1
            }
        };

        let target_name = resolver
            .resolve_name(raw.target_id)
            .unwrap_or_else(|| UNKNOWN_NAME.to_owned());

        let record = HitRecord {
            source_id: attacker_id,
            origin_id: raw.attacker_id,
            target_id: raw.target_id,
            target_name,
            amount,
            timestamp_ms,
        };
        if !self.ledgers[slot].insert(record) {
            return None;
        }
        self.generation += 1;
        Some(attacker_id)
    }

    /// Drop every ledger. Called on zone change / session end.
    pub fn reset(&mut self) {
        tracing::info!("Registry reset ({} attackers cleared)", self.ledgers.len());
        self.ledgers.clear();
        self.generation += 1;
    }

    fn position(&self, attacker_id: CombatantId) -> Option<usize> {
        self.ledgers.iter().position(|l| l.attacker_id() == attacker_id)
    }

    pub fn ledger(&self, attacker_id: CombatantId) -> Option<&AttackerLedger> {
        self.position(attacker_id).map(|slot| &self.ledgers[slot])
    }

    /// Ledgers in first-sighting order.
    pub fn ledgers(&self) -> &[AttackerLedger] {
        &self.ledgers
    }

    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }

    pub fn grand_total(&self) -> u64 {
        self.ledgers.iter().map(AttackerLedger::total).sum()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
