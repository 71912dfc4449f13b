/// Event value types shared by the ingestion path and the ledgers.
///
/// `RawHit` / `RawHeal` are what the host hands us, unvalidated and with the
/// attacker not yet redirected. `HitRecord` is what a ledger stores once a
/// raw hit has passed validation and identity resolution.
use serde::{Deserialize, Serialize};

/// Numeric combatant id as supplied by the host. 0 means "nobody".
pub type CombatantId = i64;

/// Display name used whenever the identity resolver has nothing for an id.
pub const UNKNOWN_NAME: &str = "UNKNOWN";

// ---------------------------------------------------------------------------
// Raw notifications from the event source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHit {
    pub attacker_id: CombatantId,
    pub target_id:   CombatantId,
    /// Signed on purpose: the host occasionally reports 0 or negative
    /// amounts, which are dropped at ingestion.
    pub amount:      i64,
}

impl RawHit {
    pub fn new(attacker_id: CombatantId, target_id: CombatantId, amount: i64) -> Self {
        Self { attacker_id, target_id, amount }
    }

    /// Validated damage amount, or `None` if the hit must be dropped.
    pub fn damage(&self) -> Option<u64> {
        u64::try_from(self.amount).ok().filter(|&a| a > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHeal {
    pub healer_id: CombatantId,
    pub target_id: CombatantId,
    pub amount:    i64,
}

// ---------------------------------------------------------------------------
// Stored hit
// ---------------------------------------------------------------------------

/// One accepted damage event. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HitRecord {
    /// Credited attacker (after pet redirection).
    pub source_id:    CombatantId,
    /// Combatant that actually landed the hit; differs from `source_id`
    /// only when the hit came from a pet.
    pub origin_id:    CombatantId,
    pub target_id:    CombatantId,
    /// Frozen at capture time.
    pub target_name:  String,
    pub amount:       u64,
    pub timestamp_ms: u64,
}

impl HitRecord {
    pub fn is_redirected(&self) -> bool {
        self.origin_id != self.source_id
    }
}
