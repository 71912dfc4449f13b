/// The session context: registry + ranking view + identity resolver.
///
/// `DamageMeter` is an ordinary owned value. Whoever holds it is the single
/// writer; the async engine owns one inside its task, and a synchronous host
/// can own one directly and feed it through `HitSink`.
use crate::{
    hit::{CombatantId, RawHeal, RawHit},
    identity::IdentityResolver,
    ranking::{RankingView, SortSpec},
    registry::DamageRegistry,
    snapshot::MeterSnapshot,
};
use std::time::Instant;

/// What the host's event source calls into.
pub trait HitSink {
    fn on_hit(&mut self, hit: RawHit);

    /// Healing is not tracked; the hook exists so event sources can deliver
    /// heals without special-casing.
    fn on_heal(&mut self, heal: RawHeal) {
        tracing::trace!(
            "Heal ignored: {} -> {} ({})",
            heal.healer_id, heal.target_id, heal.amount
        );
    }

    /// Zone change / session end.
    fn on_reset(&mut self);
}

pub struct DamageMeter<R> {
    registry: DamageRegistry,
    view:     RankingView,
    resolver: R,
    epoch:    Instant,
}

impl<R: IdentityResolver> DamageMeter<R> {
    pub fn new(resolver: R, default_sort: &[SortSpec]) -> Self {
        let registry = DamageRegistry::new();
        let mut view = RankingView::new();
        view.sort(&registry, default_sort);
        Self { registry, view, resolver, epoch: Instant::now() }
    }

    /// Swap the identity resolver. Ledgers keep the names they already have.
    pub fn set_resolver(&mut self, resolver: R) {
        self.resolver = resolver;
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn registry(&self) -> &DamageRegistry {
        &self.registry
    }

    pub fn criteria(&self) -> &[SortSpec] {
        self.view.criteria()
    }

    /// Record a hit with a host-supplied capture time.
    pub fn record_hit_at(&mut self, hit: RawHit, timestamp_ms: u64) -> Option<CombatantId> {
        let credited = self.registry.record_hit(hit, &self.resolver, timestamp_ms);
        if credited.is_none() {
            tracing::trace!("Dropped non-positive hit {:?}", hit);
        }
        credited
    }

    /// Clear the session. The view goes back to unsorted, so the criteria
    /// are applied again once the new session has two attackers.
    pub fn reset(&mut self) {
        self.registry.reset();
        self.view.force_sort(&self.registry);
    }

    /// Sort-trigger from the presentation side. Re-sorts only when the
    /// criteria actually changed.
    pub fn sort(&mut self, criteria: &[SortSpec]) -> bool {
        self.view.sort(&self.registry, criteria)
    }

    pub fn force_sort(&mut self) {
        self.view.force_sort(&self.registry);
    }

    /// Project the current state in ranked order. Until the criteria have
    /// ordered two or more attackers the view is sorted here; after that it
    /// is only revalidated, so attackers first seen since the last sort
    /// appear at the bottom.
    pub fn snapshot(&mut self) -> MeterSnapshot {
        if self.view.is_sorted() {
            self.view.revalidate(&self.registry);
        } else {
            self.view.force_sort(&self.registry);
        }
        MeterSnapshot::build(&self.registry, &self.view)
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl<R: IdentityResolver> HitSink for DamageMeter<R> {
    fn on_hit(&mut self, hit: RawHit) {
        let now = self.now_ms();
        self.record_hit_at(hit, now);
    }

    fn on_reset(&mut self) {
        self.reset();
    }
}
