/// The meter engine task: sole owner of the `DamageMeter`.
///
/// Hits, resets, sort requests and snapshot requests all arrive as
/// `MeterCommand`s on one channel and are applied one at a time, so there is
/// exactly one writer and every reader gets an owned snapshot taken between
/// two commands. Roster updates arrive on their own channel.
///
/// Snapshots are pushed to the reporter after resets and sorts, and after
/// hits at most once per `snapshot_interval_ms` of feed time. Hits held back
/// by that throttle are flushed once the command channel has been quiet for
/// the same interval of wall time.
use crate::{
    config::MeterConfig,
    hit::{RawHeal, RawHit},
    identity::Roster,
    meter::{DamageMeter, HitSink},
    parser::MeterEvent,
    ranking::SortSpec,
    snapshot::MeterSnapshot,
};
use anyhow::Result;
use std::time::{Duration, Instant};
use tokio::sync::{
    mpsc::{self, Receiver, Sender},
    oneshot,
};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum MeterCommand {
    Event(MeterEvent),
    Sort {
        criteria: Vec<SortSpec>,
        reply:    oneshot::Sender<MeterSnapshot>,
    },
    ForceSort {
        reply: oneshot::Sender<MeterSnapshot>,
    },
    Snapshot {
        reply: oneshot::Sender<MeterSnapshot>,
    },
}

// ---------------------------------------------------------------------------
// MeterHandle — cheap handle, Clone + Send + Sync
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MeterHandle {
    tx:    Sender<MeterCommand>,
    epoch: Instant,
}

impl MeterHandle {
    pub fn new(tx: Sender<MeterCommand>) -> Self {
        Self { tx, epoch: Instant::now() }
    }

    pub async fn send_event(&self, event: MeterEvent) -> Result<()> {
        self.tx
            .send(MeterCommand::Event(event))
            .await
            .map_err(|_| anyhow::anyhow!("Meter engine channel closed"))
    }

    /// Presentation sort trigger. Returns the snapshot in the new order.
    pub async fn sort(&self, criteria: Vec<SortSpec>) -> Result<MeterSnapshot> {
        self.request(|reply| MeterCommand::Sort { criteria, reply }).await
    }

    pub async fn force_sort(&self) -> Result<MeterSnapshot> {
        self.request(|reply| MeterCommand::ForceSort { reply }).await
    }

    pub async fn snapshot(&self) -> Result<MeterSnapshot> {
        self.request(|reply| MeterCommand::Snapshot { reply }).await
    }

    async fn request<F>(&self, make: F) -> Result<MeterSnapshot>
    where
        F: FnOnce(oneshot::Sender<MeterSnapshot>) -> MeterCommand,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| anyhow::anyhow!("Meter engine channel closed"))?;
        reply_rx.await.map_err(|_| anyhow::anyhow!("Meter reply channel closed"))
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn deliver(&self, event: MeterEvent) {
        if self.tx.blocking_send(MeterCommand::Event(event)).is_err() {
            tracing::warn!("Meter engine gone; dropping {:?}", event);
        }
    }
}

/// For host threads (the hook that intercepts hits). Blocks while the
/// engine's queue is full; must not be called from inside the runtime.
impl HitSink for MeterHandle {
    fn on_hit(&mut self, hit: RawHit) {
        let timestamp_ms = self.now_ms();
        self.deliver(MeterEvent::Hit { timestamp_ms, hit });
    }

    fn on_heal(&mut self, heal: RawHeal) {
        let timestamp_ms = self.now_ms();
        self.deliver(MeterEvent::Heal { timestamp_ms, heal });
    }

    fn on_reset(&mut self) {
        let timestamp_ms = self.now_ms();
        self.deliver(MeterEvent::Reset { timestamp_ms });
    }
}

/// Build the command channel and the handle that feeds it.
pub fn channel(capacity: usize) -> (MeterHandle, Receiver<MeterCommand>) {
    let (tx, rx) = mpsc::channel(capacity);
    (MeterHandle::new(tx), rx)
}

// ---------------------------------------------------------------------------
// Engine state
// ---------------------------------------------------------------------------

struct EngineState {
    meter:        DamageMeter<Roster>,
    interval_ms:  u64,
    last_emit_ms: Option<u64>,
    /// Hits recorded since the last pushed snapshot.
    dirty:        bool,
}

impl EngineState {
    fn new(config: &MeterConfig) -> Self {
        Self {
            meter:        DamageMeter::new(Roster::new(), &config.default_sort),
            interval_ms:  config.snapshot_interval_ms,
            last_emit_ms: None,
            dirty:        false,
        }
    }

    /// Apply one feed event. Returns whether a snapshot should go out.
    fn apply(&mut self, event: MeterEvent) -> bool {
        match event {
            MeterEvent::Hit { timestamp_ms, hit } => {
                if self.meter.record_hit_at(hit, timestamp_ms).is_none() {
                    return false;
                }
                let due = match self.last_emit_ms {
                    None       => true,
                    Some(last) => timestamp_ms.saturating_sub(last) >= self.interval_ms,
                };
                if due {
                    self.last_emit_ms = Some(timestamp_ms);
                }
                self.dirty = !due;
                due
            }
            MeterEvent::Heal { heal, .. } => {
                self.meter.on_heal(heal);
                false
            }
            MeterEvent::Reset { timestamp_ms } => {
                tracing::info!("Session reset at {}ms", timestamp_ms);
                self.meter.reset();
                self.last_emit_ms = None;
                self.dirty = false;
                true
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Main engine task
// ---------------------------------------------------------------------------

pub async fn run(
    mut cmd_rx:    Receiver<MeterCommand>,
    mut roster_rx: Receiver<Roster>,
    snap_tx:       Sender<MeterSnapshot>,
    config:        MeterConfig,
) -> Result<()> {
    let mut eng = EngineState::new(&config);
    tracing::info!("Meter engine started, default sort {:?}", eng.meter.criteria());

    loop {
        tokio::select! {
            // Roster first, so a roster queued before a hit resolves that hit
            biased;

            Some(roster) = roster_rx.recv() => {
                tracing::info!("Roster updated → {} combatants", roster.len());
                eng.meter.set_resolver(roster);
            }

            // Trailing push for hits the throttle held back
            _ = tokio::time::sleep(Duration::from_millis(eng.interval_ms)), if eng.dirty => {
                eng.dirty = false;
                let _ = snap_tx.try_send(eng.meter.snapshot());
            }

            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    MeterCommand::Event(event) => {
                        if eng.apply(event) {
                            // Non-blocking — drop if the reporter is slow
                            let _ = snap_tx.try_send(eng.meter.snapshot());
                        }
                    }
                    MeterCommand::Sort { criteria, reply } => {
                        let resorted = eng.meter.sort(&criteria);
                        eng.dirty = false;
                        tracing::debug!("Sort requested {:?} (re-sorted: {})", criteria, resorted);
                        let snap = eng.meter.snapshot();
                        let _ = snap_tx.try_send(snap.clone());
                        let _ = reply.send(snap);
                    }
                    MeterCommand::ForceSort { reply } => {
                        eng.meter.force_sort();
                        eng.dirty = false;
                        let snap = eng.meter.snapshot();
                        let _ = snap_tx.try_send(snap.clone());
                        let _ = reply.send(snap);
                    }
                    MeterCommand::Snapshot { reply } => {
                        let _ = reply.send(eng.meter.snapshot());
                    }
                }
            }
        }
    }
    tracing::info!("Meter engine stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit::CombatantId;
    use crate::identity::Combatant;
    use crate::ranking::{SortColumn, SortDirection};

    fn roster() -> Roster {
        [
            Combatant { id: 1, name: "Stonebraid".into(), master_id: 0 },
            Combatant { id: 2, name: "Ayla".into(), master_id: 0 },
            Combatant { id: 7, name: "wolf".into(), master_id: 1 },
        ]
        .into_iter()
        .collect()
    }

    struct Harness {
        handle:    MeterHandle,
        roster_tx: Sender<Roster>,
        snap_rx:   Receiver<MeterSnapshot>,
        task:      tokio::task::JoinHandle<Result<()>>,
    }

    fn spawn_engine(config: MeterConfig) -> Harness {
        let (handle, cmd_rx) = channel(64);
        let (roster_tx, roster_rx) = mpsc::channel(4);
        let (snap_tx, snap_rx) = mpsc::channel(64);
        let task = tokio::spawn(run(cmd_rx, roster_rx, snap_tx, config));
        Harness { handle, roster_tx, snap_rx, task }
    }

    fn hit(ts: u64, a: CombatantId, t: CombatantId, amount: i64) -> MeterEvent {
        MeterEvent::Hit { timestamp_ms: ts, hit: RawHit::new(a, t, amount) }
    }

    fn ids(snap: &MeterSnapshot) -> Vec<CombatantId> {
        snap.rows.iter().map(|r| r.attacker_id).collect()
    }

    #[tokio::test]
    async fn records_and_sorts_through_handle() {
        let h = spawn_engine(MeterConfig::default());
        h.roster_tx.send(roster()).await.unwrap();

        h.handle.send_event(hit(0, 1, 10, 50)).await.unwrap();
        h.handle.send_event(hit(1, 1, 11, 30)).await.unwrap();
        h.handle.send_event(hit(2, 2, 10, 40)).await.unwrap();
        h.handle.send_event(hit(3, 7, 10, 10)).await.unwrap();

        let snap = h.handle.force_sort().await.unwrap();
        assert_eq!(ids(&snap), vec![1, 2]);
        assert_eq!(snap.rows[0].total, 90);
        assert_eq!(snap.grand_total, 130);

        let snap = h.handle
            .sort(vec![SortSpec::new(SortColumn::Name, SortDirection::Ascending)])
            .await
            .unwrap();
        assert_eq!(ids(&snap), vec![2, 1]);
        assert_eq!(snap.rows[0].attacker_name, "Ayla");
    }

    #[tokio::test]
    async fn order_is_kept_until_sort_is_requested() {
        let h = spawn_engine(MeterConfig::default());
        h.handle.send_event(hit(0, 1, 10, 10)).await.unwrap();
        h.handle.send_event(hit(1, 2, 10, 20)).await.unwrap();
        let snap = h.handle.force_sort().await.unwrap();
        assert_eq!(ids(&snap), vec![2, 1]);

        h.handle.send_event(hit(2, 1, 10, 100)).await.unwrap();
        let snap = h.handle.snapshot().await.unwrap();
        assert_eq!(ids(&snap), vec![2, 1], "totals changed but no sort was requested");
        assert_eq!(snap.rows[1].total, 110);

        let snap = h.handle.sort(vec![SortSpec::damage_descending()]).await.unwrap();
        assert_eq!(ids(&snap), vec![2, 1], "same criteria: no re-sort");
    }

    #[tokio::test]
    async fn reset_empties_and_pushes_snapshot() {
        let mut h = spawn_engine(MeterConfig::default());
        h.handle.send_event(hit(0, 1, 10, 10)).await.unwrap();
        h.handle.send_event(MeterEvent::Reset { timestamp_ms: 5 }).await.unwrap();

        let snap = h.handle.snapshot().await.unwrap();
        assert!(snap.rows.is_empty());

        // First hit snapshot, then the reset snapshot
        let first = h.snap_rx.recv().await.unwrap();
        assert_eq!(first.grand_total, 10);
        let second = h.snap_rx.recv().await.unwrap();
        assert_eq!(second.grand_total, 0);
    }

    #[tokio::test]
    async fn hit_snapshots_are_throttled_by_feed_time() {
        let config = MeterConfig { snapshot_interval_ms: 200, ..MeterConfig::default() };
        let mut h = spawn_engine(config);
        for ts in [0, 50, 100, 199, 200, 300] {
            h.handle.send_event(hit(ts, 1, 10, 1)).await.unwrap();
        }
        let _ = h.handle.snapshot().await.unwrap();

        let mut pushed = Vec::new();
        while let Ok(snap) = h.snap_rx.try_recv() {
            pushed.push(snap.grand_total);
        }
        assert_eq!(pushed, vec![1, 5]);

        // The hit at 300 was held back; it goes out once the feed is quiet
        let trailing = tokio::time::timeout(Duration::from_secs(5), h.snap_rx.recv())
            .await
            .expect("trailing snapshot")
            .unwrap();
        assert_eq!(trailing.grand_total, 6);
    }

    #[tokio::test]
    async fn quiet_feed_flushes_held_back_hits() {
        let mut h = spawn_engine(MeterConfig { snapshot_interval_ms: 500, ..MeterConfig::default() });
        for ts in [0, 200, 400] {
            h.handle.send_event(hit(ts, 1, 10, 100)).await.unwrap();
        }
        assert_eq!(h.snap_rx.recv().await.unwrap().grand_total, 100);
        let second = h.snap_rx.recv().await.unwrap();
        assert_eq!(second.grand_total, 300);
        // Nothing is pending after the flush
        let none = tokio::time::timeout(Duration::from_millis(700), h.snap_rx.recv()).await;
        assert!(none.is_err());
    }

    #[tokio::test]
    async fn default_sort_orders_pushed_snapshots() {
        let h = spawn_engine(MeterConfig::default());
        h.handle.send_event(hit(0, 1, 10, 10)).await.unwrap();
        h.handle.send_event(hit(1, 2, 10, 500)).await.unwrap();
        h.handle.send_event(hit(2, 3, 10, 90)).await.unwrap();

        let snap = h.handle.snapshot().await.unwrap();
        assert_eq!(snap.criteria, vec![SortSpec::damage_descending()]);
        assert_eq!(ids(&snap), vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn dropped_hits_do_not_reach_the_registry() {
        let h = spawn_engine(MeterConfig::default());
        h.handle.send_event(hit(0, 0, 9, -5)).await.unwrap();
        h.handle
            .send_event(MeterEvent::Heal {
                timestamp_ms: 1,
                heal: RawHeal { healer_id: 2, target_id: 1, amount: 50 },
            })
            .await
            .unwrap();
        let snap = h.handle.snapshot().await.unwrap();
        assert!(snap.rows.is_empty());
    }

    #[tokio::test]
    async fn stops_when_all_handles_drop() {
        let h = spawn_engine(MeterConfig::default());
        drop(h.handle);
        h.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn host_thread_can_feed_through_hit_sink() {
        let h = spawn_engine(MeterConfig::default());
        let mut sink = h.handle.clone();
        tokio::task::spawn_blocking(move || {
            sink.on_hit(RawHit::new(1, 10, 12));
            sink.on_hit(RawHit::new(1, 10, 8));
            sink.on_heal(RawHeal { healer_id: 1, target_id: 1, amount: 3 });
        })
        .await
        .unwrap();

        let snap = h.handle.snapshot().await.unwrap();
        assert_eq!(snap.grand_total, 20);
        assert_eq!(snap.rows[0].attacker_name, "UNKNOWN");
    }
}
