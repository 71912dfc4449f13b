/// Identity resolution: combatant id -> display name, and pet -> master id.
///
/// The core only sees the `IdentityResolver` trait. The shipped
/// implementation is a `Roster` loaded from a TOML file that looks like:
///
///   [[combatant]]
///   id = 1
///   name = "Stonebraid"
///
///   [[combatant]]
///   id = 7
///   name = "Stonebraid's wolf"
///   master_id = 1
///
/// The roster file is watched; every successful re-parse is pushed to the
/// engine, which swaps it in for subsequent hits. Names already frozen in a
/// ledger are left alone.
use crate::error::RosterError;
use crate::hit::CombatantId;
use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use tokio::sync::mpsc::Sender;

/// Lookup capability supplied by the host. Both calls must be cheap and
/// must not block; a miss is a normal answer, not an error.
pub trait IdentityResolver {
    fn resolve_name(&self, id: CombatantId) -> Option<String>;

    /// Owning combatant for pets/minions. `None` (or an id <= 0) means the
    /// combatant has no master.
    fn resolve_master_id(&self, id: CombatantId) -> Option<CombatantId>;
}

impl<R: IdentityResolver + ?Sized> IdentityResolver for &R {
    fn resolve_name(&self, id: CombatantId) -> Option<String> {
        (**self).resolve_name(id)
    }

    fn resolve_master_id(&self, id: CombatantId) -> Option<CombatantId> {
        (**self).resolve_master_id(id)
    }
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub id:        CombatantId,
    pub name:      String,
    #[serde(default)]
    pub master_id: CombatantId,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RosterFile {
    #[serde(default)]
    combatant: Vec<Combatant>,
}

#[derive(Debug, Clone, Default)]
pub struct Roster {
    by_id: HashMap<CombatantId, Combatant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later entries with the same id replace earlier ones.
    pub fn insert(&mut self, combatant: Combatant) {
        self.by_id.insert(combatant.id, combatant);
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn parse(content: &str) -> Result<Self, RosterError> {
        let file: RosterFile = toml::from_str(content)?;
        let mut roster = Self::new();
        for c in file.combatant {
            if c.master_id == c.id {
                tracing::warn!("Combatant {} lists itself as master; ignoring master_id", c.id);
                roster.insert(Combatant { master_id: 0, ..c });
            } else {
                roster.insert(c);
            }
        }
        Ok(roster)
    }

    pub fn load(path: &Path) -> Result<Self, RosterError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RosterError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }
}

impl FromIterator<Combatant> for Roster {
    fn from_iter<I: IntoIterator<Item = Combatant>>(iter: I) -> Self {
        let mut roster = Self::new();
        for c in iter {
            roster.insert(c);
        }
        roster
    }
}

impl IdentityResolver for Roster {
    fn resolve_name(&self, id: CombatantId) -> Option<String> {
        self.by_id.get(&id).map(|c| c.name.clone())
    }

    fn resolve_master_id(&self, id: CombatantId) -> Option<CombatantId> {
        self.by_id
            .get(&id)
            .map(|c| c.master_id)
            .filter(|&m| m > 0)
    }
}

// ---------------------------------------------------------------------------
// Roster watcher task
// ---------------------------------------------------------------------------

/// Blocking watch loop; run it on a blocking thread.
pub fn run(roster_path: PathBuf, tx: Sender<Roster>) -> Result<()> {
    tracing::info!("Roster watcher starting: {:?}", roster_path);

    if roster_path.exists() {
        match Roster::load(&roster_path) {
            Ok(roster) => {
                tracing::info!("Roster loaded: {} combatants", roster.len());
                let _ = tx.blocking_send(roster);
            }
            Err(e) => tracing::warn!("{}", e),
        }
    } else {
        tracing::info!("Roster file not found yet; names resolve to UNKNOWN until it appears");
    }

    // Watch the directory (editors often replace the file rather than write it)
    let watch_dir = roster_path.parent().unwrap_or(roster_path.as_path()).to_path_buf();
    let (fs_tx, fs_rx) = std_mpsc::channel::<notify::Result<Event>>();
    let mut watcher = RecommendedWatcher::new(fs_tx, notify::Config::default())?;
    watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

    loop {
        match fs_rx.recv() {
            Ok(Ok(Event { kind: EventKind::Modify(_) | EventKind::Create(_), paths, .. })) => {
                if paths.iter().any(|p| p.file_name() == roster_path.file_name()) {
                    match Roster::load(&roster_path) {
                        Ok(roster) => {
                            tracing::info!("Roster reloaded: {} combatants", roster.len());
                            if tx.blocking_send(roster).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!("{}", e),
                    }
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!("Roster watcher error: {}", e),
            Err(_) => break,
        }
    }
    Ok(())
}
