//! Deferred reappearance of consumed items and defeated enemies
//!
//! Tickets live in memory only and do not survive a restart.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use tracing::{debug, info};

use crate::util::time::ticks_for_delay;

use super::catalog::{Catalog, Location};
use super::registry::{EnemyKey, EntityRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RespawnKind {
    Item,
    Enemy,
}

/// What reappears where
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationKey {
    pub kind: RespawnKind,
    pub area: String,
    pub room: String,
    pub id: String,
}

impl LocationKey {
    pub fn item(loc: &Location, id: impl Into<String>) -> Self {
        Self {
            kind: RespawnKind::Item,
            area: loc.area.clone(),
            room: loc.room.clone(),
            id: id.into(),
        }
    }

    pub fn enemy(key: &EnemyKey) -> Self {
        Self {
            kind: RespawnKind::Enemy,
            area: key.area.clone(),
            room: key.room.clone(),
            id: key.template.clone(),
        }
    }

    fn enemy_key(&self) -> EnemyKey {
        EnemyKey {
            area: self.area.clone(),
            room: self.room.clone(),
            template: self.id.clone(),
        }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            RespawnKind::Item => "item",
            RespawnKind::Enemy => "enemy",
        };
        write!(f, "{kind}:{}/{}#{}", self.area, self.room, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespawnTicket {
    pub key: LocationKey,
    pub due_tick: u64,
}

/// Tick-driven respawn queue, at most one ticket per location key
#[derive(Debug)]
pub struct RespawnScheduler {
    tick_interval_ms: u64,
    tickets: BTreeMap<LocationKey, RespawnTicket>,
    /// Room items currently taken and waiting to reappear
    items_respawning: HashSet<LocationKey>,
}

impl RespawnScheduler {
    pub fn new(tick_interval_ms: u64) -> Self {
        Self {
            tick_interval_ms: tick_interval_ms.max(1),
            tickets: BTreeMap::new(),
            items_respawning: HashSet::new(),
        }
    }

    /// Schedule a reappearance `delay_ms` from `current_tick`.
    ///
    /// A zero delay means "always available" and creates nothing. A ticket
    /// already held for the same key is replaced by the new one.
    pub fn schedule(&mut self, key: LocationKey, delay_ms: u64, current_tick: u64) -> Option<u64> {
        if delay_ms == 0 {
            return None;
        }
        let due_tick = current_tick + ticks_for_delay(delay_ms, self.tick_interval_ms);
        if key.kind == RespawnKind::Item {
            self.items_respawning.insert(key.clone());
        }
        if let Some(old) = self.tickets.get(&key) {
            debug!(key = %key, old_due = old.due_tick, new_due = due_tick, "Respawn ticket replaced");
        }
        self.tickets.insert(
            key.clone(),
            RespawnTicket {
                key,
                due_tick,
            },
        );
        Some(due_tick)
    }

    /// Fire every ticket due at or before `current_tick`
    pub fn on_tick(
        &mut self,
        current_tick: u64,
        registry: &mut EntityRegistry,
        catalog: &Catalog,
    ) -> Vec<RespawnTicket> {
        let due: Vec<LocationKey> = self
            .tickets
            .values()
            .filter(|t| t.due_tick <= current_tick)
            .map(|t| t.key.clone())
            .collect();

        let mut fired = Vec::with_capacity(due.len());
        for key in due {
            let Some(ticket) = self.tickets.remove(&key) else {
                continue;
            };
            match key.kind {
                RespawnKind::Item => {
                    self.items_respawning.remove(&key);
                    debug!(key = %key, tick = current_tick, "Item available again");
                }
                RespawnKind::Enemy => {
                    registry.respawn(&key.enemy_key(), catalog);
                }
            }
            fired.push(ticket);
        }
        if !fired.is_empty() {
            info!(tick = current_tick, count = fired.len(), "Respawn tickets fired");
        }
        fired
    }

    pub fn is_item_available(&self, key: &LocationKey) -> bool {
        !self.items_respawning.contains(key)
    }

    #[cfg(test)]
    pub fn ticket(&self, key: &LocationKey) -> Option<&RespawnTicket> {
        self.tickets.get(key)
    }

    pub fn pending(&self) -> usize {
        self.tickets.len()
    }
}
