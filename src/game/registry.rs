//! Shared entity registry - one live enemy instance per (area, room, template)
//!
//! Every fighter in a room attacking "the wolf" mutates the same
//! [`EnemyInstance`]. Anything shown to players is a copy taken from here.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use tracing::{debug, info};

use super::catalog::{Catalog, EnemyTemplate, Location};

/// Identity of a shared enemy instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnemyKey {
    pub area: String,
    pub room: String,
    pub template: String,
}

impl EnemyKey {
    pub fn new(loc: &Location, template: impl Into<String>) -> Self {
        Self {
            area: loc.area.clone(),
            room: loc.room.clone(),
            template: template.into(),
        }
    }

    pub fn location(&self) -> Location {
        Location::new(self.area.clone(), self.room.clone())
    }
}

impl fmt::Display for EnemyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.area, self.room, self.template)
    }
}

/// Mutable runtime state of one enemy
#[derive(Debug, Clone)]
pub struct EnemyInstance {
    pub key: EnemyKey,
    pub name: String,
    pub current_health: i32,
    pub max_health: i32,
    /// Contributor name -> cumulative damage dealt this life
    pub contributor_damage: HashMap<String, i32>,
    /// Participants in join order
    pub fighters: Vec<String>,
}

impl EnemyInstance {
    pub fn from_template(key: EnemyKey, template: &EnemyTemplate) -> Self {
        Self {
            key,
            name: template.name.clone(),
            current_health: template.max_health,
            max_health: template.max_health,
            contributor_damage: HashMap::new(),
            fighters: Vec::new(),
        }
    }

    pub fn is_dead(&self) -> bool {
        self.current_health <= 0
    }

    /// Subtract `delta`, keeping health in `[0, max_health]`. Returns the damage actually taken.
    pub fn apply_damage(&mut self, delta: i32) -> i32 {
        let before = self.current_health;
        self.current_health = (self.current_health - delta.max(0)).clamp(0, self.max_health);
        before - self.current_health
    }

    pub fn record_contribution(&mut self, fighter: &str, amount: i32) {
        *self
            .contributor_damage
            .entry(fighter.to_string())
            .or_insert(0) += amount.max(0);
    }

    pub fn add_fighter(&mut self, fighter: &str) {
        if !self.fighters.iter().any(|f| f == fighter) {
            self.fighters.push(fighter.to_string());
        }
    }

    /// Forget a fighter entirely: participation and contribution
    pub fn purge_fighter(&mut self, fighter: &str) {
        self.fighters.retain(|f| f != fighter);
        self.contributor_damage.remove(fighter);
    }

    /// Highest cumulative contributor among `present`; ties go to the earlier entry.
    pub fn top_contributor<'a>(&self, present: &'a [String]) -> Option<&'a str> {
        let mut best: Option<(&'a str, i32)> = None;
        for name in present {
            let dmg = self.contributor_damage.get(name).copied().unwrap_or(0);
            if dmg <= 0 {
                continue;
            }
            if best.map_or(true, |(_, b)| dmg > b) {
                best = Some((name.as_str(), dmg));
            }
        }
        best.map(|(name, _)| name)
    }
}

/// Result of a damage application against the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageOutcome {
    pub dealt: i32,
    pub remaining: i32,
}

/// Owner of every live enemy instance
#[derive(Debug, Default)]
pub struct EntityRegistry {
    instances: BTreeMap<EnemyKey, EnemyInstance>,
    /// Keys whose enemy was defeated and awaits a respawn ticket
    respawning: HashSet<EnemyKey>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live instance, creating it from its template on first reference.
    ///
    /// Returns `None` while the key is waiting to respawn or the template is unknown.
    pub fn get_or_create(&mut self, key: &EnemyKey, catalog: &Catalog) -> Option<&mut EnemyInstance> {
        if self.respawning.contains(key) {
            return None;
        }
        if !self.instances.contains_key(key) {
            let template = catalog.enemy(&key.template)?;
            debug!(enemy = %key, health = template.max_health, "Instantiating enemy");
            self.instances
                .insert(key.clone(), EnemyInstance::from_template(key.clone(), template));
        }
        self.instances.get_mut(key)
    }

    pub fn get(&self, key: &EnemyKey) -> Option<&EnemyInstance> {
        self.instances.get(key)
    }

    pub fn get_mut(&mut self, key: &EnemyKey) -> Option<&mut EnemyInstance> {
        self.instances.get_mut(key)
    }

    /// Live means present with health above zero
    pub fn is_alive(&self, key: &EnemyKey) -> bool {
        self.instances.get(key).is_some_and(|e| !e.is_dead())
    }

    /// Damage a live instance. A missing or already-dead instance is left untouched.
    pub fn apply_damage(&mut self, key: &EnemyKey, delta: i32) -> Option<DamageOutcome> {
        let enemy = self.instances.get_mut(key)?;
        if enemy.is_dead() {
            return None;
        }
        let dealt = enemy.apply_damage(delta);
        Some(DamageOutcome {
            dealt,
            remaining: enemy.current_health,
        })
    }

    /// Delete an instance. Only the first call for a given life returns it.
    pub fn remove(&mut self, key: &EnemyKey) -> Option<EnemyInstance> {
        let removed = self.instances.remove(key);
        if removed.is_none() {
            debug!(enemy = %key, "Remove of absent enemy ignored");
        }
        removed
    }

    pub fn mark_respawning(&mut self, key: EnemyKey) {
        self.respawning.insert(key);
    }

    pub fn is_respawning(&self, key: &EnemyKey) -> bool {
        self.respawning.contains(key)
    }

    /// Clear the respawn marker and bring the enemy back at full health.
    ///
    /// An instance that is somehow already live is kept as-is.
    pub fn respawn(&mut self, key: &EnemyKey, catalog: &Catalog) -> bool {
        self.respawning.remove(key);
        let created = !self.instances.contains_key(key);
        if self.get_or_create(key, catalog).is_some() && created {
            info!(enemy = %key, "Enemy respawned");
        }
        created
    }

    /// Remove a fighter from every instance's participants and contributions
    pub fn purge_fighter(&mut self, fighter: &str) {
        for enemy in self.instances.values_mut() {
            enemy.purge_fighter(fighter);
        }
    }

    /// Drop instances nobody is fighting. Returns how many were evicted.
    pub fn evict_unengaged(&mut self) -> usize {
        let before = self.instances.len();
        self.instances.retain(|_, e| !e.fighters.is_empty());
        before - self.instances.len()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
