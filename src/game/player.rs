//! Player characters and the online roster

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::catalog::Location;
use super::fighter::{FighterState, InvalidTransition};

pub const STARTING_HEALTH: i32 = 100;
pub const STARTING_STRENGTH: i32 = 10;
pub const STARTING_DEFENSE: i32 = 2;

/// Experience required to advance from `level` to `level + 1`
pub fn xp_needed_for_next(level: u32) -> u32 {
    100 * level.max(1)
}

/// A player character (authoritative in-memory copy)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub level: u32,
    pub experience: u32,
    pub gold: u32,
    pub health: i32,
    pub max_health: i32,
    pub strength: i32,
    pub defense: i32,
    #[serde(default)]
    pub inventory: BTreeMap<String, u32>,
    pub location: Location,
    /// Bound recall point used on defeat
    #[serde(default)]
    pub recall: Option<Location>,
    /// Combat membership is never persisted
    #[serde(skip)]
    pub state: FighterState,
}

impl Player {
    pub fn new(name: impl Into<String>, spawn: Location) -> Self {
        Self {
            name: name.into(),
            level: 1,
            experience: 0,
            gold: 0,
            health: STARTING_HEALTH,
            max_health: STARTING_HEALTH,
            strength: STARTING_STRENGTH,
            defense: STARTING_DEFENSE,
            inventory: BTreeMap::new(),
            location: spawn,
            recall: None,
            state: FighterState::Idle,
        }
    }

    pub fn is_in_combat(&self) -> bool {
        self.state.is_engaged()
    }

    /// Move along the fighter state machine
    pub fn transition(&mut self, to: FighterState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition(to) {
            return Err(InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Subtract damage, clamping health to `[0, max_health]`. Returns the new health.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        self.health = (self.health - amount.max(0)).clamp(0, self.max_health.max(0));
        self.health
    }

    /// Add health up to the maximum. Returns the amount actually healed.
    pub fn heal(&mut self, amount: i32) -> i32 {
        let before = self.health;
        self.health = (self.health + amount.max(0)).clamp(0, self.max_health.max(0));
        self.health - before
    }

    pub fn add_item(&mut self, item: &str, n: u32) {
        let slot = self.inventory.entry(item.to_string()).or_insert(0);
        *slot = slot.saturating_add(n);
    }

    pub fn item_count(&self, item: &str) -> u32 {
        self.inventory.get(item).copied().unwrap_or(0)
    }

    /// Award experience and apply any level-ups. Returns each new level reached.
    pub fn gain_experience(&mut self, xp: u32) -> Vec<u32> {
        self.experience = self.experience.saturating_add(xp);
        let mut gained = Vec::new();
        while self.experience >= xp_needed_for_next(self.level) {
            self.experience -= xp_needed_for_next(self.level);
            self.level = self.level.saturating_add(1);
            self.max_health += 10;
            self.health = self.max_health;
            self.strength += 1;
            self.defense += 1;
            gained.push(self.level);
        }
        gained
    }
}

/// Players currently online, keyed by their unique name
#[derive(Debug, Default)]
pub struct Roster {
    players: HashMap<String, Player>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, player: Player) -> Option<Player> {
        self.players.insert(player.name.clone(), player)
    }

    pub fn remove(&mut self, name: &str) -> Option<Player> {
        self.players.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Player> {
        self.players.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Player> {
        self.players.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.players.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    /// Names of everyone in a room, sorted
    pub fn occupants(&self, loc: &Location) -> Vec<String> {
        let mut names: Vec<String> = self
            .players
            .values()
            .filter(|p| &p.location == loc)
            .map(|p| p.name.clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spawn() -> Location {
        Location::new("forest", "path")
    }

    #[test]
    fn level_up_carries_overflow() {
        let mut p = Player::new("ann", spawn());
        let levels = p.gain_experience(350);
        // 100 to reach 2, 200 to reach 3, 50 left over
        assert_eq!(levels, vec![2, 3]);
        assert_eq!(p.level, 3);
        assert_eq!(p.experience, 50);
        assert_eq!(p.max_health, STARTING_HEALTH + 20);
        assert_eq!(p.health, p.max_health);
        assert_eq!(p.strength, STARTING_STRENGTH + 2);
    }

    #[test]
    fn transitions_follow_the_table() {
        let mut p = Player::new("ann", spawn());
        assert!(p.transition(FighterState::Fled).is_err());
        p.transition(FighterState::Engaged).unwrap();
        assert!(p.is_in_combat());
        p.transition(FighterState::Fled).unwrap();
        assert!(!p.is_in_combat());
        p.transition(FighterState::Idle).unwrap();
    }

    #[test]
    fn occupants_are_sorted_by_name() {
        let mut roster = Roster::new();
        roster.insert(Player::new("zed", spawn()));
        roster.insert(Player::new("amy", spawn()));
        roster.insert(Player::new("bob", Location::new("forest", "clearing")));
        assert_eq!(roster.occupants(&spawn()), vec!["amy", "zed"]);
    }

    #[test]
    fn fighter_state_is_not_persisted() {
        let mut p = Player::new("ann", spawn());
        p.transition(FighterState::Engaged).unwrap();
        let json = serde_json::to_string(&p).unwrap();
        let back: Player = serde_json::from_str(&json).unwrap();
        assert_eq!(back.state, FighterState::Idle);
    }

    proptest! {
        #[test]
        fn health_stays_in_bounds(ops in proptest::collection::vec(-50i32..50, 0..100)) {
            let mut p = Player::new("ann", spawn());
            for op in ops {
                if op < 0 {
                    p.take_damage(-op);
                } else {
                    p.heal(op);
                }
                prop_assert!(p.health >= 0 && p.health <= p.max_health);
            }
        }
    }
}
