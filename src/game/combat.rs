//! Combat engine - shared encounters resolved once per group per combat tick
//!
//! Attacking only registers intent. Health changes happen in [`CombatEngine::on_tick`],
//! which groups fighters by the (room, enemy set) they share and resolves one
//! round for each group:
//!
//! 1. every fighter strikes a random live enemy of the set
//! 2. enemies brought to zero are removed, rewarded and scheduled to respawn
//! 3. surviving enemies strike back, preferring their top contributor
//! 4. a group with no enemies left is victorious

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info, trace, warn};

use super::catalog::{Catalog, Location};
use super::dice::Dice;
use super::fighter::{CombatExit, FighterState};
use super::hooks::{PlayerSink, QuestLog};
use super::outbox::Outbox;
use super::player::Roster;
use super::registry::{EnemyKey, EntityRegistry};
use super::respawn::{LocationKey, RespawnScheduler};

/// Player hit: `max(1, strength + uniform(-2, +3))`
pub fn player_damage(strength: i32, dice: &mut dyn Dice) -> i32 {
    (strength + dice.roll(-2, 3)).max(1)
}

/// Enemy hit: `max(1, attack roll - defense)`
pub fn enemy_damage(attack_roll: i32, defense: i32) -> i32 {
    (attack_roll - defense).max(1)
}

/// Combat tunables
#[derive(Debug, Clone)]
pub struct CombatSettings {
    /// Rounds resolve on ticks divisible by this
    pub combat_every_ticks: u64,
    /// Probability a flee attempt succeeds
    pub flee_chance: f64,
}

impl Default for CombatSettings {
    fn default() -> Self {
        Self {
            combat_every_ticks: 3,
            flee_chance: 0.5,
        }
    }
}

/// Everything a round touches, borrowed from the world for one call
pub struct Encounter<'a> {
    pub tick: u64,
    pub catalog: &'a Catalog,
    pub roster: &'a mut Roster,
    pub registry: &'a mut EntityRegistry,
    pub respawns: &'a mut RespawnScheduler,
    pub dice: &'a mut dyn Dice,
    pub quests: &'a mut dyn QuestLog,
    pub store: &'a dyn PlayerSink,
    pub outbox: &'a mut Outbox,
}

/// One fighter's membership in an encounter
#[derive(Debug, Clone)]
struct CombatRecord {
    location: Location,
    /// Sorted, shared with every groupmate
    enemies: Vec<EnemyKey>,
    started_tick: u64,
    join_seq: u64,
}

/// Identity of a derived combat group
pub type GroupKey = (Location, Vec<EnemyKey>);

/// What one pass resolved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub groups_resolved: usize,
    pub enemies_killed: Vec<EnemyKey>,
    pub players_defeated: Vec<String>,
}

impl RoundReport {
    fn merge(&mut self, other: RoundReport) {
        self.groups_resolved += other.groups_resolved;
        self.enemies_killed.extend(other.enemies_killed);
        self.players_defeated.extend(other.players_defeated);
    }
}

pub struct CombatEngine {
    settings: CombatSettings,
    records: HashMap<String, CombatRecord>,
    next_seq: u64,
    /// Tick for which `processed` is valid
    processed_tick: Option<u64>,
    /// Fighters already resolved this tick
    processed: HashSet<String>,
}

impl CombatEngine {
    pub fn new(settings: CombatSettings) -> Self {
        Self {
            settings,
            records: HashMap::new(),
            next_seq: 0,
            processed_tick: None,
            processed: HashSet::new(),
        }
    }

    pub fn is_combat_tick(&self, tick: u64) -> bool {
        tick % self.settings.combat_every_ticks.max(1) == 0
    }

    /// Whether the engine holds an encounter record for `name`
    pub fn has_record(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn engaged_count(&self) -> usize {
        self.records.len()
    }

    /// Enemy set of a fighter's encounter
    #[cfg(test)]
    pub fn enemies_of(&self, name: &str) -> Option<&[EnemyKey]> {
        self.records.get(name).map(|r| r.enemies.as_slice())
    }

    /// Start tick of a fighter's encounter
    #[cfg(test)]
    pub fn started_tick(&self, name: &str) -> Option<u64> {
        self.records.get(name).map(|r| r.started_tick)
    }

    /// Idle -> Engaged. Returns narrative for the attacker.
    pub fn start_combat(&mut self, cx: &mut Encounter<'_>, name: &str, target: &str) -> String {
        let Some(player) = cx.roster.get(name) else {
            return "You are not in the world.".to_string();
        };
        if player.is_in_combat() {
            return self.widen_combat(cx, name, target);
        }
        let location = player.location.clone();
        if target.trim().is_empty() {
            return "Attack what?".to_string();
        }

        let catalog = cx.catalog;
        let Some(template) = catalog.find_enemy_in_room(&location, target) else {
            return "You don't see that here.".to_string();
        };
        let key = EnemyKey::new(&location, template.id.clone());

        if cx.registry.is_respawning(&key) {
            return format!("The {} is already dead.", template.name);
        }
        let Some(enemy) = cx.registry.get_or_create(&key, catalog) else {
            return format!("The {} is already dead.", template.name);
        };
        if enemy.is_dead() {
            return format!("The {} is already dead.", template.name);
        }
        let (health, max_health) = (enemy.current_health, enemy.max_health);

        // Join whoever is already fighting this instance
        let partners: Vec<String> = enemy
            .fighters
            .iter()
            .filter(|f| self.records.contains_key(*f))
            .cloned()
            .collect();
        let (enemies, started_tick) = match partners.first().and_then(|p| self.records.get(p)) {
            Some(rec) => (rec.enemies.clone(), rec.started_tick),
            None => (vec![key.clone()], cx.tick),
        };

        for k in &enemies {
            if let Some(e) = cx.registry.get_mut(k) {
                e.add_fighter(name);
            }
        }

        if let Some(player) = cx.roster.get_mut(name) {
            if let Err(e) = player.transition(FighterState::Engaged) {
                warn!(player = %name, error = %e, "Unexpected fighter state on attack");
                player.state = FighterState::Engaged;
            }
        }

        let join_seq = self.next_seq;
        self.next_seq += 1;
        self.records.insert(
            name.to_string(),
            CombatRecord {
                location: location.clone(),
                enemies,
                started_tick,
                join_seq,
            },
        );

        info!(player = %name, enemy = %key, joined = !partners.is_empty(), "Combat started");
        cx.outbox.room(
            &location,
            format!("{} attacks the {}!", name, template.name),
            &[name],
        );

        if partners.is_empty() {
            format!(
                "You attack the {}! ({}/{})",
                template.name, health, max_health
            )
        } else {
            format!(
                "You join {} in fighting the {}! ({}/{})",
                partners.join(", "),
                template.name,
                health,
                max_health
            )
        }
    }

    /// An engaged fighter takes on another enemy in the room.
    ///
    /// The fighter's whole group gains the enemy. If someone else is already
    /// fighting it, the two groups merge into one encounter.
    fn widen_combat(&mut self, cx: &mut Encounter<'_>, name: &str, target: &str) -> String {
        let Some(rec) = self.records.get(name) else {
            return "You are already fighting!".to_string();
        };
        if target.trim().is_empty() {
            return "You are already fighting!".to_string();
        }
        let location = rec.location.clone();
        let current = rec.enemies.clone();

        let catalog = cx.catalog;
        let Some(template) = catalog.find_enemy_in_room(&location, target) else {
            return "You don't see that here.".to_string();
        };
        let key = EnemyKey::new(&location, template.id.clone());
        if current.contains(&key) {
            return format!("You are already fighting the {}!", template.name);
        }
        if cx.registry.is_respawning(&key) {
            return format!("The {} is already dead.", template.name);
        }
        let Some(enemy) = cx.registry.get_or_create(&key, catalog) else {
            return format!("The {} is already dead.", template.name);
        };
        if enemy.is_dead() {
            return format!("The {} is already dead.", template.name);
        }
        let (health, max_health) = (enemy.current_health, enemy.max_health);
        let rival: Option<Vec<EnemyKey>> = enemy
            .fighters
            .iter()
            .find_map(|f| self.records.get(f))
            .map(|r| r.enemies.clone());

        let mut merged = current.clone();
        merged.push(key.clone());
        if let Some(rival) = &rival {
            merged.extend(rival.iter().cloned());
        }
        merged.sort();
        merged.dedup();

        let affected = |r: &CombatRecord| {
            r.location == location && (r.enemies == current || rival.as_ref() == Some(&r.enemies))
        };
        let started_tick = self
            .records
            .values()
            .filter(|r| affected(*r))
            .map(|r| r.started_tick)
            .min()
            .unwrap_or(cx.tick);
        let mut members: Vec<(u64, String)> = Vec::new();
        for (fighter, r) in self.records.iter_mut() {
            if affected(&*r) {
                r.enemies = merged.clone();
                r.started_tick = started_tick;
                members.push((r.join_seq, fighter.clone()));
            }
        }
        members.sort();

        for k in &merged {
            if let Some(e) = cx.registry.get_mut(k) {
                for (_, m) in &members {
                    e.add_fighter(m);
                }
            }
        }

        info!(
            player = %name,
            enemy = %key,
            enemies = merged.len(),
            fighters = members.len(),
            "Encounter widened"
        );
        cx.outbox.room(
            &location,
            format!("{} attacks the {}!", name, template.name),
            &[name],
        );
        format!(
            "You turn on the {} as well! ({}/{})",
            template.name, health, max_health
        )
    }

    /// Remove a fighter from every piece of combat bookkeeping.
    ///
    /// Returns false when they were not engaged.
    pub fn purge(
        &mut self,
        roster: &mut Roster,
        registry: &mut EntityRegistry,
        name: &str,
        exit: CombatExit,
    ) -> bool {
        let had_record = self.records.remove(name).is_some();
        registry.purge_fighter(name);

        let mut was_engaged = false;
        if let Some(player) = roster.get_mut(name) {
            if player.state.is_engaged() {
                was_engaged = true;
                let _ = player.transition(exit.outcome());
            }
            if player.state.is_outcome() {
                let _ = player.transition(FighterState::Idle);
            }
        }
        if had_record || was_engaged {
            debug!(player = %name, exit = ?exit, "Fighter left combat");
        }
        had_record || was_engaged
    }

    /// Engaged -> Fled on success; no change on failure
    pub fn flee(&mut self, cx: &mut Encounter<'_>, name: &str) -> String {
        let Some(player) = cx.roster.get(name) else {
            return "You are not in the world.".to_string();
        };
        if !player.is_in_combat() {
            return "You aren't fighting anything.".to_string();
        }
        let from = player.location.clone();

        if !cx.dice.chance(self.settings.flee_chance) {
            cx.outbox
                .room(&from, format!("{} tries to flee but is cut off!", name), &[name]);
            return "You try to flee, but can't get away!".to_string();
        }

        self.purge(cx.roster, cx.registry, name, CombatExit::Flee);

        let exits = cx.catalog.exits(&from);
        if exits.is_empty() {
            cx.outbox
                .room(&from, format!("{} breaks away from the fight!", name), &[name]);
            return "You break away from the fight!".to_string();
        }
        let (dir, dest) = exits[cx.dice.pick(exits.len())].clone();
        if let Some(player) = cx.roster.get_mut(name) {
            player.location = dest.clone();
        }
        info!(player = %name, from = %from, to = %dest, "Fighter fled");
        cx.outbox
            .room(&from, format!("{} flees {}!", name, dir), &[name]);
        cx.outbox
            .room(&dest, format!("{} arrives, out of breath.", name), &[name]);
        format!("You flee {}!", dir)
    }

    /// Purge records of players no longer online. Returns how many were dropped.
    pub fn drop_offline(&mut self, roster: &mut Roster, registry: &mut EntityRegistry) -> usize {
        let gone: Vec<String> = self
            .records
            .keys()
            .filter(|name| !roster.contains(name))
            .cloned()
            .collect();
        for name in &gone {
            self.purge(roster, registry, name, CombatExit::Disconnect);
        }
        gone.len()
    }

    /// Current combat groups, members in join order
    pub fn groups(&self) -> Vec<(GroupKey, Vec<String>)> {
        let mut by_key: BTreeMap<GroupKey, Vec<(u64, String)>> = BTreeMap::new();
        for (name, rec) in &self.records {
            by_key
                .entry((rec.location.clone(), rec.enemies.clone()))
                .or_default()
                .push((rec.join_seq, name.clone()));
        }
        by_key
            .into_iter()
            .map(|(key, mut members)| {
                members.sort();
                (key, members.into_iter().map(|(_, n)| n).collect())
            })
            .collect()
    }

    /// Resolve one round for every group, if this is a combat tick
    pub fn on_tick(&mut self, cx: &mut Encounter<'_>) -> RoundReport {
        let mut report = RoundReport::default();
        if !self.is_combat_tick(cx.tick) {
            return report;
        }
        for (key, members) in self.groups() {
            if let Some(r) = self.process_group(cx, key, members) {
                report.merge(r);
            }
        }
        report
    }

    /// Resolve the group containing `name` for the current tick.
    ///
    /// A second trigger for the same group within one tick does nothing.
    #[cfg(test)]
    pub fn resolve_for(&mut self, cx: &mut Encounter<'_>, name: &str) -> Option<RoundReport> {
        if !self.is_combat_tick(cx.tick) {
            return None;
        }
        let rec = self.records.get(name)?;
        let key: GroupKey = (rec.location.clone(), rec.enemies.clone());
        let members = self
            .groups()
            .into_iter()
            .find(|(k, _)| *k == key)
            .map(|(_, m)| m)?;
        self.process_group(cx, key, members)
    }

    fn process_group(
        &mut self,
        cx: &mut Encounter<'_>,
        key: GroupKey,
        members: Vec<String>,
    ) -> Option<RoundReport> {
        if self.processed_tick != Some(cx.tick) {
            self.processed.clear();
            self.processed_tick = Some(cx.tick);
        }
        if members.iter().any(|m| self.processed.contains(m)) {
            return None;
        }
        let canonical = members.iter().min().cloned().unwrap_or_default();
        self.processed.extend(members.iter().cloned());

        debug!(tick = cx.tick, group = %canonical, size = members.len(), "Resolving round");
        Some(self.resolve_round(cx, key, members))
    }

    fn resolve_round(
        &mut self,
        cx: &mut Encounter<'_>,
        (location, enemies): GroupKey,
        members: Vec<String>,
    ) -> RoundReport {
        let mut report = RoundReport {
            groups_resolved: 1,
            ..RoundReport::default()
        };
        let catalog = cx.catalog;

        // Members that went away without a purge are dropped here
        let mut fighters = Vec::with_capacity(members.len());
        for name in members {
            let live = cx.roster.get(&name).is_some_and(|p| {
                p.is_in_combat() && p.location == location && p.health > 0
            });
            if live {
                fighters.push(name);
            } else {
                warn!(player = %name, "Dropping stale combat record");
                self.purge(cx.roster, cx.registry, &name, CombatExit::Disconnect);
            }
        }
        if fighters.is_empty() {
            return report;
        }

        // 1. fighters strike
        for name in &fighters {
            let alive: Vec<&EnemyKey> = enemies.iter().filter(|k| cx.registry.is_alive(k)).collect();
            if alive.is_empty() {
                break;
            }
            let target = alive[cx.dice.pick(alive.len())].clone();
            let Some(strength) = cx.roster.get(name).map(|p| p.strength) else {
                continue;
            };
            let dmg = player_damage(strength, &mut *cx.dice);
            let Some(out) = cx.registry.apply_damage(&target, dmg) else {
                continue;
            };
            let enemy_name = match cx.registry.get_mut(&target) {
                Some(enemy) => {
                    enemy.record_contribution(name, out.dealt);
                    enemy.name.clone()
                }
                None => continue,
            };
            trace!(player = %name, enemy = %target, dealt = out.dealt, remaining = out.remaining, "Hit");
            cx.outbox.tell(
                name,
                format!("You hit the {} for {} damage.", enemy_name, out.dealt),
            );
            cx.outbox.room(
                &location,
                format!("{} hits the {}.", name, enemy_name),
                &[name.as_str()],
            );
        }

        // 2. deaths, before anyone strikes back
        for key in &enemies {
            if cx.registry.get(key).is_some_and(|e| e.is_dead())
                && self.resolve_enemy_death(cx, key, &fighters)
            {
                report.enemies_killed.push(key.clone());
            }
        }

        // 3. counter-attacks
        for key in &enemies {
            let targets: Vec<String> = fighters
                .iter()
                .filter(|f| self.records.contains_key(*f))
                .filter(|f| cx.roster.get(f).is_some_and(|p| p.health > 0))
                .cloned()
                .collect();
            if targets.is_empty() {
                break;
            }
            let Some(enemy) = cx.registry.get(key).filter(|e| !e.is_dead()) else {
                continue;
            };
            let Some(template) = catalog.enemy(&key.template) else {
                continue;
            };
            let enemy_name = enemy.name.clone();
            let victim = match enemy.top_contributor(&targets) {
                Some(top) => top.to_string(),
                None => targets[cx.dice.pick(targets.len())].clone(),
            };

            let Some(attack) = template.attacks.get(cx.dice.pick(template.attacks.len())) else {
                continue;
            };
            if !cx.dice.chance(attack.accuracy) {
                cx.outbox.tell(
                    &victim,
                    format!("The {}'s {} misses you.", enemy_name, attack.name),
                );
                continue;
            }
            let roll = cx.dice.roll(attack.damage.0, attack.damage.1);
            let Some(player) = cx.roster.get_mut(&victim) else {
                continue;
            };
            let dmg = enemy_damage(roll, player.defense);
            let health = player.take_damage(dmg);
            let max_health = player.max_health;
            cx.outbox.tell(
                &victim,
                format!(
                    "The {}'s {} hits you for {} damage. ({}/{})",
                    enemy_name, attack.name, dmg, health, max_health
                ),
            );
            if health <= 0 {
                self.defeat(cx, &victim, &enemy_name);
                report.players_defeated.push(victim);
            }
        }

        // 4. victory
        if !enemies.iter().any(|k| cx.registry.is_alive(k)) {
            for name in &fighters {
                if !self.records.contains_key(name) {
                    continue;
                }
                self.purge(cx.roster, cx.registry, name, CombatExit::Victory);
                cx.outbox.tell(name, "You are victorious!");
            }
        }

        report
    }

    /// Resolve an enemy death exactly once. Returns false if already resolved.
    fn resolve_enemy_death(&mut self, cx: &mut Encounter<'_>, key: &EnemyKey, fighters: &[String]) -> bool {
        let Some(enemy) = cx.registry.remove(key) else {
            return false;
        };
        let catalog = cx.catalog;
        let location = key.location();

        // Rewards go to the group members still standing
        let eligible: Vec<String> = fighters
            .iter()
            .filter(|f| self.records.contains_key(*f))
            .cloned()
            .collect();

        info!(enemy = %key, fighters = eligible.len(), tick = cx.tick, "Enemy defeated");
        cx.outbox
            .room(&location, format!("The {} dies!", enemy.name), &[]);

        for name in &eligible {
            cx.quests.record_kill(name, key);
        }

        match catalog.enemy(&key.template) {
            Some(template) => {
                for reward in super::rewards::distribute(cx, template, &eligible) {
                    debug!(
                        player = %reward.name,
                        gold = reward.gold,
                        xp = reward.experience,
                        drops = ?reward.drops,
                        "Reward paid"
                    );
                    if let Some(level) = reward.new_levels.last() {
                        info!(player = %reward.name, level, "Level up");
                    }
                }
                if template.respawn_ms > 0 {
                    cx.registry.mark_respawning(key.clone());
                    cx.respawns
                        .schedule(LocationKey::enemy(key), template.respawn_ms, cx.tick);
                }
            }
            None => warn!(enemy = %key, "Defeated enemy has no template"),
        }

        for rec in self.records.values_mut() {
            rec.enemies.retain(|k| k != key);
        }
        true
    }
}


#[cfg(test)]
mod tests {
    use super::testing::Arena;
    use super::*;
    use crate::game::dice::testing::ScriptedDice;
    use crate::game::dice::SeededDice;

    #[test]
    fn damage_formulas_floor_at_one() {
        let mut dice = ScriptedDice::fixed(-2, true);
        assert_eq!(player_damage(0, &mut dice), 1);
        assert_eq!(player_damage(10, &mut dice), 8);
        assert_eq!(enemy_damage(3, 10), 1);
        assert_eq!(enemy_damage(9, 2), 7);
    }

    #[test]
    fn attack_registers_without_dealing_damage() {
        let mut arena = Arena::scripted();
        arena.join("amy", 10);
        let mut engine = CombatEngine::new(CombatSettings::default());

        let msg = engine.start_combat(&mut arena.cx(), "amy", "wolf");
        assert!(msg.starts_with("You attack the grey wolf!"), "{msg}");
        assert!(arena.roster.get("amy").unwrap().is_in_combat());
        assert_eq!(arena.registry.get(&Arena::wolf()).unwrap().current_health, 30);

        let again = engine.start_combat(&mut arena.cx(), "amy", "wolf");
        assert_eq!(again, "You are already fighting the grey wolf!");
    }

    #[test]
    fn widened_encounter_targets_and_resolves_each_enemy() {
        let mut dice = ScriptedDice::fixed(0, true);
        dice.picks.extend([1, 0]);
        let mut arena = Arena::new(dice);
        arena.join("amy", 10);
        arena.join("bob", 10);
        let mut engine = CombatEngine::new(CombatSettings::default());
        engine.start_combat(&mut arena.cx(), "amy", "wolf");
        engine.start_combat(&mut arena.cx(), "bob", "wolf");

        let msg = engine.start_combat(&mut arena.cx(), "amy", "rat");
        assert_eq!(msg, "You turn on the rat as well! (5/5)");
        let rat = EnemyKey::new(&Arena::clearing(), "rat");
        let both = vec!["amy".to_string(), "bob".to_string()];
        let groups = engine.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0 .1, vec![rat.clone(), Arena::wolf()]);
        assert_eq!(groups[0].1, both);
        assert_eq!(arena.registry.get(&rat).unwrap().fighters, both);

        // amy's pick lands on the wolf, bob's on the rat
        let report = engine.on_tick(&mut arena.cx());
        assert_eq!(report.enemies_killed, vec![rat.clone()]);
        assert!(arena.registry.get(&rat).is_none());
        assert_eq!(arena.registry.get(&Arena::wolf()).unwrap().current_health, 20);
        assert_eq!(engine.enemies_of("amy"), Some(&[Arena::wolf()][..]));
        assert_eq!(engine.enemies_of("bob"), engine.enemies_of("amy"));

        // only amy has hurt the wolf
        assert_eq!(arena.roster.get("amy").unwrap().health, 99);
        assert_eq!(arena.roster.get("bob").unwrap().health, 100);
        assert_eq!(arena.roster.get("amy").unwrap().experience, 1);
        assert_eq!(arena.roster.get("bob").unwrap().experience, 1);
        assert!(arena.roster.get("amy").unwrap().is_in_combat());
    }

    #[test]
    fn widening_into_another_group_merges_them() {
        let mut arena = Arena::scripted();
        arena.join("amy", 10);
        arena.join("bob", 10);
        let mut engine = CombatEngine::new(CombatSettings::default());
        engine.start_combat(&mut arena.cx(), "amy", "wolf");
        arena.tick = 1;
        engine.start_combat(&mut arena.cx(), "bob", "rat");
        assert_eq!(engine.groups().len(), 2);

        let msg = engine.start_combat(&mut arena.cx(), "bob", "wolf");
        assert!(msg.starts_with("You turn on the grey wolf as well!"), "{msg}");
        assert_eq!(engine.groups().len(), 1);
        assert_eq!(engine.enemies_of("amy"), engine.enemies_of("bob"));
        assert_eq!(engine.started_tick("bob"), Some(1));
        assert_eq!(
            engine.start_combat(&mut arena.cx(), "amy", "rat"),
            "You are already fighting the rat!"
        );
    }

    #[test]
    fn missing_target_is_narrative() {
        let mut arena = Arena::scripted();
        arena.join("amy", 10);
        let mut engine = CombatEngine::new(CombatSettings::default());
        assert_eq!(
            engine.start_combat(&mut arena.cx(), "amy", "dragon"),
            "You don't see that here."
        );
        assert!(!arena.roster.get("amy").unwrap().is_in_combat());
        assert_eq!(
            engine.start_combat(&mut arena.cx(), "ghost", "wolf"),
            "You are not in the world."
        );
    }

    #[test]
    fn second_attacker_joins_existing_group() {
        let mut arena = Arena::scripted();
        arena.join("amy", 10);
        arena.join("bob", 10);
        let mut engine = CombatEngine::new(CombatSettings::default());

        engine.start_combat(&mut arena.cx(), "amy", "wolf");
        arena.tick = 4;
        let msg = engine.start_combat(&mut arena.cx(), "bob", "wolf");
        assert!(msg.starts_with("You join amy"), "{msg}");

        assert_eq!(engine.groups().len(), 1);
        assert_eq!(engine.started_tick("bob"), engine.started_tick("amy"));
        assert_eq!(engine.enemies_of("bob"), engine.enemies_of("amy"));
        assert_eq!(
            arena.registry.get(&Arena::wolf()).unwrap().fighters,
            vec!["amy".to_string(), "bob".to_string()]
        );
    }

    #[test]
    fn seeded_wolf_dies_in_three_rounds_and_pays_in_full() {
        // strength 10 with zero variance: 10 damage per round against 30 health
        let mut arena = Arena::scripted();
        arena.join("amy", 10);
        let mut engine = CombatEngine::new(CombatSettings::default());
        engine.start_combat(&mut arena.cx(), "amy", "wolf");

        let mut rounds = 0;
        let mut killed = Vec::new();
        for tick in [3u64, 6, 9, 12] {
            arena.tick = tick;
            let report = engine.on_tick(&mut arena.cx());
            if report.groups_resolved > 0 {
                rounds += 1;
            }
            killed.extend(report.enemies_killed);
            if !killed.is_empty() {
                break;
            }
        }

        assert_eq!(rounds, 3);
        assert_eq!(killed, vec![Arena::wolf()]);
        let amy = arena.roster.get("amy").unwrap();
        assert_eq!(amy.experience, 20);
        assert_eq!(amy.gold, 10);
        assert!(!amy.is_in_combat());
        // bite [3,3] - defense 2 = 1 per round, two counter-attacks before the kill
        assert_eq!(amy.health, amy.max_health - 2);
        assert!(arena.registry.get(&Arena::wolf()).is_none());
        assert!(arena.registry.is_respawning(&Arena::wolf()));
        assert_eq!(arena.respawns.pending(), 1);
        assert_eq!(
            arena.quests.kills.lock().clone(),
            vec![("amy".to_string(), "wolf".to_string())]
        );
        assert!(arena.outbox.private_for("amy").contains(&"You are victorious!"));
    }

    #[test]
    fn non_combat_ticks_do_nothing() {
        let mut arena = Arena::scripted();
        arena.join("amy", 10);
        let mut engine = CombatEngine::new(CombatSettings::default());
        engine.start_combat(&mut arena.cx(), "amy", "wolf");
        for tick in [1u64, 2, 4, 5] {
            arena.tick = tick;
            assert_eq!(engine.on_tick(&mut arena.cx()).groups_resolved, 0);
        }
        assert_eq!(arena.registry.get(&Arena::wolf()).unwrap().current_health, 30);
    }

    #[test]
    fn group_resolves_once_per_tick_across_triggers() {
        let mut arena = Arena::scripted();
        arena.join("amy", 10);
        arena.join("bob", 10);
        let mut engine = CombatEngine::new(CombatSettings::default());
        engine.start_combat(&mut arena.cx(), "amy", "wolf");
        engine.start_combat(&mut arena.cx(), "bob", "wolf");

        arena.tick = 3;
        assert!(engine.resolve_for(&mut arena.cx(), "bob").is_some());
        assert!(engine.resolve_for(&mut arena.cx(), "amy").is_none());
        assert_eq!(engine.on_tick(&mut arena.cx()).groups_resolved, 0);
        // two hits of 10 exactly once
        assert_eq!(arena.registry.get(&Arena::wolf()).unwrap().current_health, 10);

        arena.tick = 6;
        assert_eq!(engine.on_tick(&mut arena.cx()).groups_resolved, 1);
        assert!(engine.resolve_for(&mut arena.cx(), "amy").is_none());
    }

    #[test]
    fn late_joiner_waits_for_next_tick() {
        let mut arena = Arena::scripted();
        arena.join("amy", 10);
        arena.join("bob", 10);
        let mut engine = CombatEngine::new(CombatSettings::default());
        engine.start_combat(&mut arena.cx(), "amy", "wolf");
        arena.tick = 3;
        engine.on_tick(&mut arena.cx());
        engine.start_combat(&mut arena.cx(), "bob", "wolf");
        assert!(engine.resolve_for(&mut arena.cx(), "bob").is_none());
        assert_eq!(arena.registry.get(&Arena::wolf()).unwrap().current_health, 20);
    }

    #[test]
    fn counter_attack_targets_top_contributor() {
        let mut arena = Arena::scripted();
        arena.join("amy", 5);
        arena.join("bob", 12);
        let mut engine = CombatEngine::new(CombatSettings::default());
        engine.start_combat(&mut arena.cx(), "amy", "wolf");
        engine.start_combat(&mut arena.cx(), "bob", "wolf");
        engine.on_tick(&mut arena.cx());

        let amy = arena.roster.get("amy").unwrap();
        let bob = arena.roster.get("bob").unwrap();
        assert_eq!(amy.health, amy.max_health);
        assert_eq!(bob.health, bob.max_health - 1);
    }

    #[test]
    fn missed_attack_deals_nothing() {
        let mut arena = Arena::new(ScriptedDice::fixed(0, false));
        arena.join("amy", 10);
        let mut engine = CombatEngine::new(CombatSettings::default());
        engine.start_combat(&mut arena.cx(), "amy", "wolf");
        engine.on_tick(&mut arena.cx());
        let amy = arena.roster.get("amy").unwrap();
        assert_eq!(amy.health, amy.max_health);
        assert!(arena
            .outbox
            .private_for("amy")
            .iter()
            .any(|t| t.contains("misses you")));
    }

    #[test]
    fn successful_flee_clears_all_bookkeeping() {
        let mut arena = Arena::scripted();
        arena.join("amy", 10);
        arena.join("bob", 10);
        let mut engine = CombatEngine::new(CombatSettings::default());
        engine.start_combat(&mut arena.cx(), "amy", "wolf");
        engine.start_combat(&mut arena.cx(), "bob", "wolf");
        engine.on_tick(&mut arena.cx());
        assert!(arena
            .registry
            .get(&Arena::wolf())
            .unwrap()
            .contributor_damage
            .contains_key("amy"));

        let msg = engine.flee(&mut arena.cx(), "amy");
        assert_eq!(msg, "You flee south!");

        let wolf = arena.registry.get(&Arena::wolf()).unwrap();
        assert!(!wolf.contributor_damage.contains_key("amy"));
        assert!(!wolf.fighters.contains(&"amy".to_string()));
        let amy = arena.roster.get("amy").unwrap();
        assert!(!amy.is_in_combat());
        assert_eq!(amy.state, FighterState::Idle);
        assert_eq!(amy.location, Location::new("forest", "path"));
        assert!(!engine.has_record("amy"));
        assert!(engine.has_record("bob"));
    }

    #[test]
    fn failed_flee_changes_nothing() {
        let mut arena = Arena::new(ScriptedDice::fixed(0, false));
        arena.join("amy", 10);
        let mut engine = CombatEngine::new(CombatSettings::default());
        engine.start_combat(&mut arena.cx(), "amy", "wolf");
        assert_eq!(
            engine.flee(&mut arena.cx(), "amy"),
            "You try to flee, but can't get away!"
        );
        assert!(arena.roster.get("amy").unwrap().is_in_combat());
        assert!(engine.has_record("amy"));
        assert_eq!(engine.flee(&mut arena.cx(), "bob"), "You are not in the world.");
    }

    #[test]
    fn flee_rate_matches_configured_chance() {
        let mut arena = Arena::new(SeededDice::new(20240611));
        arena.join("amy", 10);
        let mut engine = CombatEngine::new(CombatSettings {
            combat_every_ticks: 3,
            flee_chance: 0.5,
        });

        let trials = 10_000;
        let mut escaped = 0;
        for _ in 0..trials {
            if !arena.roster.get("amy").unwrap().is_in_combat() {
                arena.roster.get_mut("amy").unwrap().location = Arena::clearing();
                engine.start_combat(&mut arena.cx(), "amy", "wolf");
            }
            if engine.flee(&mut arena.cx(), "amy").starts_with("You flee") {
                escaped += 1;
            }
        }
        let rate = escaped as f64 / trials as f64;
        assert!((rate - 0.5).abs() <= 0.02, "flee rate {rate}");
    }

    #[test]
    fn disconnect_purges_without_relocation() {
        let mut arena = Arena::scripted();
        arena.join("amy", 10);
        let mut engine = CombatEngine::new(CombatSettings::default());
        engine.start_combat(&mut arena.cx(), "amy", "wolf");
        engine.on_tick(&mut arena.cx());

        assert!(engine.purge(&mut arena.roster, &mut arena.registry, "amy", CombatExit::Disconnect));
        assert!(!engine.purge(&mut arena.roster, &mut arena.registry, "amy", CombatExit::Disconnect));
        let amy = arena.roster.get("amy").unwrap();
        assert_eq!(amy.location, Arena::clearing());
        assert!(!amy.is_in_combat());
        assert!(arena
            .registry
            .get(&Arena::wolf())
            .unwrap()
            .contributor_damage
            .is_empty());
    }

    #[test]
    fn stale_record_is_dropped_at_resolution() {
        let mut arena = Arena::scripted();
        arena.join("amy", 10);
        let mut engine = CombatEngine::new(CombatSettings::default());
        engine.start_combat(&mut arena.cx(), "amy", "wolf");
        arena.roster.remove("amy");

        let report = engine.on_tick(&mut arena.cx());
        assert_eq!(report.groups_resolved, 1);
        assert!(!engine.has_record("amy"));
        assert_eq!(arena.registry.get(&Arena::wolf()).unwrap().current_health, 30);
    }

    #[test]
    fn dead_enemy_cannot_be_attacked_until_respawn() {
        let mut arena = Arena::scripted();
        arena.join("amy", 40);
        arena.join("bob", 10);
        let mut engine = CombatEngine::new(CombatSettings::default());
        engine.start_combat(&mut arena.cx(), "amy", "wolf");
        engine.on_tick(&mut arena.cx());

        assert_eq!(
            engine.start_combat(&mut arena.cx(), "bob", "wolf"),
            "The grey wolf is already dead."
        );

        let catalog = arena.catalog.clone();
        arena.respawns.on_tick(3 + 30, &mut arena.registry, &catalog);
        assert!(engine
            .start_combat(&mut arena.cx(), "bob", "wolf")
            .starts_with("You attack"));
    }

    #[test]
    fn zero_respawn_enemy_is_immediately_available() {
        let mut arena = Arena::scripted();
        arena.join("amy", 10);
        let mut engine = CombatEngine::new(CombatSettings::default());
        engine.start_combat(&mut arena.cx(), "amy", "rat");
        let report = engine.on_tick(&mut arena.cx());
        assert_eq!(report.enemies_killed.len(), 1);
        assert_eq!(arena.respawns.pending(), 0);
        assert!(engine
            .start_combat(&mut arena.cx(), "amy", "rat")
            .starts_with("You attack the rat!"));
    }
}
