//! The world: every game service, owned in one place
//!
//! Connections and tick handlers reach the world through a single
//! `Arc<Mutex<World>>`. Each call locks it, runs to completion, flushes its
//! messages through the [`Notifier`] and releases the lock.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::catalog::{Catalog, Location};
use super::combat::{CombatEngine, CombatSettings, Encounter};
use super::commands::{Command, HELP_TEXT};
use super::dice::Dice;
use super::fighter::{CombatExit, FighterState};
use super::hooks::{Notifier, PlayerSink, QuestLog};
use super::outbox::Outbox;
use super::player::{Player, Roster};
use super::registry::{EnemyKey, EntityRegistry};
use super::respawn::{LocationKey, RespawnKind, RespawnScheduler};
use super::snapshot::{status_text, EnemyView, WorldSnapshot};

pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 16;

/// Tick cadence of the world's subsystems
#[derive(Debug, Clone)]
pub struct WorldSettings {
    pub tick_interval_ms: u64,
    pub combat: CombatSettings,
    pub regen_every_ticks: u64,
    pub cleanup_every_ticks: u64,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            combat: CombatSettings::default(),
            regen_every_ticks: 5,
            cleanup_every_ticks: 60,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WorldError {
    #[error("{0} is already online")]
    AlreadyOnline(String),

    #[error("names must be 2-16 letters, digits or underscores, starting with a letter")]
    InvalidName,
}

/// Check a player name, returning its canonical form
pub fn normalize_name(raw: &str) -> Result<String, WorldError> {
    let name = raw.trim();
    let ok = (NAME_MIN_LEN..=NAME_MAX_LEN).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    if !ok {
        return Err(WorldError::InvalidName);
    }
    let mut chars = name.chars();
    let first = chars.next().map(|c| c.to_ascii_uppercase());
    Ok(first
        .into_iter()
        .chain(chars.map(|c| c.to_ascii_lowercase()))
        .collect())
}

/// Health regained per regen tick out of combat
pub fn regen_amount(max_health: i32) -> i32 {
    (max_health / 20).max(1)
}

pub struct World {
    settings: WorldSettings,
    catalog: Catalog,
    tick: u64,
    roster: Roster,
    registry: EntityRegistry,
    respawns: RespawnScheduler,
    combat: CombatEngine,
    dice: Box<dyn Dice>,
    quests: Box<dyn QuestLog>,
    store: Box<dyn PlayerSink>,
    notifier: Arc<dyn Notifier>,
    outbox: Outbox,
}

impl World {
    pub fn new(
        catalog: Catalog,
        settings: WorldSettings,
        dice: Box<dyn Dice>,
        quests: Box<dyn QuestLog>,
        store: Box<dyn PlayerSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            respawns: RespawnScheduler::new(settings.tick_interval_ms),
            combat: CombatEngine::new(settings.combat.clone()),
            settings,
            catalog,
            tick: 0,
            roster: Roster::new(),
            registry: EntityRegistry::new(),
            dice,
            quests,
            store,
            notifier,
            outbox: Outbox::new(),
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn player(&self, name: &str) -> Option<&Player> {
        self.roster.get(name)
    }

    pub fn is_online(&self, name: &str) -> bool {
        self.roster.contains(name)
    }

    /// A fresh character at the default spawn
    pub fn new_player(&self, name: &str) -> Player {
        Player::new(name, self.catalog.default_spawn.clone())
    }

    /// Put a player into the world. The name must not already be online.
    pub fn login(&mut self, mut player: Player) -> Result<(), WorldError> {
        if self.roster.contains(&player.name) {
            return Err(WorldError::AlreadyOnline(player.name));
        }
        if self.catalog.room(&player.location).is_none() {
            warn!(player = %player.name, location = %player.location, "Saved room no longer exists");
            player.location = self.catalog.default_spawn.clone();
        }
        player.state = FighterState::Idle;
        player.health = player.health.clamp(1, player.max_health.max(1));

        let name = player.name.clone();
        let location = player.location.clone();
        self.roster.insert(player);
        info!(player = %name, location = %location, online = self.roster.len(), "Player logged in");

        self.outbox
            .tell(&name, format!("Welcome to the world, {}.", name));
        let view = self.describe_room(&name);
        self.outbox.tell(&name, view);
        self.outbox
            .room(&location, format!("{} has arrived.", name), &[name.as_str()]);
        self.flush();
        Ok(())
    }

    /// Take a player out of the world, leaving any fight. Returns false if they were not online.
    pub fn logout(&mut self, name: &str) -> bool {
        if !self.roster.contains(name) {
            return false;
        }
        self.remove_player_from_combat(name, CombatExit::Disconnect);
        let Some(player) = self.roster.remove(name) else {
            return false;
        };
        if let Err(e) = self.store.save(&player) {
            warn!(player = %name, error = %e, "Failed to queue save on logout");
        }
        info!(player = %name, online = self.roster.len(), "Player logged out");
        self.outbox
            .room(&player.location, format!("{} has left.", name), &[]);
        self.flush();
        true
    }

    pub fn is_player_in_combat(&self, name: &str) -> bool {
        self.roster.get(name).is_some_and(|p| p.is_in_combat())
    }

    /// Purge a player from all combat bookkeeping
    pub fn remove_player_from_combat(&mut self, name: &str, exit: CombatExit) -> bool {
        self.combat
            .purge(&mut self.roster, &mut self.registry, name, exit)
    }

    /// Attack an enemy in the player's room
    pub fn start_combat(&mut self, name: &str, target: &str) -> String {
        let (combat, mut cx) = self.encounter();
        combat.start_combat(&mut cx, name, target)
    }

    /// Run one line of player input and deliver the reply
    pub fn handle_command(&mut self, name: &str, line: &str) {
        if !self.roster.contains(name) {
            return;
        }
        let Some(cmd) = Command::parse(line) else {
            return;
        };
        debug!(player = %name, command = ?cmd, "Command");
        let reply = self.execute(name, cmd);
        if !reply.is_empty() {
            self.outbox.tell(name, reply);
        }
        self.flush();
    }

    fn execute(&mut self, name: &str, cmd: Command) -> String {
        if cmd.needs_idle() && self.is_player_in_combat(name) {
            return "You are fighting for your life! Try to flee first.".to_string();
        }
        match cmd {
            Command::Attack(target) => self.start_combat(name, &target),
            Command::Flee => {
                let (combat, mut cx) = self.encounter();
                combat.flee(&mut cx, name)
            }
            Command::Look => self.describe_room(name),
            Command::Go(dir) => {
                if dir.is_empty() {
                    return "Go where?".to_string();
                }
                self.walk(name, &dir)
                    .unwrap_or_else(|| "You can't go that way.".to_string())
            }
            Command::Bare(word) => {
                let is_exit = self
                    .roster
                    .get(name)
                    .and_then(|p| self.catalog.exit(&p.location, &word))
                    .is_some();
                if !is_exit {
                    return "Huh? Type 'help' for a list of commands.".to_string();
                }
                if self.is_player_in_combat(name) {
                    return "You are fighting for your life! Try to flee first.".to_string();
                }
                self.walk(name, &word)
                    .unwrap_or_else(|| "You can't go that way.".to_string())
            }
            Command::Take(token) => self.take(name, &token),
            Command::Bind => self.bind(name),
            Command::Status => self.roster.get(name).map(status_text).unwrap_or_default(),
            Command::Inventory => self.inventory_text(name),
            Command::Help => HELP_TEXT.to_string(),
            Command::Unknown(_) => "Huh? Type 'help' for a list of commands.".to_string(),
        }
    }

    fn walk(&mut self, name: &str, dir: &str) -> Option<String> {
        let from = self.roster.get(name)?.location.clone();
        let wanted = dir.trim().to_ascii_lowercase();
        let (dir_name, to) = self
            .catalog
            .exits(&from)
            .into_iter()
            .find(|(d, _)| *d == wanted || (!wanted.is_empty() && d.starts_with(&wanted)))?;

        self.roster.get_mut(name)?.location = to.clone();
        debug!(player = %name, from = %from, to = %to, "Player moved");
        self.outbox
            .room(&from, format!("{} leaves {}.", name, dir_name), &[name]);
        self.outbox
            .room(&to, format!("{} arrives.", name), &[name]);
        Some(self.describe_room(name))
    }

    fn take(&mut self, name: &str, token: &str) -> String {
        if token.is_empty() {
            return "Take what?".to_string();
        }
        let Some(location) = self.roster.get(name).map(|p| p.location.clone()) else {
            return String::new();
        };
        let Some(item) = self.catalog.find_item_in_room(&location, token) else {
            return "You don't see that here.".to_string();
        };
        let key = LocationKey::item(&location, item.id.clone());
        if !self.respawns.is_item_available(&key) {
            return "You don't see that here.".to_string();
        }
        let (item_id, item_name, respawn_ms) = (item.id.clone(), item.name.clone(), item.respawn_ms);

        self.respawns.schedule(key, respawn_ms, self.tick);
        let Some(player) = self.roster.get_mut(name) else {
            return String::new();
        };
        player.add_item(&item_id, 1);
        if let Err(e) = self.store.save(player) {
            warn!(player = %name, error = %e, "Failed to queue save after take");
        }
        self.outbox
            .room(&location, format!("{} picks up {}.", name, item_name), &[name]);
        format!("You take {}.", item_name)
    }

    fn bind(&mut self, name: &str) -> String {
        let Some(player) = self.roster.get_mut(name) else {
            return String::new();
        };
        player.recall = Some(player.location.clone());
        if let Err(e) = self.store.save(player) {
            warn!(player = %name, error = %e, "Failed to queue save after bind");
        }
        "You will return here when you fall in battle.".to_string()
    }

    fn inventory_text(&self, name: &str) -> String {
        let Some(player) = self.roster.get(name) else {
            return String::new();
        };
        if player.inventory.is_empty() {
            return format!("You carry nothing. Gold: {}", player.gold);
        }
        let mut lines = vec!["You carry:".to_string()];
        for (id, count) in &player.inventory {
            let item_name = self.catalog.item(id).map_or(id.as_str(), |t| t.name.as_str());
            lines.push(format!("  {} x{}", item_name, count));
        }
        lines.push(format!("Gold: {}", player.gold));
        lines.join("\n")
    }

    /// Room description as seen by `name`
    pub fn describe_room(&self, name: &str) -> String {
        let Some(player) = self.roster.get(name) else {
            return String::new();
        };
        let loc = &player.location;
        let Some(room) = self.catalog.room(loc) else {
            return "You are nowhere.".to_string();
        };

        let mut lines = vec![room.name.clone()];
        if !room.description.is_empty() {
            lines.push(room.description.clone());
        }

        for id in &room.enemies {
            let key = EnemyKey::new(loc, id.clone());
            if self.registry.is_respawning(&key) {
                continue;
            }
            let Some(template) = self.catalog.enemy(id) else {
                continue;
            };
            match self.registry.get(&key).map(EnemyView::from) {
                Some(view) if !view.fighters.is_empty() => lines.push(format!(
                    "The {} is here, {}, fighting {}.",
                    view.name,
                    view.condition(),
                    view.fighters.join(", ")
                )),
                Some(view) => lines.push(format!("The {} is here, {}.", view.name, view.condition())),
                None => lines.push(format!("The {} is here.", template.name)),
            }
        }

        for id in &room.items {
            let key = LocationKey::item(loc, id.clone());
            if !self.respawns.is_item_available(&key) {
                continue;
            }
            if let Some(item) = self.catalog.item(id) {
                lines.push(format!("You see {} here.", item.name));
            }
        }

        let others: Vec<String> = self
            .roster
            .occupants(loc)
            .into_iter()
            .filter(|n| n != name)
            .collect();
        if !others.is_empty() {
            lines.push(format!("Also here: {}.", others.join(", ")));
        }

        let exits: Vec<String> = room.exits.keys().cloned().collect();
        if exits.is_empty() {
            lines.push("There are no obvious exits.".to_string());
        } else {
            lines.push(format!("Exits: {}", exits.join(", ")));
        }
        lines.join("\n")
    }

    /// Fire due respawn tickets
    pub fn respawn_tick(&mut self, tick: u64) {
        self.advance(tick);
        let fired = self
            .respawns
            .on_tick(tick, &mut self.registry, &self.catalog);
        for ticket in fired {
            let loc = Location::new(ticket.key.area.clone(), ticket.key.room.clone());
            let text = match ticket.key.kind {
                RespawnKind::Enemy => self
                    .catalog
                    .enemy(&ticket.key.id)
                    .map(|t| format!("A {} appears.", t.name)),
                RespawnKind::Item => None,
            };
            if let Some(text) = text {
                self.outbox.room(&loc, text, &[]);
            }
        }
        self.flush();
    }

    /// Resolve a combat round for every group, on combat ticks
    pub fn combat_tick(&mut self, tick: u64) {
        self.advance(tick);
        let report = {
            let (combat, mut cx) = self.encounter();
            combat.on_tick(&mut cx)
        };
        if report.groups_resolved > 0 {
            debug!(
                tick,
                groups = report.groups_resolved,
                kills = report.enemies_killed.len(),
                defeats = report.players_defeated.len(),
                "Combat round complete"
            );
        }
        self.flush();
    }

    /// Heal everyone out of combat, on regen ticks
    pub fn regen_tick(&mut self, tick: u64) {
        self.advance(tick);
        let every = self.settings.regen_every_ticks.max(1);
        if tick % every != 0 {
            return;
        }
        for p in self.roster.iter_mut() {
            if p.is_in_combat() || p.health >= p.max_health {
                continue;
            }
            p.heal(regen_amount(p.max_health));
        }
    }

    /// Drop stale combat records and idle enemy instances, on cleanup ticks
    pub fn cleanup_tick(&mut self, tick: u64) {
        self.advance(tick);
        let every = self.settings.cleanup_every_ticks.max(1);
        if tick % every != 0 {
            return;
        }
        let dropped = self
            .combat
            .drop_offline(&mut self.roster, &mut self.registry);
        let evicted = self.registry.evict_unengaged();
        if dropped > 0 || evicted > 0 {
            info!(tick, dropped, evicted, "Cleanup pass");
        }
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            online: self.roster.len(),
            engaged: self.combat.engaged_count(),
            combat_groups: self.combat.groups().len(),
            live_enemies: self.registry.len(),
            pending_respawns: self.respawns.pending(),
        }
    }

    /// Save every online player
    pub fn save_all(&self) {
        for p in self.roster.iter() {
            if let Err(e) = self.store.save(p) {
                warn!(player = %p.name, error = %e, "Failed to queue save");
            }
        }
    }

    fn advance(&mut self, tick: u64) {
        self.tick = self.tick.max(tick);
    }

    fn encounter(&mut self) -> (&mut CombatEngine, Encounter<'_>) {
        let World {
            combat,
            catalog,
            tick,
            roster,
            registry,
            respawns,
            dice,
            quests,
            store,
            outbox,
            ..
        } = self;
        (
            combat,
            Encounter {
                tick: *tick,
                catalog,
                roster,
                registry,
                respawns,
                dice: &mut **dice,
                quests: &mut **quests,
                store: &**store,
                outbox,
            },
        )
    }

    fn flush(&mut self) {
        for (to, text) in self.outbox.resolve(&self.roster) {
            self.notifier.deliver(&to, &text);
        }
    }
}
