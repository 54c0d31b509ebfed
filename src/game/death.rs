//! Player defeat: purge, restore to a floor, send home

use tracing::{info, warn};

use super::catalog::Location;
use super::combat::{CombatEngine, Encounter};
use super::fighter::CombatExit;

/// Health a defeated player wakes up with
pub fn restored_health(max_health: i32) -> i32 {
    (max_health / 10).max(1)
}

impl CombatEngine {
    /// Handle a player brought to zero health by `killer`.
    ///
    /// The player leaves every encounter before anything else runs, so no
    /// later step of the round can target or reward them.
    pub(crate) fn defeat(&mut self, cx: &mut Encounter<'_>, name: &str, killer: &str) {
        self.purge(cx.roster, cx.registry, name, CombatExit::Defeat);

        let catalog = cx.catalog;
        let Some(player) = cx.roster.get_mut(name) else {
            return;
        };
        let fell_at = player.location.clone();
        let home: Location = player
            .recall
            .clone()
            .filter(|loc| catalog.room(loc).is_some())
            .unwrap_or_else(|| catalog.default_spawn.clone());

        player.health = restored_health(player.max_health);
        player.location = home.clone();
        let health = player.health;
        let max_health = player.max_health;

        if let Err(e) = cx.store.save(player) {
            warn!(player = %name, error = %e, "Failed to queue save after defeat");
        }

        info!(player = %name, killer = %killer, at = %fell_at, home = %home, "Player defeated");

        let room_name = catalog
            .room(&home)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| home.to_string());
        cx.outbox.tell(
            name,
            format!(
                "You have been slain by the {}! You wake in {}, battered but alive. ({}/{})",
                killer, room_name, health, max_health
            ),
        );
        cx.outbox.room(
            &fell_at,
            format!("{} has been slain by the {}!", name, killer),
            &[name],
        );
        if home != fell_at {
            cx.outbox
                .room(&home, format!("{} staggers in, barely alive.", name), &[name]);
        }
    }
}
