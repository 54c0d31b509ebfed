//! Application state shared across routes

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::game::{TickScheduler, World};
use crate::store::JsonPlayerStore;
use crate::ws::SessionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub world: Arc<Mutex<World>>,
    pub sessions: Arc<SessionRegistry>,
    pub store: JsonPlayerStore,
    pub ticks: Arc<TickScheduler>,
}

impl AppState {
    pub fn new(
        config: Config,
        world: Arc<Mutex<World>>,
        sessions: Arc<SessionRegistry>,
        store: JsonPlayerStore,
    ) -> Self {
        let ticks = Arc::new(TickScheduler::new(config.tick_interval_ms));
        Self {
            config: Arc::new(config),
            world,
            sessions,
            store,
            ticks,
        }
    }

    /// Register the world's subsystems on the scheduler: respawn, combat, regen, cleanup
    pub fn register_tick_handlers(&self) {
        let world = self.world.clone();
        self.ticks.register("respawn", move |tick| {
            world.lock().respawn_tick(tick);
            Ok(())
        });
        let world = self.world.clone();
        self.ticks.register("combat", move |tick| {
            world.lock().combat_tick(tick);
            Ok(())
        });
        let world = self.world.clone();
        self.ticks.register("regen", move |tick| {
            world.lock().regen_tick(tick);
            Ok(())
        });
        let world = self.world.clone();
        self.ticks.register("cleanup", move |tick| {
            world.lock().cleanup_tick(tick);
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::game::catalog::test_catalog;
    use crate::game::dice::testing::ScriptedDice;
    use crate::game::hooks::testing::{RecordingNotifier, RecordingQuestLog};
    use crate::game::WorldSettings;

    fn fire_until(state: &AppState, tick: u64) {
        while state.ticks.current_tick() < tick {
            state.ticks.fire();
        }
    }

    #[tokio::test]
    async fn heartbeat_drives_combat_regen_and_respawn() {
        let tmp = TempDir::new().unwrap();
        let (store, _writer) = JsonPlayerStore::spawn(tmp.path());
        let notes = RecordingNotifier::default();
        let world = World::new(
            test_catalog(),
            WorldSettings::default(),
            Box::new(ScriptedDice::fixed(0, true)),
            Box::new(RecordingQuestLog::default()),
            Box::new(store.clone()),
            Arc::new(notes.clone()),
        );
        let state = AppState::new(
            Config::default(),
            Arc::new(Mutex::new(world)),
            Arc::new(SessionRegistry::new()),
            store,
        );
        state.register_tick_handlers();
        assert_eq!(
            state.ticks.handler_names(),
            vec!["respawn", "combat", "regen", "cleanup"]
        );

        {
            let mut world = state.world.lock();
            let amy = world.new_player("Amy");
            world.login(amy).unwrap();
            world.handle_command("Amy", "north");
            world.handle_command("Amy", "attack wolf");
        }

        // three rounds of 10 damage on ticks 3, 6 and 9
        fire_until(&state, 8);
        assert!(state.world.lock().is_player_in_combat("Amy"));
        fire_until(&state, 9);
        {
            let world = state.world.lock();
            assert!(!world.is_player_in_combat("Amy"));
            let amy = world.player("Amy").unwrap();
            assert_eq!((amy.gold, amy.experience, amy.health), (10, 20, 98));
            assert_eq!(world.snapshot().pending_respawns, 1);
            assert_eq!(world.snapshot().live_enemies, 0);
        }
        let texts = notes.texts_for("Amy");
        assert!(texts.iter().any(|t| t == "The grey wolf dies!"));

        // regen resumes once the fight is over
        fire_until(&state, 10);
        assert_eq!(state.world.lock().player("Amy").unwrap().health, 100);

        // 30s respawn at 1s ticks
        fire_until(&state, 38);
        assert_eq!(state.world.lock().snapshot().pending_respawns, 1);
        fire_until(&state, 39);
        let snap = state.world.lock().snapshot();
        assert_eq!(snap.pending_respawns, 0);
        assert_eq!(snap.live_enemies, 1);
        assert_eq!(snap.tick, 39);
        assert!(notes
            .texts_for("Amy")
            .iter()
            .any(|t| t == "A grey wolf appears."));
    }
}
