//! Collaborators the engine calls out to: quests, persistence, delivery

use tracing::debug;

use crate::store::StoreError;

use super::player::Player;
use super::registry::EnemyKey;

/// Kill notifications for quest progress
pub trait QuestLog: Send {
    fn record_kill(&mut self, player: &str, enemy: &EnemyKey);
}

/// Default quest hook: only logs
#[derive(Debug, Default)]
pub struct TracingQuestLog;

impl QuestLog for TracingQuestLog {
    fn record_kill(&mut self, player: &str, enemy: &EnemyKey) {
        debug!(player = %player, enemy = %enemy, "Kill recorded");
    }
}

/// Hands player snapshots to persistence. Must not block on I/O.
pub trait PlayerSink: Send {
    fn save(&self, player: &Player) -> Result<(), StoreError>;
}

/// Delivers text to one online player
pub trait Notifier: Send + Sync {
    fn deliver(&self, to: &str, text: &str);
}
