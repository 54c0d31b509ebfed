//! Read-only views of world state for display and health checks

use serde::Serialize;

use super::player::Player;
use super::registry::EnemyInstance;

/// Counters reported by the health endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub online: usize,
    pub engaged: usize,
    pub combat_groups: usize,
    pub live_enemies: usize,
    pub pending_respawns: usize,
}

/// Copy of an enemy's health for display. Never written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnemyView {
    pub name: String,
    pub health: i32,
    pub max_health: i32,
    pub fighters: Vec<String>,
}

impl From<&EnemyInstance> for EnemyView {
    fn from(e: &EnemyInstance) -> Self {
        Self {
            name: e.name.clone(),
            health: e.current_health,
            max_health: e.max_health,
            fighters: e.fighters.clone(),
        }
    }
}

impl EnemyView {
    /// Coarse wound description used by `look`
    pub fn condition(&self) -> &'static str {
        let pct = if self.max_health > 0 {
            self.health * 100 / self.max_health
        } else {
            0
        };
        match pct {
            100.. => "unhurt",
            75..=99 => "lightly wounded",
            40..=74 => "wounded",
            15..=39 => "badly wounded",
            _ => "near death",
        }
    }
}

/// Character sheet text for `status`
pub fn status_text(p: &Player) -> String {
    format!(
        "{} - level {} ({} xp toward {})\nHealth {}/{}  Strength {}  Defense {}\nGold {}  State {}",
        p.name,
        p.level,
        p.experience,
        super::player::xp_needed_for_next(p.level),
        p.health,
        p.max_health,
        p.strength,
        p.defense,
        p.gold,
        p.state.as_str(),
    )
}
