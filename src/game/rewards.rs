//! Kill rewards split among the fighters of a group

use tracing::{debug, warn};

use super::catalog::EnemyTemplate;
use super::combat::Encounter;

/// Per-fighter share of a kill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardSplit {
    pub gold: u32,
    pub experience: u32,
}

impl RewardSplit {
    /// Floor-divide the totals. Experience never rounds a positive total down to zero.
    pub fn compute(total_gold: u32, total_experience: u32, fighters: usize) -> Option<Self> {
        if fighters == 0 {
            return None;
        }
        let n = u32::try_from(fighters).unwrap_or(u32::MAX);
        let experience = if total_experience > 0 {
            (total_experience / n).max(1)
        } else {
            0
        };
        Some(Self {
            gold: total_gold / n,
            experience,
        })
    }
}

/// What one fighter received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FighterReward {
    pub name: String,
    pub gold: u32,
    pub experience: u32,
    pub drops: Vec<String>,
    pub new_levels: Vec<u32>,
}

/// Roll gold once, split it and the experience, then roll loot per fighter.
///
/// Names missing from the roster are skipped; the share is still computed
/// over the full list handed in.
pub fn distribute(cx: &mut Encounter<'_>, template: &EnemyTemplate, fighters: &[String]) -> Vec<FighterReward> {
    let catalog = cx.catalog;
    let total_gold = cx
        .dice
        .roll(clamp_i32(template.gold.0), clamp_i32(template.gold.1))
        .max(0) as u32;
    let Some(split) = RewardSplit::compute(total_gold, template.experience, fighters.len()) else {
        return Vec::new();
    };
    debug!(
        enemy = %template.id,
        total_gold,
        fighters = fighters.len(),
        gold_each = split.gold,
        xp_each = split.experience,
        "Splitting rewards"
    );

    let mut rewards = Vec::with_capacity(fighters.len());
    for name in fighters {
        let drops: Vec<String> = template
            .loot
            .iter()
            .filter(|d| cx.dice.chance(d.chance))
            .map(|d| d.item.clone())
            .collect();

        let Some(player) = cx.roster.get_mut(name) else {
            continue;
        };
        player.gold = player.gold.saturating_add(split.gold);
        let new_levels = player.gain_experience(split.experience);
        for item in &drops {
            player.add_item(item, 1);
        }
        let (level, max_health) = (player.level, player.max_health);
        if let Err(e) = cx.store.save(player) {
            warn!(player = %name, error = %e, "Failed to queue save after kill");
        }

        cx.outbox.tell(
            name,
            format!(
                "You receive {} gold and {} experience.",
                split.gold, split.experience
            ),
        );
        for item in &drops {
            let item_name = catalog.item(item).map_or(item.as_str(), |t| t.name.as_str());
            cx.outbox.tell(name, format!("You loot {}.", item_name));
        }
        if !new_levels.is_empty() {
            cx.outbox.tell(
                name,
                format!("You reach level {}! ({} max health)", level, max_health),
            );
        }

        rewards.push(FighterReward {
            name: name.clone(),
            gold: split.gold,
            experience: split.experience,
            drops,
            new_levels,
        });
    }
    rewards
}

fn clamp_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}
