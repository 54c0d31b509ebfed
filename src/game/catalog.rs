//! Immutable world content: rooms, enemy templates and item templates
//!
//! Templates are never mutated at runtime. Live enemy state lives in
//! [`EntityRegistry`](super::registry::EntityRegistry).

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

const BUILTIN_WORLD: &str = include_str!("../../content/world.json");

/// A room address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub area: String,
    pub room: String,
}

impl Location {
    pub fn new(area: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            area: area.into(),
            room: room.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.area, self.room)
    }
}

/// One entry of an enemy's attack table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackDef {
    pub name: String,
    /// Inclusive damage roll range
    pub damage: (i32, i32),
    /// Probability the attack connects
    #[serde(default = "full_accuracy")]
    pub accuracy: f64,
}

fn full_accuracy() -> f64 {
    1.0
}

/// One entry of an enemy's loot table, rolled per fighter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropEntry {
    pub item: String,
    pub chance: f64,
}

/// Enemy stats as authored in content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnemyTemplate {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub max_health: i32,
    pub attacks: Vec<AttackDef>,
    pub experience: u32,
    /// Inclusive gold roll range
    pub gold: (u32, u32),
    #[serde(default)]
    pub loot: Vec<DropEntry>,
    /// Delay before a defeated instance reappears; 0 means immediately
    #[serde(default)]
    pub respawn_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemTemplate {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Delay before a taken room item reappears; 0 means always available
    #[serde(default)]
    pub respawn_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Exit name -> room id within the same area
    #[serde(default)]
    pub exits: BTreeMap<String, String>,
    #[serde(default)]
    pub enemies: Vec<String>,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Area {
    pub name: String,
    pub rooms: BTreeMap<String, Room>,
}

/// The full, validated world content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub default_spawn: Location,
    #[serde(default)]
    pub enemies: BTreeMap<String, EnemyTemplate>,
    #[serde(default)]
    pub items: BTreeMap<String, ItemTemplate>,
    pub areas: BTreeMap<String, Area>,
}

impl Catalog {
    /// The world compiled into the binary
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json_str(BUILTIN_WORLD)
    }

    /// Load and validate a world file
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let mut catalog: Catalog = serde_json::from_str(raw)?;
        for (id, t) in catalog.enemies.iter_mut() {
            t.id = id.clone();
        }
        for (id, t) in catalog.items.iter_mut() {
            t.id = id.clone();
        }
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.room(&self.default_spawn).is_none() {
            return Err(CatalogError::Dangling(format!(
                "default spawn {}",
                self.default_spawn
            )));
        }

        for t in self.enemies.values() {
            if t.max_health <= 0 {
                return Err(CatalogError::Invalid(format!("{}: max_health must be positive", t.id)));
            }
            if t.attacks.is_empty() {
                return Err(CatalogError::Invalid(format!("{}: no attacks", t.id)));
            }
            if t.gold.0 > t.gold.1 {
                return Err(CatalogError::Invalid(format!("{}: gold range inverted", t.id)));
            }
            for a in &t.attacks {
                if a.damage.0 > a.damage.1 || !(0.0..=1.0).contains(&a.accuracy) {
                    return Err(CatalogError::Invalid(format!("{}: bad attack {}", t.id, a.name)));
                }
            }
            for d in &t.loot {
                if !self.items.contains_key(&d.item) || !(0.0..=1.0).contains(&d.chance) {
                    return Err(CatalogError::Invalid(format!("{}: bad drop {}", t.id, d.item)));
                }
            }
        }

        for (area_id, area) in &self.areas {
            for (room_id, room) in &area.rooms {
                for (dir, target) in &room.exits {
                    if !area.rooms.contains_key(target) {
                        return Err(CatalogError::Dangling(format!(
                            "exit {dir} of {area_id}/{room_id} -> {target}"
                        )));
                    }
                }
                for e in &room.enemies {
                    if !self.enemies.contains_key(e) {
                        return Err(CatalogError::Dangling(format!("enemy {e} in {area_id}/{room_id}")));
                    }
                }
                for i in &room.items {
                    if !self.items.contains_key(i) {
                        return Err(CatalogError::Dangling(format!("item {i} in {area_id}/{room_id}")));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn enemy(&self, id: &str) -> Option<&EnemyTemplate> {
        self.enemies.get(id)
    }

    pub fn item(&self, id: &str) -> Option<&ItemTemplate> {
        self.items.get(id)
    }

    pub fn room(&self, loc: &Location) -> Option<&Room> {
        self.areas.get(&loc.area)?.rooms.get(&loc.room)
    }

    /// Resolve an exit name from a room
    pub fn exit(&self, from: &Location, dir: &str) -> Option<Location> {
        let room = self.room(from)?;
        let dir = dir.trim().to_ascii_lowercase();
        room.exits
            .iter()
            .find(|(name, _)| name.as_str() == dir || (!dir.is_empty() && name.starts_with(&dir)))
            .map(|(_, target)| Location::new(from.area.clone(), target.clone()))
    }

    /// All exits of a room, in name order
    pub fn exits(&self, from: &Location) -> Vec<(String, Location)> {
        self.room(from)
            .map(|room| {
                room.exits
                    .iter()
                    .map(|(dir, target)| (dir.clone(), Location::new(from.area.clone(), target.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Find a resident enemy template of a room by keyword
    pub fn find_enemy_in_room(&self, loc: &Location, token: &str) -> Option<&EnemyTemplate> {
        let room = self.room(loc)?;
        room.enemies
            .iter()
            .filter_map(|id| self.enemy(id))
            .find(|t| keyword_matches(&t.id, &t.name, token))
    }

    /// Find a resident item template of a room by keyword
    pub fn find_item_in_room(&self, loc: &Location, token: &str) -> Option<&ItemTemplate> {
        let room = self.room(loc)?;
        room.items
            .iter()
            .filter_map(|id| self.item(id))
            .find(|t| keyword_matches(&t.id, &t.name, token))
    }
}

fn keyword_matches(id: &str, name: &str, token: &str) -> bool {
    let token = token.trim().to_ascii_lowercase();
    if token.is_empty() {
        return false;
    }
    let name = name.to_ascii_lowercase();
    id.to_ascii_lowercase().starts_with(&token)
        || name.starts_with(&token)
        || name.split_whitespace().any(|w| w.starts_with(&token))
}

/// Content errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read world file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed world file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unresolved reference: {0}")]
    Dangling(String),

    #[error("invalid template: {0}")]
    Invalid(String),
}

#[cfg(test)]
pub(crate) fn test_catalog() -> Catalog {
    const TEST_WORLD: &str = r#"{
        "default_spawn": { "area": "forest", "room": "path" },
        "enemies": {
            "wolf": {
                "name": "grey wolf",
                "max_health": 30,
                "attacks": [ { "name": "bite", "damage": [3, 3], "accuracy": 1.0 } ],
                "experience": 20,
                "gold": [10, 10],
                "loot": [ { "item": "pelt", "chance": 0.5 } ],
                "respawn_ms": 30000
            },
            "rat": {
                "name": "rat",
                "max_health": 5,
                "attacks": [ { "name": "nibble", "damage": [1, 1] } ],
                "experience": 1,
                "gold": [0, 0]
            }
        },
        "items": {
            "pelt": { "name": "wolf pelt" },
            "herb": { "name": "healing herb", "respawn_ms": 60000 },
            "stone": { "name": "smooth stone" }
        },
        "areas": {
            "forest": {
                "name": "Darkwood",
                "rooms": {
                    "path": {
                        "name": "Forest Path",
                        "exits": { "north": "clearing" }
                    },
                    "clearing": {
                        "name": "Clearing",
                        "exits": { "south": "path" },
                        "enemies": ["wolf", "rat"],
                        "items": ["herb", "stone"]
                    }
                }
            }
        }
    }"#;
    Catalog::from_json_str(TEST_WORLD).expect("test world is valid")
}
