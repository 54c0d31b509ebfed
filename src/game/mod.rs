//! Game simulation: world content, shared enemies, combat, respawns

pub mod catalog;
pub mod combat;
pub mod commands;
pub mod death;
pub mod dice;
pub mod fighter;
pub mod hooks;
pub mod outbox;
pub mod player;
pub mod registry;
pub mod respawn;
pub mod rewards;
pub mod snapshot;
pub mod tick;
pub mod world;

pub use catalog::Catalog;
pub use tick::TickScheduler;
pub use world::{World, WorldSettings};
