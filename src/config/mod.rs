//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::game::combat::CombatSettings;
use crate::game::WorldSettings;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Heartbeat interval in milliseconds
    pub tick_interval_ms: u64,
    /// Combat rounds resolve on every Nth tick
    pub combat_every_ticks: u64,
    /// Out-of-combat regeneration runs on every Nth tick
    pub regen_every_ticks: u64,
    /// Stale-state cleanup runs on every Nth tick
    pub cleanup_every_ticks: u64,
    /// Probability that a flee attempt succeeds
    pub flee_chance: f64,
    /// Fixed RNG seed for reproducible sessions
    pub rng_seed: Option<u64>,

    /// Directory holding one JSON save per player
    pub save_dir: PathBuf,
    /// Optional world content file; the built-in world is used when unset
    pub content_path: Option<PathBuf>,
    /// Allowed client origins for CORS (comma separated, `*` for any)
    pub client_origin: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let flee_chance: f64 = parse_or("FLEE_CHANCE", 0.5)?;
        if !(0.0..=1.0).contains(&flee_chance) {
            return Err(ConfigError::Invalid("FLEE_CHANCE"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            tick_interval_ms: positive("TICK_INTERVAL_MS", 1000)?,
            combat_every_ticks: positive("COMBAT_EVERY_TICKS", 3)?,
            regen_every_ticks: positive("REGEN_EVERY_TICKS", 5)?,
            cleanup_every_ticks: positive("CLEANUP_EVERY_TICKS", 60)?,
            flee_chance,
            rng_seed: match env::var("RNG_SEED") {
                Ok(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid("RNG_SEED"))?),
                Err(_) => None,
            },

            save_dir: env::var("SAVE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./saves")),
            content_path: env::var("CONTENT_PATH").ok().map(PathBuf::from),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),
        })
    }
}

impl Config {
    /// Subsystem cadence for the world
    pub fn world_settings(&self) -> WorldSettings {
        WorldSettings {
            tick_interval_ms: self.tick_interval_ms,
            combat: CombatSettings {
                combat_every_ticks: self.combat_every_ticks,
                flee_chance: self.flee_chance,
            },
            regen_every_ticks: self.regen_every_ticks,
            cleanup_every_ticks: self.cleanup_every_ticks,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            tick_interval_ms: 1000,
            combat_every_ticks: 3,
            regen_every_ticks: 5,
            cleanup_every_ticks: 60,
            flee_chance: 0.5,
            rng_seed: None,
            save_dir: PathBuf::from("./saves"),
            content_path: None,
            client_origin: "*".to_string(),
        }
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

fn positive(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let value: u64 = parse_or(name, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid(name));
    }
    Ok(value)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variables_fall_back() {
        assert_eq!(parse_or("HEARTHMUD_TEST_UNSET_VAR", 7u64).unwrap(), 7);
    }

    #[test]
    fn zero_and_garbage_are_rejected() {
        env::set_var("HEARTHMUD_TEST_ZERO", "0");
        assert!(matches!(
            positive("HEARTHMUD_TEST_ZERO", 3),
            Err(ConfigError::Invalid("HEARTHMUD_TEST_ZERO"))
        ));
        env::set_var("HEARTHMUD_TEST_GARBAGE", "soon");
        assert!(parse_or::<u64>("HEARTHMUD_TEST_GARBAGE", 1).is_err());
    }

    #[test]
    fn defaults_match_world_defaults() {
        let settings = Config::default().world_settings();
        assert_eq!(settings.combat.combat_every_ticks, 3);
        assert_eq!(settings.regen_every_ticks, 5);
        assert_eq!(settings.cleanup_every_ticks, 60);
    }
}
