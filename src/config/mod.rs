//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::geometry::MAX_FIELD_SIDE;
use crate::game::{EngineSettings, WorldSettings};
use crate::util::time::{DEFAULT_SNAPSHOT_EVERY_TICKS, DEFAULT_TICK_MILLIS};

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Field size in world units
    pub field_width: u32,
    pub field_height: u32,
    /// Pickup counts kept on the field
    pub item_total: usize,
    pub air_total: usize,

    /// Simulation tick period in milliseconds
    pub tick_millis: u64,
    /// Publish a snapshot every N ticks
    pub snapshot_every_ticks: u32,
    /// Seed for spawn positions and missile salts
    pub world_seed: u64,

    /// Allowed client origins for CORS, permissive when empty
    pub client_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let world = WorldSettings::default();
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            field_width: world.field_width,
            field_height: world.field_height,
            item_total: world.item_total,
            air_total: world.air_total,
            tick_millis: DEFAULT_TICK_MILLIS,
            snapshot_every_ticks: DEFAULT_SNAPSHOT_EVERY_TICKS,
            world_seed: world.seed,
            client_origins: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match (lookup("PORT"), lookup("SERVER_ADDR")) {
            (Some(port), _) => format!("0.0.0.0:{}", port),
            (None, Some(addr)) => addr,
            (None, None) => defaults.server_addr.to_string(),
        };

        let world_seed: u64 = match lookup("WORLD_SEED") {
            Some(raw) => parse_value("WORLD_SEED", &raw)?,
            None => rand::random(),
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(server_addr.clone()))?,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            field_width: parse_or(&lookup, "FIELD_WIDTH", defaults.field_width)?,
            field_height: parse_or(&lookup, "FIELD_HEIGHT", defaults.field_height)?,
            item_total: parse_or(&lookup, "ITEM_TOTAL", defaults.item_total)?,
            air_total: parse_or(&lookup, "AIR_TOTAL", defaults.air_total)?,
            tick_millis: parse_or(&lookup, "TICK_MILLIS", defaults.tick_millis)?,
            snapshot_every_ticks: parse_or(
                &lookup,
                "SNAPSHOT_EVERY_TICKS",
                defaults.snapshot_every_ticks,
            )?,
            world_seed,
            client_origins: lookup("CLIENT_ORIGIN")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the simulation cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.field_width == 0 || self.field_height == 0 {
            return Err(ConfigError::EmptyField {
                width: self.field_width,
                height: self.field_height,
            });
        }
        if self.field_width > MAX_FIELD_SIDE || self.field_height > MAX_FIELD_SIDE {
            return Err(ConfigError::FieldTooLarge {
                width: self.field_width,
                height: self.field_height,
                max: MAX_FIELD_SIDE,
            });
        }
        if self.tick_millis == 0 {
            return Err(ConfigError::Zero("TICK_MILLIS"));
        }
        if self.snapshot_every_ticks == 0 {
            return Err(ConfigError::Zero("SNAPSHOT_EVERY_TICKS"));
        }

        let capacity = self.field_width as u64 * self.field_height as u64;
        for (name, count) in [("ITEM_TOTAL", self.item_total), ("AIR_TOTAL", self.air_total)] {
            if count as u64 > capacity {
                return Err(ConfigError::TooManyPickups {
                    name,
                    count,
                    capacity,
                });
            }
        }
        Ok(())
    }

    /// Settings for the game engine
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            world: WorldSettings {
                field_width: self.field_width,
                field_height: self.field_height,
                item_total: self.item_total,
                air_total: self.air_total,
                seed: self.world_seed,
            },
            tick_period: Duration::from_millis(self.tick_millis),
            snapshot_every_ticks: self.snapshot_every_ticks,
        }
    }
}

fn parse_value<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: raw.to_string(),
    })
}

fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => parse_value(name, &raw),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format: {0}")]
    InvalidAddress(String),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("Field must not be empty, got {width}x{height}")]
    EmptyField { width: u32, height: u32 },

    #[error("Field side must be at most {max}, got {width}x{height}")]
    FieldTooLarge { width: u32, height: u32, max: u32 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{name}={count} exceeds field capacity {capacity}")]
    TooManyPickups {
        name: &'static str,
        count: usize,
        capacity: u64,
    },
}
