//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{spawn_engine, EngineError, GameHandle};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub game: GameHandle,
}

impl AppState {
    /// Start the game engine and wrap its handle
    pub fn new(config: Config) -> Result<Self, EngineError> {
        let game = spawn_engine(&config.engine_settings())?;
        Ok(Self::with_game(config, game))
    }

    pub fn with_game(config: Config, game: GameHandle) -> Self {
        Self {
            config: Arc::new(config),
            game,
        }
    }
}
