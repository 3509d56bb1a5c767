//! Game simulation modules

pub mod collision;
pub mod engine;
pub mod geometry;
pub mod simulation;
pub mod snapshot;
pub mod world;

pub use engine::{spawn_engine, EngineError, EngineSettings, GameEngine, GameHandle};
pub use geometry::{Field, ToroidalDelta};
pub use simulation::{step, TickReport};
pub use world::{World, WorldError, WorldSettings};
