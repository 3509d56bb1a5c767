//! Client-side prediction and reconciliation

mod predictor;

pub use predictor::{ClientGame, ClientMissile};
