//! Submarine Server - authoritative multiplayer game on a wrapping field
//!
//! - `game`: world state, collisions, the fixed-tick simulation and its engine task
//! - `ws`: wire protocol, snapshot codec and the WebSocket session handler
//! - `client`: the receiving-side predictor that mirrors the local submarine

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
