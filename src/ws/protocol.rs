//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version tag carried as the first element of every map snapshot.
/// Bump whenever a record layout below changes.
pub const WIRE_VERSION: u8 = 1;

/// Facing of a submarine or travel direction of a missile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Up,
    Down,
    Right,
}

impl Direction {
    /// Unit step in screen coordinates (y grows downwards).
    pub fn unit(self) -> (f32, f32) {
        match self {
            Self::Left => (-1.0, 0.0),
            Self::Up => (0.0, -1.0),
            Self::Down => (0.0, 1.0),
            Self::Right => (1.0, 0.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Up => "up",
            Self::Down => "down",
            Self::Right => "right",
        }
    }
}

impl Default for Direction {
    fn default() -> Self {
        Self::Right
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Steer the submarine
    ChangeDirection { direction: Direction },
    /// Fire a missile travelling in `direction`
    MissileEmit { direction: Direction },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Sent once, right after the socket is accepted
    StartData(StartData),
    /// Periodic positional snapshot of the whole world
    MapData(MapSnapshot),
}

/// Initial payload for a freshly connected player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartData {
    pub player_obj: PlayerInfo,
    pub field_width: u32,
    pub field_height: u32,
    pub submarine_speed: f32,
    pub missile_speed: f32,
}

/// Full record of the connecting player, named fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub x: f32,
    pub y: f32,
    pub player_id: String,
    pub display_name: String,
    pub thumb_url: String,
    pub is_alive: bool,
    pub direction: Direction,
    pub missiles_many: u8,
    pub air_time: u8,
    pub score: u32,
    pub dead_count: u32,
}

/// Player record, serialized as a positional array:
/// `[x, y, id, displayName, score, isAlive, direction, ammo, air, deathCounter]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord(
    pub f32,
    pub f32,
    pub String,
    pub String,
    pub u32,
    pub bool,
    pub Direction,
    pub u8,
    pub u8,
    pub u32,
);

/// Pickup record: `[x, y]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PickupRecord(pub f32, pub f32);

/// Missile record: `[x, y, direction, emittingPlayerId]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissileRecord(pub f32, pub f32, pub Direction, pub String);

/// Map snapshot: `[version, players, items, airs, missiles]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSnapshot(
    pub u8,
    pub Vec<PlayerRecord>,
    pub Vec<PickupRecord>,
    pub Vec<PickupRecord>,
    pub Vec<MissileRecord>,
);
