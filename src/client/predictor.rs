//! Client-side game state with local prediction
//!
//! Between snapshots the local submarine and the missiles it fired keep
//! moving on the client's own timer. A snapshot replaces everything else
//! wholesale and overwrites the local submarine's authoritative fields, so
//! prediction never outlives the next snapshot.

use std::collections::HashMap;

use tracing::debug;

use crate::game::geometry::{Field, ToroidalDelta};
use crate::game::world::MISSILE_LIFETIME_TICKS;
use crate::ws::codec::{
    decode, decode_json, CodecError, DecodedMap, MissileView, PickupView, PlayerView,
};
use crate::ws::protocol::{ClientMsg, Direction, MapSnapshot, PlayerInfo, StartData};

/// A missile as the client tracks it
#[derive(Debug, Clone, PartialEq)]
pub struct ClientMissile {
    pub x: f32,
    pub y: f32,
    pub direction: Direction,
    pub emit_player_id: String,
    /// Ticks left for a missile fired locally; snapshot missiles have none
    pub ticks_left: Option<u32>,
}

impl From<MissileView> for ClientMissile {
    fn from(view: MissileView) -> Self {
        Self {
            x: view.x,
            y: view.y,
            direction: view.direction,
            emit_player_id: view.emit_player_id,
            ticks_left: None,
        }
    }
}

/// Client game state
#[derive(Debug, Clone)]
pub struct ClientGame {
    field: Field,
    submarine_speed: f32,
    missile_speed: f32,
    local: PlayerInfo,
    /// False once a snapshot no longer contains the local player
    in_world: bool,
    remote_players: HashMap<String, PlayerView>,
    items: Vec<PickupView>,
    airs: Vec<PickupView>,
    missiles: Vec<ClientMissile>,
    snapshots_applied: u64,
}

impl ClientGame {
    pub fn from_start(start: StartData) -> Self {
        Self {
            field: Field::new(start.field_width, start.field_height),
            submarine_speed: start.submarine_speed,
            missile_speed: start.missile_speed,
            local: start.player_obj,
            in_world: true,
            remote_players: HashMap::new(),
            items: Vec::new(),
            airs: Vec::new(),
            missiles: Vec::new(),
            snapshots_applied: 0,
        }
    }

    /// Reconcile with an authoritative snapshot
    pub fn apply_map_data(&mut self, snapshot: &MapSnapshot) -> Result<(), CodecError> {
        let decoded = decode(snapshot)?;
        self.apply_decoded(decoded);
        Ok(())
    }

    /// Parse a raw `map_data` message and reconcile with it
    pub fn apply_map_json(&mut self, text: &str) -> Result<(), CodecError> {
        let decoded = decode_json(text)?;
        self.apply_decoded(decoded);
        Ok(())
    }

    fn apply_decoded(&mut self, mut decoded: DecodedMap) {
        match decoded.players.remove(&self.local.player_id) {
            Some(own) => {
                self.local.x = own.x;
                self.local.y = own.y;
                self.local.display_name = own.display_name;
                self.local.score = own.score;
                self.local.is_alive = own.is_alive;
                self.local.missiles_many = own.missiles_many;
                self.local.air_time = own.air_time;
                self.local.dead_count = own.dead_count;
            }
            None if self.in_world => {
                debug!(player_id = %self.local.player_id, "Local player left the world");
                self.in_world = false;
            }
            None => {}
        }

        self.remote_players = decoded.players;
        self.items = decoded.items;
        self.airs = decoded.airs;
        self.missiles = decoded.missiles.into_iter().map(ClientMissile::from).collect();
        self.snapshots_applied += 1;
    }

    /// Advance the local prediction by one tick
    pub fn tick(&mut self) {
        if self.local.is_alive {
            let (x, y) = self.field.advance(
                self.local.x,
                self.local.y,
                self.local.direction,
                self.submarine_speed,
            );
            self.local.x = x;
            self.local.y = y;
        } else if self.in_world {
            self.local.dead_count += 1;
        }

        let field = self.field;
        let speed = self.missile_speed;
        let own_id = &self.local.player_id;
        self.missiles.retain_mut(|missile| {
            if &missile.emit_player_id != own_id {
                return true;
            }
            if let Some(ticks_left) = missile.ticks_left.as_mut() {
                *ticks_left = ticks_left.saturating_sub(1);
                if *ticks_left == 0 {
                    return false;
                }
            }
            let (x, y) = field.advance(missile.x, missile.y, missile.direction, speed);
            missile.x = x;
            missile.y = y;
            true
        });
    }

    /// Steer locally; returns the message to send, if anything changed
    pub fn change_direction(&mut self, direction: Direction) -> Option<ClientMsg> {
        if !self.in_world || self.local.direction == direction {
            return None;
        }
        self.local.direction = direction;
        Some(ClientMsg::ChangeDirection { direction })
    }

    /// Fire locally when alive and armed; returns the message to send
    pub fn fire(&mut self, direction: Direction) -> Option<ClientMsg> {
        if !self.in_world || !self.local.is_alive || self.local.missiles_many == 0 {
            return None;
        }
        self.local.missiles_many -= 1;
        self.missiles.push(ClientMissile {
            x: self.local.x,
            y: self.local.y,
            direction,
            emit_player_id: self.local.player_id.clone(),
            ticks_left: Some(MISSILE_LIFETIME_TICKS),
        });
        Some(ClientMsg::MissileEmit { direction })
    }

    /// Wrapped offset and bearing from the local submarine to `(x, y)`
    pub fn bearing_to(&self, x: f32, y: f32) -> ToroidalDelta {
        self.field.delta((x, y), (self.local.x, self.local.y))
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn local_player(&self) -> &PlayerInfo {
        &self.local
    }

    pub fn in_world(&self) -> bool {
        self.in_world
    }

    pub fn remote_players(&self) -> &HashMap<String, PlayerView> {
        &self.remote_players
    }

    pub fn items(&self) -> &[PickupView] {
        &self.items
    }

    pub fn airs(&self) -> &[PickupView] {
        &self.airs
    }

    pub fn missiles(&self) -> &[ClientMissile] {
        &self.missiles
    }

    pub fn snapshots_applied(&self) -> u64 {
        self.snapshots_applied
    }
}
