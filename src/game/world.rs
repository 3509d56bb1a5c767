//! Authoritative world state: players, pickups, missiles and the field

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ws::protocol::{Direction, PlayerInfo};

use super::geometry::{Field, MAX_FIELD_SIDE};

pub const SUBMARINE_SPEED: f32 = 1.0;
pub const MISSILE_SPEED: f32 = 3.0;
pub const MISSILE_LIFETIME_TICKS: u32 = 180;

pub const SUBMARINE_WIDTH: f32 = 42.0;
pub const ITEM_RADIUS: f32 = 4.0;
pub const AIR_RADIUS: f32 = 5.0;
pub const MISSILE_WIDTH: f32 = 30.0;
pub const MISSILE_HEIGHT: f32 = 30.0;

pub const MAX_AMMO: u8 = 6;
pub const MAX_AIR: u8 = 99;
pub const AIR_BONUS: u8 = 30;
/// Sub-ticks per simulated second of air
pub const TICKS_PER_AIR_SECOND: u32 = 30;
/// Ticks a dead player stays on the field before removal
pub const REMOVAL_THRESHOLD_TICKS: u32 = 70;

/// Random placements tried before falling back to a scan for a free cell
const MAX_SPAWN_ATTEMPTS: usize = 64;

/// World errors
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("field must be at least 1x1, got {0}x{1}")]
    EmptyField(u32, u32),

    #[error("field side must be at most {max}, got {width}x{height}")]
    FieldTooLarge { width: u32, height: u32, max: u32 },

    #[error("no free cell left for a {0:?} pickup")]
    FieldFull(PickupKind),

    #[error("{kind:?} pickup count {count} exceeds field capacity {capacity}")]
    TooManyPickups {
        kind: PickupKind,
        count: usize,
        capacity: u64,
    },
}

/// Time a player has been alive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AliveTime {
    /// Ticks since the last whole second, `0..TICKS_PER_AIR_SECOND`
    pub clock: u32,
    pub seconds: u32,
}

/// Player state (authoritative)
#[derive(Debug, Clone)]
pub struct Player {
    pub connection_id: Uuid,
    pub player_id: String,
    pub display_name: String,
    pub thumb_url: String,

    pub x: f32,
    pub y: f32,
    pub direction: Direction,

    pub is_alive: bool,
    pub missiles_many: u8,
    pub air_time: u8,
    pub score: u32,
    pub alive_time: AliveTime,
    pub dead_count: u32,
}

impl Player {
    pub fn new(
        connection_id: Uuid,
        display_name: String,
        thumb_url: String,
        x: f32,
        y: f32,
    ) -> Self {
        Self {
            connection_id,
            player_id: player_id_for(&connection_id),
            display_name,
            thumb_url,
            x,
            y,
            direction: Direction::default(),
            is_alive: true,
            missiles_many: 0,
            air_time: MAX_AIR,
            score: 0,
            alive_time: AliveTime::default(),
            dead_count: 0,
        }
    }

    /// Mark the player dead. Already-dead players keep their death counter.
    pub fn kill(&mut self) -> bool {
        if !self.is_alive {
            return false;
        }
        self.is_alive = false;
        self.dead_count = 0;
        true
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            x: self.x,
            y: self.y,
            player_id: self.player_id.clone(),
            display_name: self.display_name.clone(),
            thumb_url: self.thumb_url.clone(),
            is_alive: self.is_alive,
            direction: self.direction,
            missiles_many: self.missiles_many,
            air_time: self.air_time,
            score: self.score,
            dead_count: self.dead_count,
        }
    }
}

/// Player id: hex SHA-256 of the connection id
pub fn player_id_for(connection_id: &Uuid) -> String {
    hex::encode(Sha256::digest(connection_id.to_string().as_bytes()))
}

/// Pickup kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PickupKind {
    /// Adds one missile
    Item,
    /// Refills air
    Air,
}

impl PickupKind {
    pub fn radius(self) -> f32 {
        match self {
            Self::Item => ITEM_RADIUS,
            Self::Air => AIR_RADIUS,
        }
    }
}

/// Integer cell a pickup occupies; doubles as its identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey(pub u32, pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pickup {
    pub x: f32,
    pub y: f32,
}

impl Pickup {
    fn at(cell: CellKey) -> Self {
        Self {
            x: cell.0 as f32,
            y: cell.1 as f32,
        }
    }
}

/// Missile in flight
#[derive(Debug, Clone)]
pub struct Missile {
    pub id: String,
    pub emit_player_id: String,
    pub x: f32,
    pub y: f32,
    pub direction: Direction,
    /// Ticks left before the missile expires
    pub alive_flame: u32,
}

/// Settings the world is built from
#[derive(Debug, Clone)]
pub struct WorldSettings {
    pub field_width: u32,
    pub field_height: u32,
    pub item_total: usize,
    pub air_total: usize,
    pub seed: u64,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            field_width: 1000,
            field_height: 1000,
            item_total: 15,
            air_total: 10,
            seed: 0,
        }
    }
}

/// World state (owned by the game engine task)
pub struct World {
    pub field: Field,
    pub tick: u64,
    pub players: HashMap<Uuid, Player>,
    pub items: HashMap<CellKey, Pickup>,
    pub airs: HashMap<CellKey, Pickup>,
    pub missiles: HashMap<String, Missile>,
    item_total: usize,
    air_total: usize,
    width_cells: u32,
    height_cells: u32,
    rng: ChaCha8Rng,
}

impl World {
    /// Build a world and place the initial pickups
    pub fn new(settings: &WorldSettings) -> Result<Self, WorldError> {
        if settings.field_width == 0 || settings.field_height == 0 {
            return Err(WorldError::EmptyField(
                settings.field_width,
                settings.field_height,
            ));
        }

        if settings.field_width > MAX_FIELD_SIDE || settings.field_height > MAX_FIELD_SIDE {
            return Err(WorldError::FieldTooLarge {
                width: settings.field_width,
                height: settings.field_height,
                max: MAX_FIELD_SIDE,
            });
        }

        let field = Field::new(settings.field_width, settings.field_height);
        for (kind, count) in [
            (PickupKind::Item, settings.item_total),
            (PickupKind::Air, settings.air_total),
        ] {
            if count as u64 > field.capacity() {
                return Err(WorldError::TooManyPickups {
                    kind,
                    count,
                    capacity: field.capacity(),
                });
            }
        }

        let mut world = Self {
            field,
            tick: 0,
            players: HashMap::new(),
            items: HashMap::with_capacity(settings.item_total),
            airs: HashMap::with_capacity(settings.air_total),
            missiles: HashMap::new(),
            item_total: settings.item_total,
            air_total: settings.air_total,
            width_cells: settings.field_width,
            height_cells: settings.field_height,
            rng: ChaCha8Rng::seed_from_u64(settings.seed),
        };

        for _ in 0..settings.item_total {
            world.spawn_pickup(PickupKind::Item)?;
        }
        for _ in 0..settings.air_total {
            world.spawn_pickup(PickupKind::Air)?;
        }

        info!(
            width = settings.field_width,
            height = settings.field_height,
            items = world.items.len(),
            airs = world.airs.len(),
            "World populated"
        );

        Ok(world)
    }

    pub fn item_total(&self) -> usize {
        self.item_total
    }

    pub fn air_total(&self) -> usize {
        self.air_total
    }

    fn random_cell(&mut self) -> CellKey {
        CellKey(
            self.rng.gen_range(0..self.width_cells),
            self.rng.gen_range(0..self.height_cells),
        )
    }

    /// Add a player at a random position
    pub fn spawn_player(
        &mut self,
        connection_id: Uuid,
        display_name: String,
        thumb_url: String,
    ) -> &Player {
        let cell = self.random_cell();
        let player = Player::new(
            connection_id,
            display_name,
            thumb_url,
            cell.0 as f32,
            cell.1 as f32,
        );

        info!(
            connection_id = %connection_id,
            player_id = %player.player_id,
            x = player.x,
            y = player.y,
            "Player spawned"
        );

        if self.players.insert(connection_id, player).is_some() {
            warn!(connection_id = %connection_id, "Connection id reused, previous player replaced");
        }
        &self.players[&connection_id]
    }

    /// Remove a player. Unknown ids are a no-op.
    pub fn remove_player(&mut self, connection_id: &Uuid) -> Option<Player> {
        let removed = self.players.remove(connection_id);
        if let Some(player) = &removed {
            info!(
                connection_id = %connection_id,
                player_id = %player.player_id,
                score = player.score,
                "Player removed"
            );
        }
        removed
    }

    /// Change a player's facing. Returns false for unknown players.
    pub fn apply_direction(&mut self, connection_id: &Uuid, direction: Direction) -> bool {
        match self.players.get_mut(connection_id) {
            Some(player) => {
                player.direction = direction;
                true
            }
            None => {
                debug!(connection_id = %connection_id, "Direction for unknown player ignored");
                false
            }
        }
    }

    /// Fire a missile from the player's position.
    /// Silently rejected for unknown or dead players and empty magazines.
    pub fn fire_request(&mut self, connection_id: &Uuid, direction: Direction) -> Option<Missile> {
        let salt: u32 = self.rng.gen_range(0..100_000);
        let player = self.players.get_mut(connection_id)?;
        if !player.is_alive || player.missiles_many == 0 {
            debug!(
                connection_id = %connection_id,
                alive = player.is_alive,
                ammo = player.missiles_many,
                "Fire request rejected"
            );
            return None;
        }

        player.missiles_many -= 1;
        let missile = Missile {
            id: missile_id(salt, connection_id, player.x, player.y),
            emit_player_id: player.player_id.clone(),
            x: player.x,
            y: player.y,
            direction,
            alive_flame: MISSILE_LIFETIME_TICKS,
        };

        debug!(
            player_id = %missile.emit_player_id,
            missile_id = %missile.id,
            direction = %direction,
            "Missile fired"
        );

        self.missiles.insert(missile.id.clone(), missile.clone());
        Some(missile)
    }

    fn pickups_mut(&mut self, kind: PickupKind) -> &mut HashMap<CellKey, Pickup> {
        match kind {
            PickupKind::Item => &mut self.items,
            PickupKind::Air => &mut self.airs,
        }
    }

    pub fn pickups(&self, kind: PickupKind) -> &HashMap<CellKey, Pickup> {
        match kind {
            PickupKind::Item => &self.items,
            PickupKind::Air => &self.airs,
        }
    }

    /// Place one pickup on a cell not already holding the same kind
    pub fn spawn_pickup(&mut self, kind: PickupKind) -> Result<Pickup, WorldError> {
        for _ in 0..MAX_SPAWN_ATTEMPTS {
            let cell = self.random_cell();
            if !self.pickups(kind).contains_key(&cell) {
                let pickup = Pickup::at(cell);
                self.pickups_mut(kind).insert(cell, pickup);
                return Ok(pickup);
            }
        }

        // Crowded field: walk the cells from a random start
        let total = self.field.capacity();
        let start = self.random_cell();
        let start_index = start.1 as u64 * self.width_cells as u64 + start.0 as u64;
        for offset in 0..total {
            let index = (start_index + offset) % total;
            let cell = CellKey(
                (index % self.width_cells as u64) as u32,
                (index / self.width_cells as u64) as u32,
            );
            if !self.pickups(kind).contains_key(&cell) {
                let pickup = Pickup::at(cell);
                self.pickups_mut(kind).insert(cell, pickup);
                return Ok(pickup);
            }
        }

        Err(WorldError::FieldFull(kind))
    }

    /// Remove a consumed pickup and immediately place its replacement
    pub fn replace_pickup(&mut self, kind: PickupKind, cell: &CellKey) -> bool {
        if self.pickups_mut(kind).remove(cell).is_none() {
            return false;
        }
        if let Err(e) = self.spawn_pickup(kind) {
            warn!(error = %e, "Failed to respawn pickup");
        }
        true
    }
}

fn missile_id(salt: u32, connection_id: &Uuid, x: f32, y: f32) -> String {
    let raw = format!("{},{},{},{}", salt, connection_id, x, y);
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// World without pickups, for tests that place things by hand
#[cfg(test)]
pub(crate) fn empty_world(width: u32, height: u32) -> World {
    World::new(&WorldSettings {
        field_width: width,
        field_height: height,
        item_total: 0,
        air_total: 0,
        seed: 7,
    })
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_population() {
        let world = World::new(&WorldSettings::default()).unwrap();
        assert_eq!(world.items.len(), 15);
        assert_eq!(world.airs.len(), 10);
        for (cell, pickup) in world.items.iter().chain(world.airs.iter()) {
            assert_eq!(pickup.x, cell.0 as f32);
            assert_eq!(pickup.y, cell.1 as f32);
            assert!(pickup.x < 1000.0 && pickup.y < 1000.0);
        }
    }

    #[test]
    fn test_oversized_field_is_rejected() {
        let settings = WorldSettings {
            field_width: MAX_FIELD_SIDE + 1,
            field_height: 10,
            item_total: 0,
            air_total: 0,
            seed: 1,
        };
        assert!(matches!(
            World::new(&settings),
            Err(WorldError::FieldTooLarge { width, max, .. })
                if width == MAX_FIELD_SIDE + 1 && max == MAX_FIELD_SIDE
        ));

        let tall = WorldSettings {
            field_width: 10,
            field_height: MAX_FIELD_SIDE + 1,
            ..settings.clone()
        };
        assert!(matches!(World::new(&tall), Err(WorldError::FieldTooLarge { .. })));

        let widest = WorldSettings {
            field_width: MAX_FIELD_SIDE,
            ..settings
        };
        let world = World::new(&widest).unwrap();
        assert_eq!(world.field.capacity(), MAX_FIELD_SIDE as u64 * 10);
    }

    #[test]
    fn test_too_many_pickups_fails_fast() {
        let result = World::new(&WorldSettings {
            field_width: 3,
            field_height: 3,
            item_total: 10,
            air_total: 0,
            seed: 1,
        });
        assert!(matches!(
            result,
            Err(WorldError::TooManyPickups {
                kind: PickupKind::Item,
                count: 10,
                capacity: 9
            })
        ));
    }

    #[test]
    fn test_spawn_fills_every_cell_of_tiny_field() {
        let world = World::new(&WorldSettings {
            field_width: 4,
            field_height: 4,
            item_total: 16,
            air_total: 16,
            seed: 3,
        })
        .unwrap();
        assert_eq!(world.items.len(), 16);
        assert_eq!(world.airs.len(), 16);
    }

    #[test]
    fn test_spawn_on_full_field_errors() {
        let mut world = World::new(&WorldSettings {
            field_width: 2,
            field_height: 2,
            item_total: 4,
            air_total: 0,
            seed: 3,
        })
        .unwrap();
        assert!(matches!(
            world.spawn_pickup(PickupKind::Item),
            Err(WorldError::FieldFull(PickupKind::Item))
        ));
        assert_eq!(world.items.len(), 4);
    }

    #[test]
    fn test_spawn_player_defaults() {
        let mut world = empty_world(1000, 1000);
        let id = Uuid::new_v4();
        let player = world
            .spawn_player(id, "nemo".to_string(), "thumb.png".to_string())
            .clone();

        assert_eq!(player.player_id, player_id_for(&id));
        assert_eq!(player.player_id.len(), 64);
        assert!(player.is_alive);
        assert_eq!(player.air_time, 99);
        assert_eq!(player.missiles_many, 0);
        assert_eq!(player.score, 0);
        assert_eq!(player.direction, Direction::Right);
        assert!(player.x >= 0.0 && player.x < 1000.0);
        assert!(player.y >= 0.0 && player.y < 1000.0);
    }

    #[test]
    fn test_player_id_is_stable() {
        let id = Uuid::new_v4();
        assert_eq!(player_id_for(&id), player_id_for(&id));
        assert_ne!(player_id_for(&id), player_id_for(&Uuid::new_v4()));
    }

    #[test]
    fn test_remove_player_twice_is_noop() {
        let mut world = empty_world(100, 100);
        let id = Uuid::new_v4();
        world.spawn_player(id, "a".to_string(), String::new());
        assert!(world.remove_player(&id).is_some());
        assert!(world.remove_player(&id).is_none());
        assert!(world.players.is_empty());
    }

    #[test]
    fn test_apply_direction_unknown_player() {
        let mut world = empty_world(100, 100);
        assert!(!world.apply_direction(&Uuid::new_v4(), Direction::Up));

        let id = Uuid::new_v4();
        world.spawn_player(id, "a".to_string(), String::new());
        assert!(world.apply_direction(&id, Direction::Up));
        assert_eq!(world.players[&id].direction, Direction::Up);
    }

    #[test]
    fn test_fire_without_ammo_is_ignored() {
        let mut world = empty_world(1000, 1000);
        let id = Uuid::new_v4();
        world.spawn_player(id, "a".to_string(), String::new());

        assert!(world.fire_request(&id, Direction::Left).is_none());
        assert!(world.missiles.is_empty());
        assert_eq!(world.players[&id].missiles_many, 0);
    }

    #[test]
    fn test_fire_while_dead_is_ignored() {
        let mut world = empty_world(1000, 1000);
        let id = Uuid::new_v4();
        world.spawn_player(id, "a".to_string(), String::new());
        let player = world.players.get_mut(&id).unwrap();
        player.missiles_many = 3;
        player.kill();

        assert!(world.fire_request(&id, Direction::Left).is_none());
        assert_eq!(world.players[&id].missiles_many, 3);
    }

    #[test]
    fn test_fire_consumes_ammo() {
        let mut world = empty_world(1000, 1000);
        let id = Uuid::new_v4();
        world.spawn_player(id, "a".to_string(), String::new());
        world.players.get_mut(&id).unwrap().missiles_many = 2;

        let missile = world.fire_request(&id, Direction::Up).unwrap();
        let player = &world.players[&id];
        assert_eq!(player.missiles_many, 1);
        assert_eq!(missile.emit_player_id, player.player_id);
        assert_eq!((missile.x, missile.y), (player.x, player.y));
        assert_eq!(missile.alive_flame, MISSILE_LIFETIME_TICKS);
        assert!(world.missiles.contains_key(&missile.id));

        assert!(world.fire_request(&Uuid::new_v4(), Direction::Up).is_none());
    }

    #[test]
    fn test_kill_is_idempotent() {
        let mut player = Player::new(Uuid::new_v4(), "a".into(), String::new(), 0.0, 0.0);
        assert!(player.kill());
        player.dead_count = 12;
        assert!(!player.kill());
        assert_eq!(player.dead_count, 12);
    }
}
