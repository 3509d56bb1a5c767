//! Collision system - pickup consumption and missile hits

use uuid::Uuid;

use super::geometry::Field;
use super::world::{
    CellKey, Pickup, PickupKind, Player, World, AIR_BONUS, MAX_AIR, MAX_AMMO, MISSILE_HEIGHT,
    MISSILE_WIDTH, SUBMARINE_WIDTH,
};

/// Hit result from missile resolution
#[derive(Debug, Clone, PartialEq)]
pub struct HitResult {
    pub missile_id: String,
    pub shooter_id: String,
    pub target_id: String,
    pub x: f32,
    pub y: f32,
}

/// Everything consumed during one collision pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionOutcome {
    pub items_taken: u32,
    pub airs_taken: u32,
    pub hits: Vec<HitResult>,
}

/// Collision system for pickups and missiles
pub struct CollisionSystem;

impl CollisionSystem {
    /// Per-axis reach at which a submarine touches a pickup
    pub fn pickup_reach(kind: PickupKind) -> f32 {
        SUBMARINE_WIDTH / 2.0 + kind.radius()
    }

    /// Per-axis reach (x, y) at which a missile touches a submarine
    pub fn missile_reach() -> (f32, f32) {
        (
            SUBMARINE_WIDTH / 2.0 + MISSILE_WIDTH / 2.0,
            SUBMARINE_WIDTH / 2.0 + MISSILE_HEIGHT / 2.0,
        )
    }

    /// Check whether a player touches a pickup, across the wrap seams
    pub fn touches_pickup(
        field: &Field,
        player: &Player,
        pickup: &Pickup,
        kind: PickupKind,
    ) -> bool {
        field
            .delta((player.x, player.y), (pickup.x, pickup.y))
            .within(Self::pickup_reach(kind))
    }

    /// Check whether a missile touches a player, across the wrap seams
    pub fn touches_missile(field: &Field, player: &Player, mx: f32, my: f32) -> bool {
        let (reach_x, reach_y) = Self::missile_reach();
        let delta = field.delta((player.x, player.y), (mx, my));
        delta.dx <= reach_x && delta.dy <= reach_y
    }

    /// Resolve every alive player against pickups and missiles.
    ///
    /// Players are scanned one after another; whatever an earlier player consumes
    /// is gone before the next one is tested, so nothing is claimed twice.
    pub fn resolve(world: &mut World) -> CollisionOutcome {
        let mut outcome = CollisionOutcome::default();
        let connection_ids: Vec<Uuid> = world.players.keys().copied().collect();

        for connection_id in connection_ids {
            outcome.items_taken += Self::collect(world, &connection_id, PickupKind::Item);
            outcome.airs_taken += Self::collect(world, &connection_id, PickupKind::Air);
            if let Some(hit) = Self::check_missiles(world, &connection_id) {
                outcome.hits.push(hit);
            }
        }

        outcome
    }

    /// Consume every pickup of `kind` the player touches. Returns how many.
    fn collect(world: &mut World, connection_id: &Uuid, kind: PickupKind) -> u32 {
        let touched: Vec<CellKey> = match world.players.get(connection_id) {
            Some(player) if player.is_alive => world
                .pickups(kind)
                .iter()
                .filter(|(_, pickup)| Self::touches_pickup(&world.field, player, pickup, kind))
                .map(|(cell, _)| *cell)
                .collect(),
            _ => return 0,
        };

        let mut taken = 0;
        for cell in touched {
            if !world.replace_pickup(kind, &cell) {
                continue;
            }
            taken += 1;
            if let Some(player) = world.players.get_mut(connection_id) {
                match kind {
                    PickupKind::Item => {
                        player.missiles_many = (player.missiles_many + 1).min(MAX_AMMO);
                    }
                    PickupKind::Air => {
                        player.air_time = player.air_time.saturating_add(AIR_BONUS).min(MAX_AIR);
                    }
                }
            }
        }
        taken
    }

    /// Let at most one foreign missile hit the player
    fn check_missiles(world: &mut World, connection_id: &Uuid) -> Option<HitResult> {
        let player = world.players.get(connection_id).filter(|p| p.is_alive)?;
        let missile_id = world
            .missiles
            .values()
            .find(|m| {
                m.emit_player_id != player.player_id
                    && Self::touches_missile(&world.field, player, m.x, m.y)
            })
            .map(|m| m.id.clone())?;

        let missile = world.missiles.remove(&missile_id)?;
        let player = world.players.get_mut(connection_id)?;
        player.kill();

        Some(HitResult {
            missile_id,
            shooter_id: missile.emit_player_id,
            target_id: player.player_id.clone(),
            x: missile.x,
            y: missile.y,
        })
    }
}
