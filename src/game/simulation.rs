//! Fixed-tick simulation step
//!
//! One call to [`step`] advances the world by exactly one tick, in this order:
//! players move (dead ones age toward removal), missiles age and move, alive
//! players breathe, then collisions are resolved against the post-move positions.

use tracing::{info, trace};
use uuid::Uuid;

use super::collision::{CollisionOutcome, CollisionSystem};
use super::world::{
    World, MISSILE_SPEED, REMOVAL_THRESHOLD_TICKS, SUBMARINE_SPEED, TICKS_PER_AIR_SECOND,
};

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// Players deleted after their death animation
    pub removed: Vec<Uuid>,
    pub missiles_expired: u32,
    /// Players whose air ran out this tick
    pub suffocated: Vec<Uuid>,
    pub collisions: CollisionOutcome,
}

/// Advance the world by one tick
pub fn step(world: &mut World) -> TickReport {
    world.tick += 1;
    let mut report = TickReport {
        tick: world.tick,
        ..TickReport::default()
    };

    report.removed = move_players(world);
    report.missiles_expired = move_missiles(world);
    report.suffocated = deplete_air(world);
    report.collisions = CollisionSystem::resolve(world);
    debug_assert_eq!(world.items.len(), world.item_total());
    debug_assert_eq!(world.airs.len(), world.air_total());

    for hit in &report.collisions.hits {
        info!(
            shooter_id = %hit.shooter_id,
            target_id = %hit.target_id,
            "Submarine sunk"
        );
    }

    trace!(
        tick = report.tick,
        players = world.players.len(),
        missiles = world.missiles.len(),
        items_taken = report.collisions.items_taken,
        airs_taken = report.collisions.airs_taken,
        "Tick complete"
    );

    report
}

/// Move alive players one step; count dead players down to removal
fn move_players(world: &mut World) -> Vec<Uuid> {
    let field = world.field;
    let mut expired = Vec::new();

    for player in world.players.values_mut() {
        if player.is_alive {
            let (x, y) = field.advance(player.x, player.y, player.direction, SUBMARINE_SPEED);
            player.x = x;
            player.y = y;
        } else {
            player.dead_count += 1;
            if player.dead_count >= REMOVAL_THRESHOLD_TICKS {
                expired.push(player.connection_id);
            }
        }
    }

    for connection_id in &expired {
        world.remove_player(connection_id);
    }
    expired
}

/// Age missiles, drop the expired ones and move the rest
fn move_missiles(world: &mut World) -> u32 {
    let field = world.field;
    let before = world.missiles.len();

    world.missiles.retain(|_, missile| {
        missile.alive_flame = missile.alive_flame.saturating_sub(1);
        if missile.alive_flame == 0 {
            return false;
        }
        let (x, y) = field.advance(missile.x, missile.y, missile.direction, MISSILE_SPEED);
        missile.x = x;
        missile.y = y;
        true
    });

    (before - world.missiles.len()) as u32
}

/// Tick the alive clock; every full second costs one air and scores one point
fn deplete_air(world: &mut World) -> Vec<Uuid> {
    let mut suffocated = Vec::new();

    for player in world.players.values_mut().filter(|p| p.is_alive) {
        player.alive_time.clock += 1;
        if player.alive_time.clock < TICKS_PER_AIR_SECOND {
            continue;
        }

        player.alive_time.clock = 0;
        player.alive_time.seconds += 1;
        player.air_time = player.air_time.saturating_sub(1);
        player.score += 1;

        if player.air_time == 0 && player.kill() {
            info!(player_id = %player.player_id, score = player.score, "Submarine ran out of air");
            suffocated.push(player.connection_id);
        }
    }

    suffocated
}
