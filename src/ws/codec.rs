//! Map snapshot codec
//!
//! Encodes the world into the positional record arrays of [`MapSnapshot`] and
//! decodes them back into keyed collections on the receiving side.

use std::collections::HashMap;

use crate::game::world::World;

use super::protocol::{
    Direction, MapSnapshot, MissileRecord, PickupRecord, PlayerRecord, ServerMsg, WIRE_VERSION,
};

/// Codec errors
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unsupported snapshot version {found}, expected {expected}")]
    UnsupportedVersion { found: u8, expected: u8 },

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("expected map data, got another message")]
    NotMapData,
}

/// A player as seen in a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerView {
    pub x: f32,
    pub y: f32,
    pub player_id: String,
    pub display_name: String,
    pub score: u32,
    pub is_alive: bool,
    pub direction: Direction,
    pub missiles_many: u8,
    pub air_time: u8,
    pub dead_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickupView {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissileView {
    pub x: f32,
    pub y: f32,
    pub direction: Direction,
    pub emit_player_id: String,
}

/// Decoded snapshot: players keyed by id, everything else by position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedMap {
    pub players: HashMap<String, PlayerView>,
    pub items: Vec<PickupView>,
    pub airs: Vec<PickupView>,
    pub missiles: Vec<MissileView>,
}

/// Encode the current world state
pub fn encode(world: &World) -> MapSnapshot {
    let players = world
        .players
        .values()
        .map(|p| {
            PlayerRecord(
                p.x,
                p.y,
                p.player_id.clone(),
                p.display_name.clone(),
                p.score,
                p.is_alive,
                p.direction,
                p.missiles_many,
                p.air_time,
                p.dead_count,
            )
        })
        .collect();

    let items = world.items.values().map(|i| PickupRecord(i.x, i.y)).collect();
    let airs = world.airs.values().map(|a| PickupRecord(a.x, a.y)).collect();
    let missiles = world
        .missiles
        .values()
        .map(|m| MissileRecord(m.x, m.y, m.direction, m.emit_player_id.clone()))
        .collect();

    MapSnapshot(WIRE_VERSION, players, items, airs, missiles)
}

/// Encode and serialize as a `map_data` message
pub fn encode_json(world: &World) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&ServerMsg::MapData(encode(world)))?)
}

/// Rebuild keyed collections from a snapshot
pub fn decode(snapshot: &MapSnapshot) -> Result<DecodedMap, CodecError> {
    let MapSnapshot(version, players, items, airs, missiles) = snapshot;
    if *version != WIRE_VERSION {
        return Err(CodecError::UnsupportedVersion {
            found: *version,
            expected: WIRE_VERSION,
        });
    }

    let players = players
        .iter()
        .map(|r| {
            let view = PlayerView {
                x: r.0,
                y: r.1,
                player_id: r.2.clone(),
                display_name: r.3.clone(),
                score: r.4,
                is_alive: r.5,
                direction: r.6,
                missiles_many: r.7,
                air_time: r.8,
                dead_count: r.9,
            };
            (view.player_id.clone(), view)
        })
        .collect();

    let pickup = |r: &PickupRecord| PickupView { x: r.0, y: r.1 };

    Ok(DecodedMap {
        players,
        items: items.iter().map(pickup).collect(),
        airs: airs.iter().map(pickup).collect(),
        missiles: missiles
            .iter()
            .map(|r| MissileView {
                x: r.0,
                y: r.1,
                direction: r.2,
                emit_player_id: r.3.clone(),
            })
            .collect(),
    })
}

/// Parse a `map_data` message and decode it
pub fn decode_json(text: &str) -> Result<DecodedMap, CodecError> {
    match serde_json::from_str::<ServerMsg>(text)? {
        ServerMsg::MapData(snapshot) => decode(&snapshot),
        ServerMsg::StartData(_) => Err(CodecError::NotMapData),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::world::{Missile, WorldSettings};
    use uuid::Uuid;

    fn small_world() -> World {
        World::new(&WorldSettings {
            field_width: 200,
            field_height: 100,
            item_total: 3,
            air_total: 2,
            seed: 11,
        })
        .unwrap()
    }

    #[test]
    fn test_encode_field_order() {
        let mut world = small_world();
        let id = Uuid::new_v4();
        world.spawn_player(id, "nemo".to_string(), "t.png".to_string());
        {
            let p = world.players.get_mut(&id).unwrap();
            p.x = 12.0;
            p.y = 34.0;
            p.score = 5;
            p.missiles_many = 2;
            p.air_time = 80;
        }
        let player_id = world.players[&id].player_id.clone();
        world.missiles.insert(
            "m".to_string(),
            Missile {
                id: "m".to_string(),
                emit_player_id: player_id.clone(),
                x: 1.0,
                y: 2.0,
                direction: Direction::Down,
                alive_flame: 9,
            },
        );

        let MapSnapshot(version, players, items, airs, missiles) = encode(&world);
        assert_eq!(version, WIRE_VERSION);
        assert_eq!(items.len(), 3);
        assert_eq!(airs.len(), 2);
        assert_eq!(
            players,
            vec![PlayerRecord(
                12.0,
                34.0,
                player_id.clone(),
                "nemo".to_string(),
                5,
                true,
                Direction::Right,
                2,
                80,
                0
            )]
        );
        assert_eq!(missiles, vec![MissileRecord(1.0, 2.0, Direction::Down, player_id)]);
    }

    #[test]
    fn test_decode_keys_players_by_id() {
        let mut world = small_world();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        world.spawn_player(a, "a".to_string(), String::new());
        world.spawn_player(b, "b".to_string(), String::new());

        let decoded = decode_json(&encode_json(&world).unwrap()).unwrap();

        assert_eq!(decoded.players.len(), 2);
        let pa = &decoded.players[&world.players[&a].player_id];
        assert_eq!(pa.display_name, "a");
        assert_eq!(pa.x, world.players[&a].x);
        assert_eq!(decoded.items.len(), 3);
        assert_eq!(decoded.airs.len(), 2);
        assert!(decoded.missiles.is_empty());
    }

    #[test]
    fn test_decode_rejects_other_versions() {
        let snapshot = MapSnapshot(WIRE_VERSION + 1, vec![], vec![], vec![], vec![]);
        assert!(matches!(
            decode(&snapshot),
            Err(CodecError::UnsupportedVersion { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn test_decode_json_errors() {
        assert!(matches!(decode_json("not json"), Err(CodecError::Malformed(_))));
        assert!(matches!(
            decode_json(r#"{"type":"map_data","data":[1,[[1.0]],[],[],[]]}"#),
            Err(CodecError::Malformed(_))
        ));
    }
}
