//! Game engine actor and authoritative tick loop
//!
//! A single task owns the [`World`]. Sockets talk to it through a
//! [`GameHandle`]; commands are applied as soon as they arrive, the world
//! advances on a fixed interval, and every `snapshot_every_ticks` ticks the
//! serialized map is published on a `watch` channel.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::util::time::{Timer, DEFAULT_SNAPSHOT_EVERY_TICKS, DEFAULT_TICK_MILLIS};
use crate::ws::codec::CodecError;
use crate::ws::protocol::{ClientMsg, StartData};

use super::simulation::step;
use super::snapshot::{SnapshotBuilder, SnapshotStats};
use super::world::{World, WorldError, WorldSettings, MISSILE_SPEED, SUBMARINE_SPEED};

const COMMAND_CHANNEL_SIZE: usize = 1024;
const STATS_LOG_EVERY_TICKS: u64 = 30 * 60;

/// Engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("world setup failed: {0}")]
    World(#[from] WorldError),

    #[error("snapshot encoding failed: {0}")]
    Codec(#[from] CodecError),

    #[error("game engine is not running")]
    Stopped,
}

/// Everything the engine needs to start
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub world: WorldSettings,
    pub tick_period: Duration,
    pub snapshot_every_ticks: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            world: WorldSettings::default(),
            tick_period: Duration::from_millis(DEFAULT_TICK_MILLIS),
            snapshot_every_ticks: DEFAULT_SNAPSHOT_EVERY_TICKS,
        }
    }
}

/// Commands sent from connections to the engine task
#[derive(Debug)]
pub enum GameCommand {
    Connect {
        connection_id: Uuid,
        display_name: String,
        thumb_url: String,
        reply: oneshot::Sender<StartData>,
    },
    Input {
        connection_id: Uuid,
        msg: ClientMsg,
    },
    Disconnect {
        connection_id: Uuid,
    },
}

/// Handle to the running engine
#[derive(Clone)]
pub struct GameHandle {
    command_tx: mpsc::Sender<GameCommand>,
    snapshot_rx: watch::Receiver<Arc<str>>,
    player_count: Arc<AtomicUsize>,
    tick: Arc<AtomicU64>,
}

impl GameHandle {
    /// Spawn a player for this connection and wait for its start data
    pub async fn connect(
        &self,
        connection_id: Uuid,
        display_name: String,
        thumb_url: String,
    ) -> Result<StartData, EngineError> {
        let (reply, reply_rx) = oneshot::channel();
        self.command_tx
            .send(GameCommand::Connect {
                connection_id,
                display_name,
                thumb_url,
                reply,
            })
            .await
            .map_err(|_| EngineError::Stopped)?;
        reply_rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Forward a parsed client message
    pub async fn send_input(&self, connection_id: Uuid, msg: ClientMsg) -> Result<(), EngineError> {
        self.command_tx
            .send(GameCommand::Input { connection_id, msg })
            .await
            .map_err(|_| EngineError::Stopped)
    }

    /// Remove the connection's player immediately
    pub async fn disconnect(&self, connection_id: Uuid) -> Result<(), EngineError> {
        self.command_tx
            .send(GameCommand::Disconnect { connection_id })
            .await
            .map_err(|_| EngineError::Stopped)
    }

    /// Receiver of serialized `map_data` frames. Only the latest one is kept.
    pub fn subscribe(&self) -> watch::Receiver<Arc<str>> {
        self.snapshot_rx.clone()
    }

    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Relaxed)
    }
}

/// The authoritative game engine
pub struct GameEngine {
    world: World,
    field_width: u32,
    field_height: u32,
    tick_period: Duration,
    command_rx: mpsc::Receiver<GameCommand>,
    snapshot_tx: watch::Sender<Arc<str>>,
    snapshot_builder: SnapshotBuilder,
    stats: SnapshotStats,
    player_count: Arc<AtomicUsize>,
    tick: Arc<AtomicU64>,
}

impl GameEngine {
    /// Build the world and the channels around it
    pub fn new(settings: &EngineSettings) -> Result<(Self, GameHandle), EngineError> {
        let world = World::new(&settings.world)?;
        let snapshot_builder = SnapshotBuilder::new(settings.snapshot_every_ticks);
        let initial = snapshot_builder.build(&world)?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);
        let player_count = Arc::new(AtomicUsize::new(0));
        let tick = Arc::new(AtomicU64::new(0));

        let handle = GameHandle {
            command_tx,
            snapshot_rx,
            player_count: player_count.clone(),
            tick: tick.clone(),
        };

        let engine = Self {
            world,
            field_width: settings.world.field_width,
            field_height: settings.world.field_height,
            tick_period: settings.tick_period,
            command_rx,
            snapshot_tx,
            snapshot_builder,
            stats: SnapshotStats::default(),
            player_count,
            tick,
        };

        Ok((engine, handle))
    }

    /// Run until every [`GameHandle`] has been dropped
    pub async fn run(mut self) {
        info!(
            tick_ms = self.tick_period.as_millis() as u64,
            width = self.field_width,
            height = self.field_height,
            "Game engine started"
        );

        let mut tick_interval = interval(self.tick_period);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = tick_interval.tick() => self.run_tick(),
            }
        }

        info!(
            ticks = self.world.tick,
            snapshots = self.stats.total_snapshots,
            "Game engine stopped"
        );
    }

    fn handle_command(&mut self, command: GameCommand) {
        match command {
            GameCommand::Connect {
                connection_id,
                display_name,
                thumb_url,
                reply,
            } => self.handle_connect(connection_id, display_name, thumb_url, reply),
            GameCommand::Input { connection_id, msg } => self.handle_input(connection_id, msg),
            GameCommand::Disconnect { connection_id } => self.handle_disconnect(connection_id),
        }
    }

    fn handle_connect(
        &mut self,
        connection_id: Uuid,
        display_name: String,
        thumb_url: String,
        reply: oneshot::Sender<StartData>,
    ) {
        let player_obj = self
            .world
            .spawn_player(connection_id, display_name, thumb_url)
            .info();
        self.sync_player_count();
        self.snapshot_builder.force_next();

        let start = StartData {
            player_obj,
            field_width: self.field_width,
            field_height: self.field_height,
            submarine_speed: SUBMARINE_SPEED,
            missile_speed: MISSILE_SPEED,
        };

        if reply.send(start).is_err() {
            // Socket went away before the reply; its disconnect follows.
            debug!(connection_id = %connection_id, "Connect reply dropped");
        }

        info!(
            connection_id = %connection_id,
            player_count = self.world.players.len(),
            "Player connected"
        );
    }

    fn handle_input(&mut self, connection_id: Uuid, msg: ClientMsg) {
        match msg {
            ClientMsg::ChangeDirection { direction } => {
                if !self.world.apply_direction(&connection_id, direction) {
                    debug!(connection_id = %connection_id, "Direction change for unknown player");
                }
            }
            ClientMsg::MissileEmit { direction } => {
                match self.world.fire_request(&connection_id, direction) {
                    Some(missile) => trace!(
                        connection_id = %connection_id,
                        missile_id = %missile.id,
                        "Missile emitted"
                    ),
                    None => debug!(connection_id = %connection_id, "Missile request refused"),
                }
            }
        }
    }

    fn handle_disconnect(&mut self, connection_id: Uuid) {
        if self.world.remove_player(&connection_id).is_some() {
            self.sync_player_count();
            info!(
                connection_id = %connection_id,
                player_count = self.world.players.len(),
                "Player disconnected"
            );
        }
    }

    fn run_tick(&mut self) {
        let timer = Timer::new();
        let report = step(&mut self.world);

        if !report.removed.is_empty() {
            self.sync_player_count();
        }
        self.tick.store(report.tick, Ordering::Relaxed);

        if self.snapshot_builder.should_send() {
            match self.snapshot_builder.build(&self.world) {
                Ok(frame) => {
                    self.stats.record(self.world.players.len(), frame.len());
                    self.snapshot_tx.send_replace(frame);
                }
                Err(e) => warn!(tick = report.tick, error = %e, "Failed to encode snapshot"),
            }
        }

        if report.tick % STATS_LOG_EVERY_TICKS == 0 {
            debug!(
                tick = report.tick,
                snapshots = self.stats.total_snapshots,
                avg_bytes = self.stats.avg_bytes(),
                avg_players = self.stats.avg_players_per_snapshot,
                "Snapshot stats"
            );
        }

        let elapsed = timer.elapsed();
        if elapsed > self.tick_period {
            warn!(
                tick = report.tick,
                elapsed_us = timer.elapsed_micros(),
                "Tick overran its period"
            );
        }
    }

    fn sync_player_count(&self) {
        self.player_count
            .store(self.world.players.len(), Ordering::Relaxed);
    }
}

/// Build the engine and spawn it on the current runtime
pub fn spawn_engine(settings: &EngineSettings) -> Result<GameHandle, EngineError> {
    let (engine, handle) = GameEngine::new(settings)?;
    tokio::spawn(engine.run());
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::codec::decode_json;
    use crate::ws::protocol::Direction;
    use tokio::time::timeout;

    fn fast_settings() -> EngineSettings {
        EngineSettings {
            world: WorldSettings {
                field_width: 400,
                field_height: 300,
                item_total: 5,
                air_total: 3,
                seed: 42,
            },
            tick_period: Duration::from_millis(5),
            snapshot_every_ticks: 1,
        }
    }

    /// Wait for the next published frame that satisfies `pred`
    async fn next_frame_where(
        rx: &mut watch::Receiver<Arc<str>>,
        pred: impl Fn(&str) -> bool,
    ) -> Arc<str> {
        timeout(Duration::from_secs(5), async {
            loop {
                rx.changed().await.unwrap();
                let frame = rx.borrow_and_update().clone();
                if pred(&frame) {
                    return frame;
                }
            }
        })
        .await
        .expect("no matching snapshot published")
    }

    #[test]
    fn test_new_rejects_bad_world() {
        let mut settings = fast_settings();
        settings.world.field_width = 0;
        assert!(matches!(
            GameEngine::new(&settings),
            Err(EngineError::World(WorldError::EmptyField(0, 300)))
        ));
    }

    #[test]
    fn test_initial_frame_has_pickups() {
        let (_engine, handle) = GameEngine::new(&fast_settings()).unwrap();
        let frame = handle.subscribe().borrow().clone();
        let decoded = decode_json(&frame).unwrap();
        assert!(decoded.players.is_empty());
        assert_eq!(decoded.items.len(), 5);
        assert_eq!(decoded.airs.len(), 3);
        assert_eq!(handle.player_count(), 0);
        assert_eq!(handle.tick(), 0);
    }

    #[tokio::test]
    async fn test_connect_returns_start_data() {
        let handle = spawn_engine(&fast_settings()).unwrap();
        let connection_id = Uuid::new_v4();

        let start = tokio_test::assert_ok!(
            handle
                .connect(connection_id, "nemo".to_string(), "thumb.png".to_string())
                .await
        );

        assert_eq!(start.field_width, 400);
        assert_eq!(start.field_height, 300);
        assert_eq!(start.submarine_speed, SUBMARINE_SPEED);
        assert_eq!(start.missile_speed, MISSILE_SPEED);
        assert_eq!(start.player_obj.display_name, "nemo");
        assert_eq!(start.player_obj.thumb_url, "thumb.png");
        assert!(start.player_obj.is_alive);
        assert_eq!(handle.player_count(), 1);
    }

    #[tokio::test]
    async fn test_snapshots_follow_connect_input_and_disconnect() {
        let handle = spawn_engine(&fast_settings()).unwrap();
        let mut rx = handle.subscribe();
        let connection_id = Uuid::new_v4();
        let start = handle
            .connect(connection_id, "a".to_string(), String::new())
            .await
            .unwrap();
        let player_id = start.player_obj.player_id.clone();

        let pid = player_id.clone();
        next_frame_where(&mut rx, |f| {
            decode_json(f).map(|m| m.players.contains_key(&pid)).unwrap_or(false)
        })
        .await;

        tokio_test::assert_ok!(
            handle
                .send_input(
                    connection_id,
                    ClientMsg::ChangeDirection {
                        direction: Direction::Up,
                    },
                )
                .await
        );

        let pid = player_id.clone();
        next_frame_where(&mut rx, |f| {
            decode_json(f)
                .ok()
                .and_then(|m| m.players.get(&pid).map(|p| p.direction == Direction::Up))
                .unwrap_or(false)
        })
        .await;

        tokio_test::assert_ok!(handle.disconnect(connection_id).await);
        next_frame_where(&mut rx, |f| {
            decode_json(f).map(|m| m.players.is_empty()).unwrap_or(false)
        })
        .await;
        assert_eq!(handle.player_count(), 0);
        assert!(handle.tick() > 0);
    }

    #[tokio::test]
    async fn test_input_from_unknown_connection_is_ignored() {
        let handle = spawn_engine(&fast_settings()).unwrap();
        tokio_test::assert_ok!(
            handle
                .send_input(
                    Uuid::new_v4(),
                    ClientMsg::MissileEmit {
                        direction: Direction::Left,
                    },
                )
                .await
        );
        tokio_test::assert_ok!(handle.disconnect(Uuid::new_v4()).await);
        assert_eq!(handle.player_count(), 0);
    }

    #[tokio::test]
    async fn test_engine_stops_when_handles_dropped() {
        let (engine, handle) = GameEngine::new(&fast_settings()).unwrap();
        let task = tokio::spawn(engine.run());
        drop(handle);
        let joined = tokio_test::assert_ok!(timeout(Duration::from_secs(5), task).await);
        tokio_test::assert_ok!(joined);
    }

    #[tokio::test]
    async fn test_stopped_engine_reports_error() {
        let (engine, handle) = GameEngine::new(&fast_settings()).unwrap();
        drop(engine);
        let result = handle
            .connect(Uuid::new_v4(), "late".to_string(), String::new())
            .await;
        assert!(matches!(result, Err(EngineError::Stopped)));
    }
}
