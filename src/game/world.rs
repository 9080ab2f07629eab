//! World module
//!
//! Owns the replicated entities and drives the tick loop:
//! - simulation step (caller supplied)
//! - replication pass building one frame per receiver
//! - delivery of the frames (caller supplied)

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::ReplicationConfig;
use crate::error::Result;
use crate::game::entity::WorldEntity;
use crate::game::guid::ObjectGuid;
use crate::game::relations::RelationTable;
use crate::net::buffer::PacketBuffer;
use crate::update::sync::{ReplicationSync, SyncConfig};

/// Default tick rate in milliseconds
pub const TICK_RATE_MS: u64 = 600;

/// World settings
#[derive(Debug, Clone)]
pub struct WorldSettings {
    /// Map this world simulates
    pub map_id: u16,
    /// Tick rate in milliseconds
    pub tick_rate_ms: u64,
    /// Replication settings
    pub sync: SyncConfig,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            map_id: 0,
            tick_rate_ms: TICK_RATE_MS,
            sync: SyncConfig::default(),
        }
    }
}

impl WorldSettings {
    pub fn from_config(config: &ReplicationConfig) -> Self {
        Self {
            map_id: config.map_id,
            tick_rate_ms: config.tick_rate_ms,
            sync: SyncConfig {
                map_id: config.map_id,
                max_frame_size: config.max_frame_size,
                write_options: config.write_options(),
            },
        }
    }
}

/// World state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldState {
    Initializing,
    Running,
    Stopped,
}

/// Entity store plus the replication bookkeeping for its receivers
pub struct ReplicaWorld {
    pub settings: WorldSettings,
    state: RwLock<WorldState>,
    tick: AtomicU64,
    running: AtomicBool,
    start_time: RwLock<Option<Instant>>,
    entities: RwLock<HashMap<ObjectGuid, WorldEntity>>,
    relations: RwLock<RelationTable>,
    sync: ReplicationSync,
}

impl ReplicaWorld {
    pub fn new(settings: WorldSettings) -> Self {
        info!(
            map_id = settings.map_id,
            tick_rate_ms = settings.tick_rate_ms,
            "Creating replica world"
        );

        let sync = ReplicationSync::with_config(settings.sync);
        Self {
            settings,
            state: RwLock::new(WorldState::Initializing),
            tick: AtomicU64::new(0),
            running: AtomicBool::new(false),
            start_time: RwLock::new(None),
            entities: RwLock::new(HashMap::new()),
            relations: RwLock::new(RelationTable::new()),
            sync,
        }
    }

    pub fn state(&self) -> WorldState {
        *self.state.read()
    }

    fn set_state(&self, new_state: WorldState) {
        let mut state = self.state.write();
        let old_state = *state;
        *state = new_state;
        info!(
            old_state = ?old_state,
            new_state = ?new_state,
            "World state changed"
        );
    }

    /// Ticks processed so far
    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the tick loop to exit after the current tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .read()
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// Add an entity, replacing any entity with the same GUID
    pub fn spawn(&self, entity: WorldEntity) -> ObjectGuid {
        let guid = entity.guid();
        debug!(guid = %guid, type_id = ?entity.type_id(), "Spawning entity");
        self.entities.write().insert(guid, entity);
        guid
    }

    /// Spawn a player after checking its name fits the wire format
    pub fn spawn_player(&self, guid: ObjectGuid, name: &str) -> Result<ObjectGuid> {
        let player = WorldEntity::new_player(guid, name)?;
        Ok(self.spawn(player))
    }

    /// Remove an entity; receivers that knew it get a destroy next tick
    pub fn despawn(&self, guid: ObjectGuid) -> Option<WorldEntity> {
        let removed = self.entities.write().remove(&guid);
        if removed.is_some() {
            debug!(guid = %guid, "Despawned entity");
        }
        removed
    }

    pub fn entity_count(&self) -> usize {
        self.entities.read().len()
    }

    /// Read an entity
    pub fn with_entity<R>(&self, guid: ObjectGuid, f: impl FnOnce(&WorldEntity) -> R) -> Option<R> {
        self.entities.read().get(&guid).map(f)
    }

    /// Mutate an entity; changes go out on the next tick
    pub fn with_entity_mut<R>(
        &self,
        guid: ObjectGuid,
        f: impl FnOnce(&mut WorldEntity) -> R,
    ) -> Option<R> {
        self.entities.write().get_mut(&guid).map(f)
    }

    /// Update the relationship table
    pub fn with_relations<R>(&self, f: impl FnOnce(&mut RelationTable) -> R) -> R {
        f(&mut self.relations.write())
    }

    /// Start replicating to `receiver`
    pub fn add_receiver(&self, receiver: ObjectGuid) {
        self.relations.write().add_receiver(receiver);
        self.sync.register(receiver);
    }

    pub fn remove_receiver(&self, receiver: ObjectGuid) {
        self.sync.unregister(receiver);
        self.relations.write().remove_receiver(receiver);
    }

    pub fn sync(&self) -> &ReplicationSync {
        &self.sync
    }

    /// Run one replication pass
    pub fn process_tick(&self) -> HashMap<ObjectGuid, PacketBuffer> {
        let tick_num = self.tick.fetch_add(1, Ordering::SeqCst);
        if tick_num % 1000 == 0 {
            debug!(
                tick = tick_num,
                entities = self.entity_count(),
                receivers = self.sync.receiver_count(),
                "World tick milestone"
            );
        }

        let mut entities = self.entities.write();
        let relations = self.relations.read();
        self.sync.process_tick(&mut entities, &*relations)
    }

    /// Tick until shutdown is signalled or [`stop`](Self::stop) is called
    ///
    /// `simulate` runs before each replication pass; `deliver` receives every
    /// frame built by it.
    pub async fn run<S, D>(
        &self,
        shutdown_rx: &mut broadcast::Receiver<()>,
        mut simulate: S,
        mut deliver: D,
    ) where
        S: FnMut(&Self, u64),
        D: FnMut(ObjectGuid, PacketBuffer),
    {
        info!(
            map_id = self.settings.map_id,
            tick_rate_ms = self.settings.tick_rate_ms,
            "Starting replica world"
        );

        self.running.store(true, Ordering::SeqCst);
        *self.start_time.write() = Some(Instant::now());
        self.set_state(WorldState::Running);

        let mut tick_interval = interval(Duration::from_millis(self.settings.tick_rate_ms));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    if !self.is_running() {
                        break;
                    }

                    simulate(self, self.tick());
                    for (receiver, packet) in self.process_tick() {
                        deliver(receiver, packet);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        self.set_state(WorldState::Stopped);

        info!(
            total_ticks = self.tick(),
            uptime_secs = self.uptime_secs(),
            "Replica world stopped"
        );
    }

    /// Get world info as a string
    pub fn info(&self) -> String {
        format!(
            "Map {} - {} entities - {} receivers - Tick {} - Uptime {}s",
            self.settings.map_id,
            self.entity_count(),
            self.sync.receiver_count(),
            self.tick(),
            self.uptime_secs()
        )
    }
}

impl std::fmt::Debug for ReplicaWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaWorld")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .field("tick", &self.tick())
            .field("running", &self.is_running())
            .field("entities", &self.entity_count())
            .field("receivers", &self.sync.receiver_count())
            .field("uptime_secs", &self.uptime_secs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::guid::HighGuid;

    fn test_settings() -> WorldSettings {
        WorldSettings {
            tick_rate_ms: 50,
            ..WorldSettings::default()
        }
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = ReplicationConfig::default();
        config.map_id = 530;
        config.max_frame_size = 4096;

        let settings = WorldSettings::from_config(&config);
        assert_eq!(settings.map_id, 530);
        assert_eq!(settings.sync.map_id, 530);
        assert_eq!(settings.sync.max_frame_size, 4096);
        assert_eq!(settings.tick_rate_ms, 600);
    }

    #[test]
    fn test_spawn_and_despawn() {
        let world = ReplicaWorld::new(test_settings());
        let guid = world.spawn(WorldEntity::new_creature(ObjectGuid::create(
            HighGuid::Creature,
            0,
            1,
            1,
        )));
        assert_eq!(world.entity_count(), 1);
        assert_eq!(world.with_entity(guid, |e| e.type_id()), Some(crate::game::entity::TypeId::Unit));

        assert!(world.despawn(guid).is_some());
        assert!(world.despawn(guid).is_none());
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_spawn_player_rejects_long_name() {
        let world = ReplicaWorld::new(test_settings());
        let name = "x".repeat(64);
        let result = world.spawn_player(ObjectGuid::player(7), &name);
        assert!(matches!(
            result,
            Err(crate::error::ReplicationError::Protocol(
                crate::error::ProtocolError::InvalidStringLength { length: 64, .. }
            ))
        ));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_process_tick_serves_receivers() {
        let world = ReplicaWorld::new(test_settings());
        let receiver = ObjectGuid::player(1);
        world.spawn(WorldEntity::new_player(receiver, "Anduin").unwrap());
        world.add_receiver(receiver);

        let packets = world.process_tick();
        assert!(!packets[&receiver].is_empty());
        assert!(packets[&receiver].len() > 11);
        assert_eq!(world.tick(), 1);

        assert!(world.process_tick().is_empty());

        world.with_entity_mut(receiver, |e| {
            e.object_mut().modify(|o| &mut o.scale).set(1.5);
        });
        assert!(world.process_tick().contains_key(&receiver));
    }

    #[test]
    fn test_world_state() {
        let world = ReplicaWorld::new(test_settings());
        assert_eq!(world.state(), WorldState::Initializing);
        assert!(!world.is_running());
        assert!(world.info().contains("Map 0"));
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let world = ReplicaWorld::new(test_settings());
        let receiver = ObjectGuid::player(1);
        world.spawn(WorldEntity::new_player(receiver, "Varian").unwrap());
        world.add_receiver(receiver);

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let mut delivered = 0;
        let mut simulated = 0;

        let run = world.run(
            &mut shutdown_rx,
            |world, tick| {
                simulated += 1;
                if tick >= 2 {
                    world.stop();
                }
            },
            |_, _| delivered += 1,
        );
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap();
        drop(shutdown_tx);

        assert_eq!(world.state(), WorldState::Stopped);
        assert!(simulated >= 3);
        assert!(delivered >= 1);
    }
}
