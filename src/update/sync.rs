//! Per-tick replication pass
//!
//! Keeps, for every registered receiver, the set of objects that receiver has
//! been sent a create block for. Each tick this builds one frame per receiver
//! containing:
//! - create blocks for objects entering view
//! - values blocks for known objects that changed
//! - out-of-range GUIDs for known objects that left view
//! - destroy GUIDs for known objects that no longer exist
//!
//! Change masks are cleared only after every receiver was served, so all
//! receivers see the same changes.
//!
//! A receiver's known set only advances when its frame was built. If the frame
//! is rejected, the objects whose values blocks were lost are marked stale and
//! get a full values block on the next tick.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use super::builder::{build_create_block, build_full_values_block, build_values_block};
use super::frame::ReplicationFrame;
use super::viewer::VisibilityPolicy;
use super::WriteOptions;
use crate::game::entity::WorldEntity;
use crate::game::guid::ObjectGuid;
use crate::net::buffer::{PacketBuffer, MAX_PACKET_SIZE};

/// Sync settings
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Map id written into every frame
    pub map_id: u16,
    /// Largest packet a frame may produce
    pub max_frame_size: usize,
    pub write_options: WriteOptions,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            map_id: 0,
            max_frame_size: MAX_PACKET_SIZE,
            write_options: WriteOptions::default(),
        }
    }
}

/// What one receiver has been told so far
#[derive(Debug, Clone, Default)]
pub struct ReceiverState {
    /// Objects the receiver holds a create block for
    pub known: HashSet<ObjectGuid>,
    /// Known objects whose last values block never reached the receiver
    pub stale: HashSet<ObjectGuid>,
    /// Frames produced for this receiver
    pub frames_sent: u64,
}

/// Replication bookkeeping for every receiver
pub struct ReplicationSync {
    config: SyncConfig,
    states: RwLock<HashMap<ObjectGuid, ReceiverState>>,
}

impl ReplicationSync {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self {
            config,
            states: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start replicating to `receiver`
    pub fn register(&self, receiver: ObjectGuid) {
        self.states.write().entry(receiver).or_default();
        debug!(receiver = %receiver, "Registered receiver for replication");
    }

    /// Stop replicating to `receiver` and forget what it knew
    pub fn unregister(&self, receiver: ObjectGuid) {
        self.states.write().remove(&receiver);
        debug!(receiver = %receiver, "Unregistered receiver from replication");
    }

    pub fn is_registered(&self, receiver: ObjectGuid) -> bool {
        self.states.read().contains_key(&receiver)
    }

    /// Whether `receiver` was sent a create block for `object`
    pub fn is_known(&self, receiver: ObjectGuid, object: ObjectGuid) -> bool {
        self.states
            .read()
            .get(&receiver)
            .map_or(false, |state| state.known.contains(&object))
    }

    pub fn receiver_count(&self) -> usize {
        self.states.read().len()
    }

    /// Whether `object` is waiting for a full values block
    pub fn is_stale(&self, receiver: ObjectGuid, object: ObjectGuid) -> bool {
        self.states
            .read()
            .get(&receiver)
            .map_or(false, |state| state.stale.contains(&object))
    }

    /// Frames produced for `receiver` so far
    pub fn frames_sent(&self, receiver: ObjectGuid) -> u64 {
        self.states
            .read()
            .get(&receiver)
            .map_or(0, |state| state.frames_sent)
    }

    /// Build this tick's frame for every receiver, then clear all change masks
    ///
    /// Receivers with nothing to receive get no packet.
    pub fn process_tick(
        &self,
        entities: &mut HashMap<ObjectGuid, WorldEntity>,
        policy: &dyn VisibilityPolicy,
    ) -> HashMap<ObjectGuid, PacketBuffer> {
        let mut packets = HashMap::new();
        let mut guids: Vec<ObjectGuid> = entities.keys().copied().collect();
        guids.sort();

        {
            let mut states = self.states.write();
            for (&receiver, state) in states.iter_mut() {
                let draft = self.build_frame(receiver, state, &guids, entities, policy);
                let frame = draft.frame;
                if !frame.has_data() {
                    continue;
                }

                match frame.build_packet(self.config.max_frame_size) {
                    Ok(packet) => {
                        state.known = draft.known;
                        state.stale.clear();
                        state.frames_sent += 1;
                        trace!(
                            receiver = %receiver,
                            blocks = frame.block_count(),
                            size = packet.len(),
                            "Built replication frame"
                        );
                        packets.insert(receiver, packet);
                    }
                    Err(e) => {
                        state.stale.extend(draft.values_sent);
                        warn!(
                            receiver = %receiver,
                            error = %e,
                            stale = state.stale.len(),
                            "Failed to build replication frame"
                        );
                    }
                }
            }
        }

        let mut cleared = 0;
        for entity in entities.values_mut() {
            if entity.is_changed() {
                entity.clear_update_mask();
                cleared += 1;
            }
        }

        debug!(
            receivers = self.receiver_count(),
            packets = packets.len(),
            cleared = cleared,
            "Replication tick processed"
        );

        packets
    }

    /// Build `receiver`'s frame against a copy of what it knows
    fn build_frame(
        &self,
        receiver: ObjectGuid,
        state: &ReceiverState,
        guids: &[ObjectGuid],
        entities: &HashMap<ObjectGuid, WorldEntity>,
        policy: &dyn VisibilityPolicy,
    ) -> FrameDraft {
        let options = self.config.write_options;
        let mut frame = ReplicationFrame::new(self.config.map_id);
        let mut known = state.known.clone();
        let mut values_sent = Vec::new();

        for guid in guids {
            let Some(entity) = entities.get(guid) else {
                continue;
            };
            let in_range = *guid == receiver || policy.is_in_range(*guid, receiver);
            let is_known = known.contains(guid);

            match (in_range, is_known) {
                (true, false) => {
                    frame.add_block(&build_create_block(entity, receiver, policy, options));
                    known.insert(*guid);
                }
                (true, true) => {
                    let block = if state.stale.contains(guid) {
                        Some(build_full_values_block(entity, receiver, policy, options))
                    } else {
                        build_values_block(entity, receiver, policy, options)
                    };
                    if let Some(block) = block {
                        frame.add_block(&block);
                        values_sent.push(*guid);
                    }
                }
                (false, true) => {
                    frame.add_out_of_range(*guid);
                    known.remove(guid);
                }
                (false, false) => {}
            }
        }

        let destroyed: Vec<ObjectGuid> = known
            .iter()
            .filter(|guid| !entities.contains_key(*guid))
            .copied()
            .collect();
        for guid in destroyed {
            frame.add_destroy(guid);
            known.remove(&guid);
        }

        FrameDraft {
            frame,
            known,
            values_sent,
        }
    }
}

/// A frame plus the receiver state it would leave behind once delivered
struct FrameDraft {
    frame: ReplicationFrame,
    known: HashSet<ObjectGuid>,
    values_sent: Vec<ObjectGuid>,
}

impl Default for ReplicationSync {
    fn default() -> Self {
        Self::new()
    }
}
