//! In-memory relationship table
//!
//! A plain [`VisibilityPolicy`] backed by lookup tables. The world fills it in
//! as groups form, creatures get tapped and so on; the replication pass only
//! reads it.

use std::collections::{HashMap, HashSet};

use crate::game::guid::ObjectGuid;
use crate::update::viewer::{ViewerFlags, VisibilityPolicy};

type Pair = (ObjectGuid, ObjectGuid);

/// Relationship and permission lookups keyed by (object, receiver)
#[derive(Debug, Clone, Default)]
pub struct RelationTable {
    receivers: HashSet<ObjectGuid>,
    relations: HashMap<Pair, ViewerFlags>,
    factions: HashMap<ObjectGuid, u32>,
    cross_faction: HashSet<Pair>,
    out_of_range: HashSet<Pair>,
    looters: HashSet<Pair>,
    tappers: HashMap<ObjectGuid, ObjectGuid>,
    skinned: HashSet<Pair>,
    gossip_hidden: HashSet<Pair>,
    spell_click_hidden: HashSet<Pair>,
    game_masters: HashMap<ObjectGuid, u32>,
}

impl RelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `receiver` resolvable; unknown receivers are treated as strangers
    pub fn add_receiver(&mut self, receiver: ObjectGuid) {
        self.receivers.insert(receiver);
    }

    pub fn remove_receiver(&mut self, receiver: ObjectGuid) {
        self.receivers.remove(&receiver);
        self.relations.retain(|(_, r), _| *r != receiver);
    }

    /// Grant `flags` to `receiver` when looking at `object`
    pub fn relate(&mut self, object: ObjectGuid, receiver: ObjectGuid, flags: ViewerFlags) {
        *self.relations.entry((object, receiver)).or_default() |= flags;
    }

    pub fn set_faction(&mut self, guid: ObjectGuid, faction_template: u32) {
        self.factions.insert(guid, faction_template);
    }

    pub fn set_cross_faction_party(&mut self, object: ObjectGuid, receiver: ObjectGuid) {
        self.cross_faction.insert((object, receiver));
    }

    pub fn set_in_range(&mut self, object: ObjectGuid, receiver: ObjectGuid, in_range: bool) {
        if in_range {
            self.out_of_range.remove(&(object, receiver));
        } else {
            self.out_of_range.insert((object, receiver));
        }
    }

    pub fn allow_loot(&mut self, object: ObjectGuid, receiver: ObjectGuid) {
        self.looters.insert((object, receiver));
    }

    pub fn set_tapper(&mut self, object: ObjectGuid, tapper: ObjectGuid) {
        self.tappers.insert(object, tapper);
    }

    pub fn mark_skinned(&mut self, object: ObjectGuid, receiver: ObjectGuid) {
        self.skinned.insert((object, receiver));
    }

    pub fn hide_gossip(&mut self, object: ObjectGuid, receiver: ObjectGuid) {
        self.gossip_hidden.insert((object, receiver));
    }

    pub fn hide_spell_click(&mut self, object: ObjectGuid, receiver: ObjectGuid) {
        self.spell_click_hidden.insert((object, receiver));
    }

    /// Show every unit to `receiver` with `display_id`
    pub fn set_game_master(&mut self, receiver: ObjectGuid, display_id: u32) {
        self.game_masters.insert(receiver, display_id);
    }
}

impl VisibilityPolicy for RelationTable {
    fn relationship(&self, object: ObjectGuid, receiver: ObjectGuid) -> Option<ViewerFlags> {
        if !self.receivers.contains(&receiver) {
            return None;
        }
        Some(
            self.relations
                .get(&(object, receiver))
                .copied()
                .unwrap_or_default(),
        )
    }

    fn is_in_range(&self, object: ObjectGuid, receiver: ObjectGuid) -> bool {
        !self.out_of_range.contains(&(object, receiver))
    }

    fn is_cross_faction_party_member(&self, object: ObjectGuid, receiver: ObjectGuid) -> bool {
        self.cross_faction.contains(&(object, receiver))
    }

    fn faction_template_of(&self, receiver: ObjectGuid) -> Option<u32> {
        self.factions.get(&receiver).copied()
    }

    fn can_loot(&self, object: ObjectGuid, receiver: ObjectGuid) -> bool {
        self.looters.contains(&(object, receiver))
    }

    fn is_tapped_by_other(&self, object: ObjectGuid, receiver: ObjectGuid) -> bool {
        self.tappers
            .get(&object)
            .map_or(false, |tapper| *tapper != receiver)
    }

    fn is_skinned_by(&self, object: ObjectGuid, receiver: ObjectGuid) -> bool {
        self.skinned.contains(&(object, receiver))
    }

    fn can_see_gossip(&self, object: ObjectGuid, receiver: ObjectGuid) -> bool {
        !self.gossip_hidden.contains(&(object, receiver))
    }

    fn can_see_spell_click(&self, object: ObjectGuid, receiver: ObjectGuid) -> bool {
        !self.spell_click_hidden.contains(&(object, receiver))
    }

    fn game_master_display(&self, object: ObjectGuid, receiver: ObjectGuid) -> Option<u32> {
        if object == receiver {
            return None;
        }
        self.game_masters.get(&receiver).copied()
    }
}
