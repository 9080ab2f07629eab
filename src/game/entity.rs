//! Replicated world entities
//!
//! A [`WorldEntity`] is a GUID plus a set of fragments. Every entity carries
//! [`ObjectData`]; the other fragments are present depending on its type.
//! Fragments are written in [`TypeMask`] bit order.

use bitflags::bitflags;

use crate::error::ProtocolError;
use crate::game::guid::ObjectGuid;
use crate::net::sink::ByteSink;
use crate::update::fields::{AreaTriggerData, ItemData, ObjectData, PlayerData, UnitData};
use crate::update::record::{ChangeTracked, HasChangesMask};
use crate::update::viewer::ViewContext;

/// Concrete kind of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeId {
    Object = 0,
    Item = 1,
    Container = 2,
    Unit = 3,
    Player = 4,
    AreaTrigger = 5,
}

impl TypeId {
    /// Fragments an entity of this type carries
    pub fn type_mask(self) -> TypeMask {
        match self {
            TypeId::Object => TypeMask::OBJECT,
            TypeId::Item => TypeMask::OBJECT | TypeMask::ITEM,
            TypeId::Container => TypeMask::OBJECT | TypeMask::ITEM | TypeMask::CONTAINER,
            TypeId::Unit => TypeMask::OBJECT | TypeMask::UNIT,
            TypeId::Player => TypeMask::OBJECT | TypeMask::UNIT | TypeMask::PLAYER,
            TypeId::AreaTrigger => TypeMask::OBJECT | TypeMask::AREA_TRIGGER,
        }
    }
}

bitflags! {
    /// One bit per fragment
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeMask: u32 {
        const OBJECT = 1 << 0;
        const ITEM = 1 << 1;
        const CONTAINER = 1 << 2;
        const UNIT = 1 << 3;
        const PLAYER = 1 << 4;
        const AREA_TRIGGER = 1 << 5;
    }
}

/// An object that can be replicated to receivers
#[derive(Debug, Clone)]
pub struct WorldEntity {
    guid: ObjectGuid,
    type_id: TypeId,
    owner: ObjectGuid,
    object: ChangeTracked<ObjectData>,
    item: Option<ChangeTracked<ItemData>>,
    unit: Option<ChangeTracked<UnitData>>,
    player: Option<ChangeTracked<PlayerData>>,
    area_trigger: Option<ChangeTracked<AreaTriggerData>>,
}

impl WorldEntity {
    fn new(guid: ObjectGuid, type_id: TypeId, owner: ObjectGuid) -> Self {
        let mask = type_id.type_mask();
        let mut entity = Self {
            guid,
            type_id,
            owner,
            object: ChangeTracked::default(),
            item: mask.contains(TypeMask::ITEM).then(ChangeTracked::default),
            unit: mask.contains(TypeMask::UNIT).then(ChangeTracked::default),
            player: mask.contains(TypeMask::PLAYER).then(ChangeTracked::default),
            area_trigger: mask
                .contains(TypeMask::AREA_TRIGGER)
                .then(ChangeTracked::default),
        };
        entity.object.modify(|o| &mut o.entry_id).set(guid.entry() as i32);
        entity.object.modify(|o| &mut o.scale).set(1.0);
        entity
    }

    /// An item owned by `owner`
    pub fn new_item(guid: ObjectGuid, owner: ObjectGuid) -> Self {
        let mut entity = Self::new(guid, TypeId::Item, owner);
        if let Some(item) = entity.item.as_mut() {
            item.modify(|i| &mut i.owner).set(owner);
            item.modify(|i| &mut i.stack_count).set(1);
        }
        entity.clear_update_mask();
        entity
    }

    /// A creature
    pub fn new_creature(guid: ObjectGuid) -> Self {
        let mut entity = Self::new(guid, TypeId::Unit, ObjectGuid::EMPTY);
        entity.clear_update_mask();
        entity
    }

    /// A player character
    pub fn new_player(guid: ObjectGuid, name: &str) -> Result<Self, ProtocolError> {
        let mut entity = Self::new(guid, TypeId::Player, ObjectGuid::EMPTY);
        if let Some(player) = entity.player.as_mut() {
            player.set_name(name)?;
        }
        entity.clear_update_mask();
        Ok(entity)
    }

    /// An area trigger cast by `caster`
    pub fn new_area_trigger(guid: ObjectGuid, caster: ObjectGuid) -> Self {
        let mut entity = Self::new(guid, TypeId::AreaTrigger, caster);
        if let Some(area_trigger) = entity.area_trigger.as_mut() {
            area_trigger.modify(|a| &mut a.caster).set(caster);
        }
        entity.clear_update_mask();
        entity
    }

    #[inline]
    pub fn guid(&self) -> ObjectGuid {
        self.guid
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Owner (items) or caster (area triggers)
    #[inline]
    pub fn owner(&self) -> ObjectGuid {
        self.owner
    }

    pub fn object(&self) -> &ChangeTracked<ObjectData> {
        &self.object
    }

    pub fn object_mut(&mut self) -> &mut ChangeTracked<ObjectData> {
        &mut self.object
    }

    pub fn item(&self) -> Option<&ChangeTracked<ItemData>> {
        self.item.as_ref()
    }

    pub fn item_mut(&mut self) -> Option<&mut ChangeTracked<ItemData>> {
        self.item.as_mut()
    }

    pub fn unit(&self) -> Option<&ChangeTracked<UnitData>> {
        self.unit.as_ref()
    }

    pub fn unit_mut(&mut self) -> Option<&mut ChangeTracked<UnitData>> {
        self.unit.as_mut()
    }

    pub fn player(&self) -> Option<&ChangeTracked<PlayerData>> {
        self.player.as_ref()
    }

    pub fn player_mut(&mut self) -> Option<&mut ChangeTracked<PlayerData>> {
        self.player.as_mut()
    }

    pub fn area_trigger(&self) -> Option<&ChangeTracked<AreaTriggerData>> {
        self.area_trigger.as_ref()
    }

    pub fn area_trigger_mut(&mut self) -> Option<&mut ChangeTracked<AreaTriggerData>> {
        self.area_trigger.as_mut()
    }

    /// Fragments with at least one changed field
    pub fn changed_fragments(&self) -> TypeMask {
        let mut mask = TypeMask::empty();
        mask.set(TypeMask::OBJECT, self.object.is_changed());
        mask.set(
            TypeMask::ITEM,
            self.item.as_ref().map_or(false, ChangeTracked::is_changed),
        );
        mask.set(
            TypeMask::UNIT,
            self.unit.as_ref().map_or(false, ChangeTracked::is_changed),
        );
        mask.set(
            TypeMask::PLAYER,
            self.player.as_ref().map_or(false, ChangeTracked::is_changed),
        );
        mask.set(
            TypeMask::AREA_TRIGGER,
            self.area_trigger
                .as_ref()
                .map_or(false, ChangeTracked::is_changed),
        );
        mask
    }

    /// Fragments this entity carries
    pub fn present_fragments(&self) -> TypeMask {
        let mut mask = TypeMask::OBJECT;
        mask.set(TypeMask::ITEM, self.item.is_some());
        mask.set(TypeMask::UNIT, self.unit.is_some());
        mask.set(TypeMask::PLAYER, self.player.is_some());
        mask.set(TypeMask::AREA_TRIGGER, self.area_trigger.is_some());
        mask
    }

    pub fn is_changed(&self) -> bool {
        !self.changed_fragments().is_empty()
    }

    /// Write every fragment as a full snapshot
    pub fn write_create<S: ByteSink + ?Sized>(&self, sink: &mut S, ctx: &ViewContext<'_>) {
        self.object.write_create(sink, ctx);
        if let Some(item) = &self.item {
            item.write_create(sink, ctx);
        }
        if let Some(unit) = &self.unit {
            unit.write_create(sink, ctx);
        }
        if let Some(player) = &self.player {
            player.write_create(sink, ctx);
        }
        if let Some(area_trigger) = &self.area_trigger {
            area_trigger.write_create(sink, ctx);
        }
    }

    /// Write the changed-fragment mask followed by each changed fragment
    pub fn write_update<S: ByteSink + ?Sized>(&self, sink: &mut S, ctx: &ViewContext<'_>) {
        self.write_fragments(sink, self.changed_fragments(), false, ctx);
    }

    /// Write every fragment as an update with all visible fields marked changed
    pub fn write_full_update<S: ByteSink + ?Sized>(&self, sink: &mut S, ctx: &ViewContext<'_>) {
        self.write_fragments(sink, self.present_fragments(), true, ctx);
    }

    fn write_fragments<S: ByteSink + ?Sized>(
        &self,
        sink: &mut S,
        fragments: TypeMask,
        ignore_nested: bool,
        ctx: &ViewContext<'_>,
    ) {
        sink.write_u32(fragments.bits());

        if fragments.contains(TypeMask::OBJECT) {
            self.object.write_update(sink, ignore_nested, ctx);
        }
        if let Some(item) = self.item.as_ref().filter(|_| fragments.contains(TypeMask::ITEM)) {
            item.write_update(sink, ignore_nested, ctx);
        }
        if let Some(unit) = self.unit.as_ref().filter(|_| fragments.contains(TypeMask::UNIT)) {
            unit.write_update(sink, ignore_nested, ctx);
        }
        if let Some(player) = self
            .player
            .as_ref()
            .filter(|_| fragments.contains(TypeMask::PLAYER))
        {
            player.write_update(sink, ignore_nested, ctx);
        }
        if let Some(area_trigger) = self
            .area_trigger
            .as_ref()
            .filter(|_| fragments.contains(TypeMask::AREA_TRIGGER))
        {
            area_trigger.write_update(sink, ignore_nested, ctx);
        }
    }

    /// Forget every change; call once all receivers were served
    pub fn clear_update_mask(&mut self) {
        self.object.clear_changes_mask();
        if let Some(item) = self.item.as_mut() {
            item.clear_changes_mask();
        }
        if let Some(unit) = self.unit.as_mut() {
            unit.clear_changes_mask();
        }
        if let Some(player) = self.player.as_mut() {
            player.clear_changes_mask();
        }
        if let Some(area_trigger) = self.area_trigger.as_mut() {
            area_trigger.clear_changes_mask();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::guid::HighGuid;

    #[test]
    fn test_fragments_follow_type() {
        let item = WorldEntity::new_item(
            ObjectGuid::create(HighGuid::Item, 0, 25, 1),
            ObjectGuid::player(1),
        );
        assert!(item.item().is_some());
        assert!(item.unit().is_none());
        assert_eq!(item.type_id().type_mask(), TypeMask::OBJECT | TypeMask::ITEM);

        let player = WorldEntity::new_player(ObjectGuid::player(1), "Arthas").unwrap();
        assert!(player.unit().is_some());
        assert!(player.player().is_some());
        assert_eq!(player.player().unwrap().name.get(), "Arthas");
    }

    #[test]
    fn test_new_entities_start_clean() {
        let creature = WorldEntity::new_creature(ObjectGuid::create(HighGuid::Creature, 1, 3, 7));
        assert!(!creature.is_changed());
        assert_eq!(*creature.object().entry_id.get(), 3);
    }

    #[test]
    fn test_changed_fragments() {
        let mut creature =
            WorldEntity::new_creature(ObjectGuid::create(HighGuid::Creature, 1, 3, 7));
        creature.unit_mut().unwrap().modify(|u| &mut u.health).set(50);
        assert_eq!(creature.changed_fragments(), TypeMask::UNIT);

        creature.object_mut().modify(|o| &mut o.scale).set(2.0);
        assert_eq!(
            creature.changed_fragments(),
            TypeMask::OBJECT | TypeMask::UNIT
        );

        creature.clear_update_mask();
        assert!(!creature.is_changed());
        assert_eq!(*creature.unit().unwrap().health.get(), 50);
    }
}
