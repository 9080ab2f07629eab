//! Unit fragment (creatures and players)

use bitflags::bitflags;

use crate::game::guid::ObjectGuid;
use crate::net::sink::ByteSink;
use crate::update::dynamic::DynamicUpdateField;
use crate::update::field::{UpdateField, UpdateFieldArray};
use crate::update::mask::UpdateMask;
use crate::update::record::{ChangeTracked, UpdateRecord};
use crate::update::value::UpdateValue;
use crate::update::viewer::{overrides, ViewContext, ViewerFlags, VisibilityRule, VisibilityTable};

pub const MAX_POWERS: usize = 6;
pub const MAX_STATS: usize = 5;
pub const MAX_RESISTANCES: usize = 7;
pub const MAX_VIRTUAL_ITEMS: usize = 3;

bitflags! {
    /// Interactions a creature offers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NpcFlags: u32 {
        const GOSSIP = 0x0000_0001;
        const QUEST_GIVER = 0x0000_0002;
        const TRAINER = 0x0000_0010;
        const VENDOR = 0x0000_0080;
        const REPAIR = 0x0000_1000;
        const FLIGHT_MASTER = 0x0000_2000;
        const INNKEEPER = 0x0001_0000;
        const BANKER = 0x0002_0000;
        const SPELL_CLICK = 0x0100_0000;
    }
}

/// Bits of [`UnitData`]
pub mod bits {
    pub const PASSIVE_SPELLS: usize = 1;
    pub const HEALTH: usize = 2;
    pub const MAX_HEALTH: usize = 3;
    pub const DISPLAY_ID: usize = 4;
    pub const NPC_FLAGS: usize = 5;
    pub const FACTION_TEMPLATE: usize = 6;
    pub const FLAGS: usize = 7;
    pub const LEVEL: usize = 8;
    pub const TARGET: usize = 9;
    pub const SUMMONED_BY: usize = 10;
    pub const CREATED_BY: usize = 11;
    pub const MOUNT_DISPLAY_ID: usize = 12;
    pub const POWER: usize = 13;
    pub const POWER_FIRST: usize = 14;
    pub const MAX_POWER: usize = 20;
    pub const MAX_POWER_FIRST: usize = 21;
    pub const STATS: usize = 27;
    pub const STATS_FIRST: usize = 28;
    pub const RESISTANCES: usize = 33;
    pub const RESISTANCES_FIRST: usize = 34;
    pub const VIRTUAL_ITEMS: usize = 41;
    pub const VIRTUAL_ITEMS_FIRST: usize = 42;
}

/// Weapon model shown in a creature's hands
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleItem {
    pub item_id: UpdateField<i32>,
    pub appearance_mod_id: UpdateField<u16>,
    pub item_visual: UpdateField<u16>,
}

impl Default for VisibleItem {
    fn default() -> Self {
        Self {
            item_id: UpdateField::at(1),
            appearance_mod_id: UpdateField::at(2),
            item_visual: UpdateField::at(3),
        }
    }
}

impl UpdateRecord for VisibleItem {
    const BIT_COUNT: usize = 4;

    fn write_create<S: ByteSink + ?Sized>(&self, sink: &mut S, _ctx: &ViewContext<'_>) {
        self.item_id.write(sink);
        self.appearance_mod_id.write(sink);
        self.item_visual.write(sink);
    }

    fn write_update<S: ByteSink + ?Sized>(
        &self,
        sink: &mut S,
        mask: &UpdateMask,
        _ignore_nested: bool,
        _ctx: &ViewContext<'_>,
    ) {
        if mask.test(0) {
            if mask.test(1) {
                self.item_id.write(sink);
            }
            if mask.test(2) {
                self.appearance_mod_id.write(sink);
            }
            if mask.test(3) {
                self.item_visual.write(sink);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitData {
    pub passive_spells: DynamicUpdateField<i32>,
    pub health: UpdateField<i64>,
    pub max_health: UpdateField<i64>,
    pub display_id: UpdateField<u32>,
    pub npc_flags: UpdateField<u32>,
    pub faction_template: UpdateField<u32>,
    pub flags: UpdateField<u32>,
    pub level: UpdateField<i32>,
    pub target: UpdateField<ObjectGuid>,
    pub summoned_by: UpdateField<ObjectGuid>,
    pub created_by: UpdateField<ObjectGuid>,
    pub mount_display_id: UpdateField<u32>,
    pub power: UpdateFieldArray<i32, MAX_POWERS>,
    pub max_power: UpdateFieldArray<i32, MAX_POWERS>,
    pub stats: UpdateFieldArray<i32, MAX_STATS>,
    pub resistances: UpdateFieldArray<i32, MAX_RESISTANCES>,
    pub virtual_items: UpdateFieldArray<ChangeTracked<VisibleItem>, MAX_VIRTUAL_ITEMS>,
}

impl Default for UnitData {
    fn default() -> Self {
        Self {
            passive_spells: DynamicUpdateField::new(bits::PASSIVE_SPELLS),
            health: UpdateField::at(bits::HEALTH),
            max_health: UpdateField::at(bits::MAX_HEALTH),
            display_id: UpdateField::at(bits::DISPLAY_ID),
            npc_flags: UpdateField::at(bits::NPC_FLAGS),
            faction_template: UpdateField::at(bits::FACTION_TEMPLATE),
            flags: UpdateField::at(bits::FLAGS),
            level: UpdateField::at(bits::LEVEL),
            target: UpdateField::at(bits::TARGET),
            summoned_by: UpdateField::at(bits::SUMMONED_BY),
            created_by: UpdateField::at(bits::CREATED_BY),
            mount_display_id: UpdateField::at(bits::MOUNT_DISPLAY_ID),
            power: UpdateFieldArray::new(bits::POWER, bits::POWER_FIRST),
            max_power: UpdateFieldArray::new(bits::MAX_POWER, bits::MAX_POWER_FIRST),
            stats: UpdateFieldArray::new(bits::STATS, bits::STATS_FIRST),
            resistances: UpdateFieldArray::new(bits::RESISTANCES, bits::RESISTANCES_FIRST),
            virtual_items: UpdateFieldArray::new(bits::VIRTUAL_ITEMS, bits::VIRTUAL_ITEMS_FIRST),
        }
    }
}

/// Write the elements of `array`, or only those set in `mask`
fn write_array<T, S, const N: usize>(
    sink: &mut S,
    array: &UpdateFieldArray<T, N>,
    mask: Option<&UpdateMask>,
) where
    T: UpdateValue,
    S: ByteSink + ?Sized,
{
    for i in 0..N {
        if mask.map_or(true, |mask| mask.test(array.element_bit(i))) {
            array.write_element(sink, i);
        }
    }
}

impl UpdateRecord for UnitData {
    const BIT_COUNT: usize = 45;

    const VISIBILITY: VisibilityTable = VisibilityTable::new(&[
        VisibilityRule::range(
            bits::STATS,
            bits::STATS_FIRST + MAX_STATS - 1,
            ViewerFlags::OWNER.union(ViewerFlags::UNIT_ALL),
        ),
        VisibilityRule::range(
            bits::RESISTANCES,
            bits::RESISTANCES_FIRST + MAX_RESISTANCES - 1,
            ViewerFlags::OWNER
                .union(ViewerFlags::UNIT_ALL)
                .union(ViewerFlags::EMPATH),
        ),
    ]);

    fn write_create<S: ByteSink + ?Sized>(&self, sink: &mut S, ctx: &ViewContext<'_>) {
        sink.write_size_bits(
            ctx.options.dynamic_size_bits as usize,
            self.passive_spells.len(),
        );
        sink.flush_bits();

        for spell in self.passive_spells.iter() {
            spell.write_value(sink);
        }
        self.health.write(sink);
        self.max_health.write(sink);
        sink.write_u32(overrides::display_id(*self.display_id.get(), ctx));
        sink.write_u32(overrides::npc_flags(*self.npc_flags.get(), ctx));
        sink.write_u32(overrides::faction_template(*self.faction_template.get(), ctx));
        self.flags.write(sink);
        self.level.write(sink);
        self.target.write(sink);
        self.summoned_by.write(sink);
        self.created_by.write(sink);
        self.mount_display_id.write(sink);
        write_array(sink, &self.power, None);
        write_array(sink, &self.max_power, None);
        if ctx.sees(&Self::VISIBILITY, bits::STATS) {
            write_array(sink, &self.stats, None);
        }
        if ctx.sees(&Self::VISIBILITY, bits::RESISTANCES) {
            write_array(sink, &self.resistances, None);
        }
        for item in self.virtual_items.iter() {
            item.write_create(sink, ctx);
        }
        sink.flush_bits();
    }

    fn write_update<S: ByteSink + ?Sized>(
        &self,
        sink: &mut S,
        mask: &UpdateMask,
        ignore_nested: bool,
        ctx: &ViewContext<'_>,
    ) {
        let size_bits = ctx.options.dynamic_size_bits;
        if mask.test(0) && mask.test(bits::PASSIVE_SPELLS) {
            if ignore_nested {
                self.passive_spells.write_complete_update_mask(sink, size_bits);
            } else {
                self.passive_spells.write_update_mask(sink, size_bits);
            }
        }
        sink.flush_bits();

        if mask.test(0) {
            if mask.test(bits::PASSIVE_SPELLS) {
                for (i, spell) in self.passive_spells.iter().enumerate() {
                    if ignore_nested || self.passive_spells.has_changed(i) {
                        spell.write_value(sink);
                    }
                }
            }
            if mask.test(bits::HEALTH) {
                self.health.write(sink);
            }
            if mask.test(bits::MAX_HEALTH) {
                self.max_health.write(sink);
            }
            if mask.test(bits::DISPLAY_ID) {
                sink.write_u32(overrides::display_id(*self.display_id.get(), ctx));
            }
            if mask.test(bits::NPC_FLAGS) {
                sink.write_u32(overrides::npc_flags(*self.npc_flags.get(), ctx));
            }
            if mask.test(bits::FACTION_TEMPLATE) {
                sink.write_u32(overrides::faction_template(*self.faction_template.get(), ctx));
            }
            if mask.test(bits::FLAGS) {
                self.flags.write(sink);
            }
            if mask.test(bits::LEVEL) {
                self.level.write(sink);
            }
            for field in [&self.target, &self.summoned_by, &self.created_by] {
                if mask.test(field.bit()) {
                    field.write(sink);
                }
            }
            if mask.test(bits::MOUNT_DISPLAY_ID) {
                self.mount_display_id.write(sink);
            }
        }
        for array in [&self.power, &self.max_power] {
            if mask.test(array.bit()) {
                write_array(sink, array, Some(mask));
            }
        }
        if mask.test(bits::STATS) {
            write_array(sink, &self.stats, Some(mask));
        }
        if mask.test(bits::RESISTANCES) {
            write_array(sink, &self.resistances, Some(mask));
        }
        if mask.test(bits::VIRTUAL_ITEMS) {
            for (i, item) in self.virtual_items.iter().enumerate() {
                if mask.test(self.virtual_items.element_bit(i)) {
                    item.write_update(sink, ignore_nested, ctx);
                }
            }
        }
        sink.flush_bits();
    }

    fn clear_nested_changes(&mut self) {
        self.passive_spells.clear_changes();
        self.virtual_items.clear_changes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::TypeId;
    use crate::game::guid::HighGuid;
    use crate::game::relations::RelationTable;
    use crate::net::buffer::PacketBuffer;
    use crate::update::record::read_mask_header;
    use crate::update::WriteOptions;

    fn creature() -> ObjectGuid {
        ObjectGuid::create(HighGuid::Creature, 0, 3, 1)
    }

    fn context(relations: &RelationTable, flags: ViewerFlags) -> ViewContext<'_> {
        ViewContext {
            object: creature(),
            object_type: TypeId::Unit,
            receiver: ObjectGuid::player(1),
            flags,
            policy: relations,
            options: WriteOptions::default(),
        }
    }

    #[test]
    fn test_npc_flags_projection() {
        let mut relations = RelationTable::new();
        relations.hide_gossip(creature(), ObjectGuid::player(1));

        let mut unit = ChangeTracked::<UnitData>::default();
        unit.modify(|u| &mut u.npc_flags)
            .set((NpcFlags::GOSSIP | NpcFlags::VENDOR | NpcFlags::SPELL_CLICK).bits());

        let mut buf = PacketBuffer::new();
        unit.write_update(&mut buf, false, &context(&relations, ViewerFlags::empty()));
        let mut reader = PacketBuffer::from_bytes(buf.as_bytes());
        let mask = read_mask_header(&mut reader, UnitData::BIT_COUNT, 32).unwrap();
        assert!(mask.test(bits::NPC_FLAGS));
        reader.reset_bit_reader();
        assert_eq!(
            reader.read_u32().unwrap(),
            (NpcFlags::VENDOR | NpcFlags::SPELL_CLICK).bits()
        );
        assert!(!reader.has_remaining());
    }

    #[test]
    fn test_cross_faction_party_sees_own_faction() {
        let mut relations = RelationTable::new();
        relations.set_cross_faction_party(creature(), ObjectGuid::player(1));
        relations.set_faction(ObjectGuid::player(1), 1610);

        let mut unit = ChangeTracked::<UnitData>::default();
        unit.modify(|u| &mut u.faction_template).set(2);

        let mut buf = PacketBuffer::new();
        unit.write_update(&mut buf, false, &context(&relations, ViewerFlags::PARTY_MEMBER));
        let mut reader = PacketBuffer::from_bytes(buf.as_bytes());
        read_mask_header(&mut reader, UnitData::BIT_COUNT, 32).unwrap();
        assert_eq!(reader.read_u32().unwrap(), 1610);
        assert_eq!(*unit.faction_template.get(), 2);
    }

    #[test]
    fn test_game_master_display() {
        let mut relations = RelationTable::new();
        relations.set_game_master(ObjectGuid::player(1), 15435);

        let mut unit = ChangeTracked::<UnitData>::default();
        unit.modify(|u| &mut u.display_id).set(1126);

        let mut buf = PacketBuffer::new();
        unit.write_update(&mut buf, false, &context(&relations, ViewerFlags::empty()));
        let mut reader = PacketBuffer::from_bytes(buf.as_bytes());
        read_mask_header(&mut reader, UnitData::BIT_COUNT, 32).unwrap();
        assert_eq!(reader.read_u32().unwrap(), 15435);
    }

    #[test]
    fn test_resistances_visible_to_empath() {
        let mut unit = ChangeTracked::<UnitData>::default();
        unit.modify_at(|u| &mut u.resistances, 2).set(75);
        unit.modify_at(|u| &mut u.stats, 0).set(20);

        let stranger = unit.effective_mask(ViewerFlags::empty());
        assert!(!stranger.test(bits::RESISTANCES_FIRST + 2));
        assert!(!stranger.test(bits::STATS_FIRST));

        let empath = unit.effective_mask(ViewerFlags::EMPATH);
        assert!(empath.test(bits::RESISTANCES));
        assert!(empath.test(bits::RESISTANCES_FIRST + 2));
        assert!(!empath.test(bits::STATS_FIRST));

        let controller = unit.effective_mask(ViewerFlags::UNIT_ALL);
        assert!(controller.test(bits::STATS_FIRST));
    }

    #[test]
    fn test_virtual_item_nested_write() {
        let relations = RelationTable::new();
        let mut unit = ChangeTracked::<UnitData>::default();
        unit.modify_at(|u| &mut u.virtual_items, 1)
            .modify(|v| &mut v.item_id)
            .set(19019);

        let mut buf = PacketBuffer::new();
        unit.write_update(&mut buf, false, &context(&relations, ViewerFlags::empty()));
        let mut reader = PacketBuffer::from_bytes(buf.as_bytes());
        let mask = read_mask_header(&mut reader, UnitData::BIT_COUNT, 32).unwrap();
        assert!(mask.test(bits::VIRTUAL_ITEMS_FIRST + 1));
        assert!(!mask.test(bits::VIRTUAL_ITEMS_FIRST));
        reader.reset_bit_reader();

        let nested = read_mask_header(&mut reader, VisibleItem::BIT_COUNT, 32).unwrap();
        assert_eq!(nested.to_string(), "1100");
        assert_eq!(reader.read_i32().unwrap(), 19019);
    }
}
