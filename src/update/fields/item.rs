//! Item fragment
//!
//! Large enough to need the two-layer mask header. Most of the interesting
//! state (stack size, durability, charges) is only sent to the owner.

use crate::game::guid::ObjectGuid;
use crate::net::sink::ByteSink;
use crate::update::dynamic::DynamicUpdateField;
use crate::update::field::{UpdateField, UpdateFieldArray};
use crate::update::mask::UpdateMask;
use crate::update::record::{ChangeTracked, UpdateRecord};
use crate::update::value::{TrackedElement, UpdateValue};
use crate::update::viewer::{ViewContext, ViewerFlags, VisibilityRule, VisibilityTable};

pub const MAX_ENCHANTMENTS: usize = 13;
pub const MAX_SPELL_CHARGES: usize = 5;
pub const MAX_GEM_BONUSES: usize = 4;

/// Bits of [`ItemData`]
pub mod bits {
    pub const ARTIFACT_POWERS: usize = 1;
    pub const GEMS: usize = 2;
    pub const OWNER: usize = 3;
    pub const CONTAINED_IN: usize = 4;
    pub const CREATOR: usize = 5;
    pub const STACK_COUNT: usize = 6;
    pub const EXPIRATION: usize = 7;
    pub const DYNAMIC_FLAGS: usize = 8;
    pub const DURABILITY: usize = 9;
    pub const MAX_DURABILITY: usize = 10;
    pub const CREATE_PLAYED_TIME: usize = 11;
    pub const CONTEXT: usize = 12;
    pub const ARTIFACT_XP: usize = 13;
    pub const ENCHANTMENTS: usize = 14;
    pub const ENCHANTMENT_FIRST: usize = 15;
    pub const SPELL_CHARGES: usize = 28;
    pub const SPELL_CHARGES_FIRST: usize = 29;
}

/// One purchased artifact trait
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtifactPower {
    pub artifact_power_id: i16,
    pub purchased_rank: u8,
    pub current_rank_with_bonus: u8,
}

impl UpdateValue for ArtifactPower {
    fn write_value<S: ByteSink + ?Sized>(&self, sink: &mut S) {
        sink.write_u16(self.artifact_power_id as u16);
        sink.write_u8(self.purchased_rank);
        sink.write_u8(self.current_rank_with_bonus);
    }
}

impl TrackedElement for ArtifactPower {}

/// A gem socketed into the item
#[derive(Debug, Clone, PartialEq)]
pub struct SocketedGem {
    pub item_id: UpdateField<i32>,
    pub context: UpdateField<u8>,
    pub bonus_list_ids: UpdateFieldArray<u16, MAX_GEM_BONUSES>,
}

impl Default for SocketedGem {
    fn default() -> Self {
        Self {
            item_id: UpdateField::at(1),
            context: UpdateField::at(2),
            bonus_list_ids: UpdateFieldArray::new(3, 4),
        }
    }
}

impl UpdateRecord for SocketedGem {
    const BIT_COUNT: usize = 8;

    fn write_create<S: ByteSink + ?Sized>(&self, sink: &mut S, _ctx: &ViewContext<'_>) {
        self.item_id.write(sink);
        self.context.write(sink);
        for i in 0..MAX_GEM_BONUSES {
            self.bonus_list_ids.write_element(sink, i);
        }
    }

    fn write_update<S: ByteSink + ?Sized>(
        &self,
        sink: &mut S,
        mask: &UpdateMask,
        _ignore_nested: bool,
        _ctx: &ViewContext<'_>,
    ) {
        if mask.test(0) {
            if mask.test(self.item_id.bit()) {
                self.item_id.write(sink);
            }
            if mask.test(self.context.bit()) {
                self.context.write(sink);
            }
        }
        if mask.test(self.bonus_list_ids.bit()) {
            for i in 0..MAX_GEM_BONUSES {
                if mask.test(self.bonus_list_ids.element_bit(i)) {
                    self.bonus_list_ids.write_element(sink, i);
                }
            }
        }
    }
}

/// One enchantment slot
#[derive(Debug, Clone, PartialEq)]
pub struct ItemEnchantment {
    pub id: UpdateField<i32>,
    pub duration: UpdateField<u32>,
    pub charges: UpdateField<i16>,
    pub inactive: UpdateField<u16>,
}

impl Default for ItemEnchantment {
    fn default() -> Self {
        Self {
            id: UpdateField::at(1),
            duration: UpdateField::at(2),
            charges: UpdateField::at(3),
            inactive: UpdateField::at(4),
        }
    }
}

impl UpdateRecord for ItemEnchantment {
    const BIT_COUNT: usize = 5;

    fn write_create<S: ByteSink + ?Sized>(&self, sink: &mut S, _ctx: &ViewContext<'_>) {
        self.id.write(sink);
        self.duration.write(sink);
        self.charges.write(sink);
        self.inactive.write(sink);
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
                self.id.write(sink);
            }
            if mask.test(2) {
                self.duration.write(sink);
            }
            if mask.test(3) {
                self.charges.write(sink);
            }
            if mask.test(4) {
                self.inactive.write(sink);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemData {
    pub artifact_powers: DynamicUpdateField<ArtifactPower>,
    pub gems: DynamicUpdateField<ChangeTracked<SocketedGem>>,
    pub owner: UpdateField<ObjectGuid>,
    pub contained_in: UpdateField<ObjectGuid>,
    pub creator: UpdateField<ObjectGuid>,
    pub stack_count: UpdateField<u32>,
    pub expiration: UpdateField<u32>,
    pub dynamic_flags: UpdateField<u32>,
    pub durability: UpdateField<u32>,
    pub max_durability: UpdateField<u32>,
    pub create_played_time: UpdateField<u32>,
    pub context: UpdateField<u8>,
    pub artifact_xp: UpdateField<u64>,
    pub enchantments: UpdateFieldArray<ChangeTracked<ItemEnchantment>, MAX_ENCHANTMENTS>,
    pub spell_charges: UpdateFieldArray<i32, MAX_SPELL_CHARGES>,
}

impl Default for ItemData {
    fn default() -> Self {
        Self {
            artifact_powers: DynamicUpdateField::new(bits::ARTIFACT_POWERS),
            gems: DynamicUpdateField::new(bits::GEMS),
            owner: UpdateField::at(bits::OWNER),
            contained_in: UpdateField::at(bits::CONTAINED_IN),
            creator: UpdateField::at(bits::CREATOR),
            stack_count: UpdateField::at(bits::STACK_COUNT),
            expiration: UpdateField::at(bits::EXPIRATION),
            dynamic_flags: UpdateField::at(bits::DYNAMIC_FLAGS),
            durability: UpdateField::at(bits::DURABILITY),
            max_durability: UpdateField::at(bits::MAX_DURABILITY),
            create_played_time: UpdateField::at(bits::CREATE_PLAYED_TIME),
            context: UpdateField::at(bits::CONTEXT),
            artifact_xp: UpdateField::at(bits::ARTIFACT_XP),
            enchantments: UpdateFieldArray::new(bits::ENCHANTMENTS, bits::ENCHANTMENT_FIRST),
            spell_charges: UpdateFieldArray::new(bits::SPELL_CHARGES, bits::SPELL_CHARGES_FIRST),
        }
    }
}

impl UpdateRecord for ItemData {
    const BIT_COUNT: usize = 34;

    const VISIBILITY: VisibilityTable = VisibilityTable::new(&[
        VisibilityRule::range(bits::STACK_COUNT, bits::EXPIRATION, ViewerFlags::OWNER),
        VisibilityRule::range(bits::DURABILITY, bits::MAX_DURABILITY, ViewerFlags::OWNER),
        VisibilityRule::bit(bits::ARTIFACT_XP, ViewerFlags::OWNER),
        VisibilityRule::range(
            bits::SPELL_CHARGES,
            bits::SPELL_CHARGES_FIRST + MAX_SPELL_CHARGES - 1,
            ViewerFlags::OWNER,
        ),
    ]);

    fn write_create<S: ByteSink + ?Sized>(&self, sink: &mut S, ctx: &ViewContext<'_>) {
        let size_bits = ctx.options.dynamic_size_bits as usize;
        sink.write_size_bits(size_bits, self.artifact_powers.len());
        sink.write_size_bits(size_bits, self.gems.len());
        sink.flush_bits();

        for power in self.artifact_powers.iter() {
            power.write_value(sink);
        }
        for gem in self.gems.iter() {
            gem.write_create(sink, ctx);
        }
        self.owner.write(sink);
        self.contained_in.write(sink);
        self.creator.write(sink);
        if ctx.sees(&Self::VISIBILITY, bits::STACK_COUNT) {
            self.stack_count.write(sink);
        }
        if ctx.sees(&Self::VISIBILITY, bits::EXPIRATION) {
            self.expiration.write(sink);
        }
        self.dynamic_flags.write(sink);
        if ctx.sees(&Self::VISIBILITY, bits::DURABILITY) {
            self.durability.write(sink);
        }
        if ctx.sees(&Self::VISIBILITY, bits::MAX_DURABILITY) {
            self.max_durability.write(sink);
        }
        self.create_played_time.write(sink);
        self.context.write(sink);
        if ctx.sees(&Self::VISIBILITY, bits::ARTIFACT_XP) {
            self.artifact_xp.write(sink);
        }
        for enchantment in self.enchantments.iter() {
            enchantment.write_create(sink, ctx);
        }
        if ctx.sees(&Self::VISIBILITY, bits::SPELL_CHARGES) {
            for i in 0..MAX_SPELL_CHARGES {
                self.spell_charges.write_element(sink, i);
            }
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
        if mask.test(0) {
            if mask.test(bits::ARTIFACT_POWERS) {
                if ignore_nested {
                    self.artifact_powers.write_complete_update_mask(sink, size_bits);
                } else {
                    self.artifact_powers.write_update_mask(sink, size_bits);
                }
            }
            if mask.test(bits::GEMS) {
                if ignore_nested {
                    self.gems.write_complete_update_mask(sink, size_bits);
                } else {
                    self.gems.write_update_mask(sink, size_bits);
                }
            }
        }
        sink.flush_bits();

        if mask.test(0) {
            if mask.test(bits::ARTIFACT_POWERS) {
                for (i, power) in self.artifact_powers.iter().enumerate() {
                    if ignore_nested || self.artifact_powers.has_changed(i) {
                        power.write_value(sink);
                    }
                }
            }
            if mask.test(bits::GEMS) {
                for (i, gem) in self.gems.iter().enumerate() {
                    if ignore_nested || self.gems.has_changed(i) {
                        gem.write_update(sink, ignore_nested, ctx);
                    }
                }
            }
            for field in [&self.owner, &self.contained_in, &self.creator] {
                if mask.test(field.bit()) {
                    field.write(sink);
                }
            }
            for field in [&self.stack_count, &self.expiration, &self.dynamic_flags] {
                if mask.test(field.bit()) {
                    field.write(sink);
                }
            }
            for field in [
                &self.durability,
                &self.max_durability,
                &self.create_played_time,
            ] {
                if mask.test(field.bit()) {
                    field.write(sink);
                }
            }
            if mask.test(bits::CONTEXT) {
                self.context.write(sink);
            }
            if mask.test(bits::ARTIFACT_XP) {
                self.artifact_xp.write(sink);
            }
        }
        if mask.test(bits::ENCHANTMENTS) {
            for (i, enchantment) in self.enchantments.iter().enumerate() {
                if mask.test(self.enchantments.element_bit(i)) {
                    enchantment.write_update(sink, ignore_nested, ctx);
                }
            }
        }
        if mask.test(bits::SPELL_CHARGES) {
            for i in 0..MAX_SPELL_CHARGES {
                if mask.test(self.spell_charges.element_bit(i)) {
                    self.spell_charges.write_element(sink, i);
                }
            }
        }
        sink.flush_bits();
    }

    fn clear_nested_changes(&mut self) {
        self.artifact_powers.clear_changes();
        self.gems.clear_changes();
        self.enchantments.clear_changes();
    }
}
