//! Base fragment carried by every entity

use bitflags::bitflags;

use crate::net::sink::ByteSink;
use crate::update::field::UpdateField;
use crate::update::mask::UpdateMask;
use crate::update::record::UpdateRecord;
use crate::update::viewer::{overrides, ViewContext};

bitflags! {
    /// Per-receiver unit state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UnitDynamicFlags: u32 {
        const LOOTABLE = 0x0001;
        const TRACK_UNIT = 0x0002;
        const TAPPED = 0x0004;
        const SPECIAL_INFO = 0x0010;
        const CAN_SKIN = 0x0020;
        const REFER_A_FRIEND = 0x0040;
    }
}

/// Bits of [`ObjectData`]
pub mod bits {
    pub const ENTRY_ID: usize = 1;
    pub const DYNAMIC_FLAGS: usize = 2;
    pub const SCALE: usize = 3;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectData {
    pub entry_id: UpdateField<i32>,
    pub dynamic_flags: UpdateField<u32>,
    pub scale: UpdateField<f32>,
}

impl Default for ObjectData {
    fn default() -> Self {
        Self {
            entry_id: UpdateField::at(bits::ENTRY_ID),
            dynamic_flags: UpdateField::at(bits::DYNAMIC_FLAGS),
            scale: UpdateField::at(bits::SCALE),
        }
    }
}

impl UpdateRecord for ObjectData {
    const BIT_COUNT: usize = 4;

    fn write_create<S: ByteSink + ?Sized>(&self, sink: &mut S, ctx: &ViewContext<'_>) {
        self.entry_id.write(sink);
        sink.write_u32(overrides::dynamic_flags(*self.dynamic_flags.get(), ctx));
        self.scale.write(sink);
    }

    fn write_update<S: ByteSink + ?Sized>(
        &self,
        sink: &mut S,
        mask: &UpdateMask,
        _ignore_nested: bool,
        ctx: &ViewContext<'_>,
    ) {
        if mask.test(0) {
            if mask.test(bits::ENTRY_ID) {
                self.entry_id.write(sink);
            }
            if mask.test(bits::DYNAMIC_FLAGS) {
                sink.write_u32(overrides::dynamic_flags(*self.dynamic_flags.get(), ctx));
            }
            if mask.test(bits::SCALE) {
                self.scale.write(sink);
            }
        }
        sink.flush_bits();
    }
}
