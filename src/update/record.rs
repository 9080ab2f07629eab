//! Change-tracked records
//!
//! [`ChangeTracked`] pairs a record's data with its [`UpdateMask`] and is the
//! only way to get mutable access to a field. Writers for create and update
//! blocks live on the record type itself through [`UpdateRecord`].

use std::fmt;
use std::ops::Deref;

use super::dynamic::{DynamicFieldMut, DynamicUpdateField};
use super::field::{FieldMut, OptionalFieldMut, OptionalUpdateField, UpdateField, UpdateFieldArray};
use super::mask::{blocks_for, UpdateMask, BLOCK_BITS};
use super::value::TrackedElement;
use super::viewer::{ViewContext, ViewerFlags, VisibilityTable};
use crate::error::ProtocolError;
use crate::net::buffer::PacketBuffer;
use crate::net::sink::ByteSink;

/// Schema and writers of one record type
pub trait UpdateRecord: Clone + Default + fmt::Debug {
    /// Number of mask bits, summary bit included
    const BIT_COUNT: usize;

    /// Fields restricted to some viewer relationship
    const VISIBILITY: VisibilityTable = VisibilityTable::PUBLIC;

    /// Write every field the receiver may see
    fn write_create<S: ByteSink + ?Sized>(&self, sink: &mut S, ctx: &ViewContext<'_>);

    /// Write the fields set in `mask`
    ///
    /// With `ignore_nested` set, nested records and dynamic collections are
    /// written in full instead of through their own change masks.
    fn write_update<S: ByteSink + ?Sized>(
        &self,
        sink: &mut S,
        mask: &UpdateMask,
        ignore_nested: bool,
        ctx: &ViewContext<'_>,
    );

    /// Clear the change masks held by nested records and dynamic collections
    fn clear_nested_changes(&mut self) {}
}

/// Records that carry their own change mask
pub trait HasChangesMask {
    fn changes_mask(&self) -> &UpdateMask;

    /// Mark every field changed
    fn mark_all_changed(&mut self);

    /// Clear nested masks, then this record's mask
    fn clear_changes_mask(&mut self);
}

/// A record together with the bits of every field changed since the last clear
#[derive(Debug, Clone)]
pub struct ChangeTracked<R: UpdateRecord> {
    data: R,
    mask: UpdateMask,
}

impl<R: UpdateRecord> ChangeTracked<R> {
    pub fn new(data: R) -> Self {
        Self {
            data,
            mask: UpdateMask::new(R::BIT_COUNT),
        }
    }

    /// Read access; never marks anything
    #[inline]
    pub fn get(&self) -> &R {
        &self.data
    }

    /// Whether any field changed since the last clear
    #[inline]
    pub fn is_changed(&self) -> bool {
        self.mask.is_any()
    }

    /// Mutable access to a scalar field
    pub fn modify<T, F>(&mut self, select: F) -> FieldMut<'_, T>
    where
        F: FnOnce(&mut R) -> &mut UpdateField<T>,
    {
        let field = select(&mut self.data);
        field.mark(&mut self.mask);
        FieldMut::new(field.value_mut())
    }

    /// Mutable access to element `index` of a fixed array
    ///
    /// Panics if `index` is out of range.
    pub fn modify_at<T, F, const N: usize>(&mut self, select: F, index: usize) -> FieldMut<'_, T>
    where
        F: FnOnce(&mut R) -> &mut UpdateFieldArray<T, N>,
    {
        let array = select(&mut self.data);
        array.mark(&mut self.mask, index);
        FieldMut::new(array.element_mut(index))
    }

    /// Mutable access to an optional field
    pub fn modify_optional<T, F>(&mut self, select: F) -> OptionalFieldMut<'_, T>
    where
        F: FnOnce(&mut R) -> &mut OptionalUpdateField<T>,
    {
        let field = select(&mut self.data);
        field.mark(&mut self.mask);
        OptionalFieldMut::new(field.value_mut())
    }

    /// Mutable access to a dynamic collection
    pub fn modify_dynamic<T, F>(&mut self, select: F) -> DynamicFieldMut<'_, T>
    where
        T: TrackedElement + Default,
        F: FnOnce(&mut R) -> &mut DynamicUpdateField<T>,
    {
        let field = select(&mut self.data);
        field.mark(&mut self.mask);
        DynamicFieldMut::new(field)
    }

    /// Changed bits a viewer with `flags` may receive
    pub fn effective_mask(&self, flags: ViewerFlags) -> UpdateMask {
        &self.mask & &R::VISIBILITY.allowed_mask(R::BIT_COUNT, flags)
    }

    /// Full snapshot for a receiver that does not know the object yet
    pub fn write_create<S: ByteSink + ?Sized>(&self, sink: &mut S, ctx: &ViewContext<'_>) {
        self.data.write_create(sink, ctx);
    }

    /// Delta for a receiver that already knows the object
    ///
    /// With `ignore_nested` set every visible field is sent, as if all had changed.
    pub fn write_update<S: ByteSink + ?Sized>(
        &self,
        sink: &mut S,
        ignore_nested: bool,
        ctx: &ViewContext<'_>,
    ) {
        let mask = if ignore_nested {
            R::VISIBILITY.allowed_mask(R::BIT_COUNT, ctx.flags)
        } else {
            self.effective_mask(ctx.flags)
        };
        write_mask_header(sink, &mask, ctx.options.single_block_threshold);
        self.data.write_update(sink, &mask, ignore_nested, ctx);
    }
}

impl<R: UpdateRecord> HasChangesMask for ChangeTracked<R> {
    fn changes_mask(&self) -> &UpdateMask {
        &self.mask
    }

    fn mark_all_changed(&mut self) {
        self.mask.set_all();
    }

    fn clear_changes_mask(&mut self) {
        self.data.clear_nested_changes();
        self.mask.reset_all();
    }
}

impl<R: UpdateRecord> TrackedElement for ChangeTracked<R> {
    fn mark_element_changed(&mut self) {
        self.mark_all_changed();
    }

    fn clear_element_changes(&mut self) {
        self.clear_changes_mask();
    }
}

impl<R: UpdateRecord> Default for ChangeTracked<R> {
    fn default() -> Self {
        Self::new(R::default())
    }
}

impl<R: UpdateRecord> Deref for ChangeTracked<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.data
    }
}

impl<R: UpdateRecord + PartialEq> PartialEq for ChangeTracked<R> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data && self.mask == other.mask
    }
}

/// Write which blocks of `mask` are non-zero, then those blocks
///
/// Masks of at most `single_block_threshold` bits skip the blocks-mask layer
/// and write their only block directly.
pub fn write_mask_header<S: ByteSink + ?Sized>(
    sink: &mut S,
    mask: &UpdateMask,
    single_block_threshold: usize,
) {
    let bit_count = mask.bit_count();
    if bit_count <= single_block_threshold.min(BLOCK_BITS) {
        sink.write_bits(bit_count, mask.block(0));
        return;
    }

    let block_count = mask.block_count();
    for word in 0..mask.blocks_mask_count() {
        let width = (block_count - word * BLOCK_BITS).min(BLOCK_BITS);
        sink.write_bits(width, mask.blocks_mask(word));
    }
    for block in 0..block_count {
        let value = mask.block(block);
        if value != 0 {
            sink.write_bits(BLOCK_BITS, value);
        }
    }
}

/// Decode a header written by [`write_mask_header`]
pub fn read_mask_header(
    reader: &mut PacketBuffer,
    bit_count: usize,
    single_block_threshold: usize,
) -> Result<UpdateMask, ProtocolError> {
    let mut mask = UpdateMask::new(bit_count);
    if bit_count <= single_block_threshold.min(BLOCK_BITS) {
        let block = reader.read_bits(bit_count)?;
        set_block_bits(&mut mask, 0, block);
        return Ok(mask);
    }

    let block_count = blocks_for(bit_count);
    let mut present = Vec::with_capacity(block_count);
    for word in 0..blocks_for(block_count) {
        let width = (block_count - word * BLOCK_BITS).min(BLOCK_BITS);
        let bits = reader.read_bits(width)?;
        for i in 0..width {
            present.push(bits & (1 << i) != 0);
        }
    }
    for (block, _) in present.iter().enumerate().filter(|(_, set)| **set) {
        let value = reader.read_bits(BLOCK_BITS)?;
        set_block_bits(&mut mask, block, value);
    }
    Ok(mask)
}

fn set_block_bits(mask: &mut UpdateMask, block: usize, value: u32) {
    for i in 0..BLOCK_BITS {
        let bit = block * BLOCK_BITS + i;
        if value & (1 << i) != 0 && bit < mask.bit_count() {
            mask.set(bit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::TypeId;
    use crate::game::guid::ObjectGuid;
    use crate::game::relations::RelationTable;
    use crate::update::viewer::VisibilityRule;
    use crate::update::WriteOptions;

    #[derive(Debug, Clone, PartialEq)]
    struct Counters {
        a: UpdateField<u32>,
        b: UpdateField<u32>,
        c: UpdateField<u32>,
        d: UpdateField<u32>,
    }

    impl Default for Counters {
        fn default() -> Self {
            Self {
                a: UpdateField::at(1),
                b: UpdateField::at(2),
                c: UpdateField::at(3),
                d: UpdateField::at(4),
            }
        }
    }

    impl UpdateRecord for Counters {
        const BIT_COUNT: usize = 5;
        const VISIBILITY: VisibilityTable =
            VisibilityTable::new(&[VisibilityRule::bit(2, ViewerFlags::OWNER)]);

        fn write_create<S: ByteSink + ?Sized>(&self, sink: &mut S, ctx: &ViewContext<'_>) {
            self.a.write(sink);
            if ctx.sees(&Self::VISIBILITY, 2) {
                self.b.write(sink);
            }
            self.c.write(sink);
            self.d.write(sink);
        }

        fn write_update<S: ByteSink + ?Sized>(
            &self,
            sink: &mut S,
            mask: &UpdateMask,
            _ignore_nested: bool,
            _ctx: &ViewContext<'_>,
        ) {
            for field in [&self.a, &self.b, &self.c, &self.d] {
                if mask.test(field.bit()) {
                    field.write(sink);
                }
            }
        }
    }

    fn context(relations: &RelationTable, flags: ViewerFlags) -> ViewContext<'_> {
        ViewContext {
            object: ObjectGuid::player(1),
            object_type: TypeId::Object,
            receiver: ObjectGuid::player(2),
            flags,
            policy: relations,
            options: WriteOptions::default(),
        }
    }

    #[test]
    fn test_fresh_record_writes_empty_header() {
        let relations = RelationTable::new();
        let record = ChangeTracked::<Counters>::default();

        let mut buf = PacketBuffer::new();
        record.write_update(&mut buf, false, &context(&relations, ViewerFlags::OWNER));
        buf.flush_bits();

        assert_eq!(buf.as_bytes(), &[0]);
        let effective = record.effective_mask(ViewerFlags::OWNER);
        assert!((0..5).all(|bit| !effective.test(bit)));
    }

    #[test]
    fn test_modify_marks_summary_and_field() {
        let mut record = ChangeTracked::<Counters>::default();
        record.modify(|r| &mut r.b).set(42);

        assert_eq!(*record.b.get(), 42);
        assert_eq!(record.changes_mask().to_string(), "10100");
    }

    #[test]
    fn test_reads_never_mark() {
        let record = ChangeTracked::<Counters>::default();
        for _ in 0..3 {
            let _ = record.get().a.get();
            let _ = record.d.get();
        }
        assert!(!record.is_changed());
    }

    #[test]
    fn test_filtered_field_keeps_summary_only() {
        let relations = RelationTable::new();
        let mut record = ChangeTracked::<Counters>::default();
        record.modify(|r| &mut r.b).set(42);

        let mut buf = PacketBuffer::new();
        record.write_update(&mut buf, false, &context(&relations, ViewerFlags::empty()));
        buf.flush_bits();

        // header 10000 (summary only), no field payload
        assert_eq!(buf.as_bytes(), &[0b0000_1000]);

        let mut reader = PacketBuffer::from_bytes(buf.as_bytes());
        let mask = read_mask_header(&mut reader, 5, 32).unwrap();
        assert!(mask.test(0));
        assert!(!mask.test(2));
    }

    #[test]
    fn test_owner_receives_value() {
        let relations = RelationTable::new();
        let mut record = ChangeTracked::<Counters>::default();
        record.modify(|r| &mut r.b).set(42);

        let mut buf = PacketBuffer::new();
        record.write_update(&mut buf, false, &context(&relations, ViewerFlags::OWNER));

        let mut reader = PacketBuffer::from_bytes(buf.as_bytes());
        let mask = read_mask_header(&mut reader, 5, 32).unwrap();
        assert!(mask.test(2));
        assert_eq!(reader.read_u32().unwrap(), 42);
        assert!(!reader.has_remaining());
    }

    #[test]
    fn test_same_value_twice_is_sent_once() {
        let relations = RelationTable::new();
        let mut record = ChangeTracked::<Counters>::default();
        record.modify(|r| &mut r.c).set(7);
        record.modify(|r| &mut r.c).set(7);

        let mut buf = PacketBuffer::new();
        record.write_update(&mut buf, false, &context(&relations, ViewerFlags::OWNER));
        assert_eq!(buf.as_bytes().len(), 1 + 4);

        record.clear_changes_mask();
        assert!(!record.is_changed());
    }

    #[test]
    fn test_two_layer_header() {
        let mut mask = UpdateMask::new(40);
        mask.set(0);
        mask.set(35);

        let mut buf = PacketBuffer::new();
        write_mask_header(&mut buf, &mask, 32);
        buf.flush_bits();
        // 2 blocks-mask bits, then two 32-bit blocks
        assert_eq!(buf.as_bytes().len(), 9);

        let mut reader = PacketBuffer::from_bytes(buf.as_bytes());
        let decoded = read_mask_header(&mut reader, 40, 32).unwrap();
        assert_eq!(decoded, mask);
    }

    #[test]
    fn test_two_layer_header_skips_empty_blocks() {
        let mut mask = UpdateMask::new(40);
        mask.set(35);

        let mut buf = PacketBuffer::new();
        write_mask_header(&mut buf, &mask, 32);
        buf.flush_bits();
        assert_eq!(buf.as_bytes().len(), 5);
    }

    #[test]
    fn test_lowered_threshold_forces_two_layers() {
        let mut mask = UpdateMask::new(5);
        mask.set(1);

        let mut buf = PacketBuffer::new();
        write_mask_header(&mut buf, &mask, 4);
        buf.flush_bits();

        let mut reader = PacketBuffer::from_bytes(buf.as_bytes());
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.read_bits(32).unwrap(), 0b10);
    }
}
