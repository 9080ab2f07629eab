//! Growable collections with a per-element change mask
//!
//! The collection owns one bit in its record plus an internal mask with one
//! bit per element. Removal shifts later elements down, so everything from the
//! removed index to the end is re-sent.

use tracing::warn;

use super::field::SUMMARY_BIT;
use super::mask::{blocks_for, UpdateMask, BLOCK_BITS};
use super::value::TrackedElement;
use crate::net::sink::ByteSink;

/// A variable-length collection tracked element by element
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicUpdateField<T> {
    values: Vec<T>,
    update_mask: Vec<u32>,
    bit: usize,
}

impl<T> DynamicUpdateField<T> {
    pub fn new(bit: usize) -> Self {
        Self {
            values: Vec::new(),
            update_mask: Vec::new(),
            bit,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.values.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    /// Bit this collection owns in its record
    #[inline]
    pub fn bit(&self) -> usize {
        self.bit
    }

    /// Whether element `index` changed since the last clear
    pub fn has_changed(&self, index: usize) -> bool {
        self.update_mask
            .get(index / BLOCK_BITS)
            .map_or(false, |block| block & (1 << (index % BLOCK_BITS)) != 0)
    }

    /// Raw internal mask blocks
    pub fn update_mask(&self) -> &[u32] {
        &self.update_mask
    }

    pub(crate) fn mark(&self, mask: &mut UpdateMask) {
        mask.set(SUMMARY_BIT);
        mask.set(self.bit);
    }

    fn mark_element(&mut self, index: usize) {
        let block = index / BLOCK_BITS;
        if block >= self.update_mask.len() {
            self.update_mask.resize(block + 1, 0);
        }
        self.update_mask[block] |= 1 << (index % BLOCK_BITS);
    }

    /// Clear trailing bits past the end and drop blocks no element uses
    fn truncate_mask(&mut self) {
        let len = self.values.len();
        self.update_mask.truncate(blocks_for(len));
        let tail = len % BLOCK_BITS;
        if tail != 0 {
            if let Some(last) = self.update_mask.last_mut() {
                *last &= !(u32::MAX << tail);
            }
        }
    }

    /// Write the element count followed by the per-element change mask
    pub fn write_update_mask<S: ByteSink + ?Sized>(&self, sink: &mut S, size_bits: u32) {
        let update_mask = &self.update_mask;
        write_dynamic_mask(sink, self.values.len(), size_bits, |block| {
            update_mask.get(block).copied().unwrap_or(0)
        });
    }

    /// Write the element count followed by an all-ones mask
    pub fn write_complete_update_mask<S: ByteSink + ?Sized>(&self, sink: &mut S, size_bits: u32) {
        write_complete_dynamic_update_mask(sink, self.values.len(), size_bits);
    }
}

impl<T: TrackedElement> DynamicUpdateField<T> {
    /// Forget element changes, including those nested inside elements
    pub fn clear_changes(&mut self) {
        for value in self.values.iter_mut() {
            value.clear_element_changes();
        }
        self.update_mask.fill(0);
    }
}

/// Write `size` followed by `size` one bits
pub fn write_complete_dynamic_update_mask<S: ByteSink + ?Sized>(
    sink: &mut S,
    size: usize,
    size_bits: u32,
) {
    write_dynamic_mask(sink, size, size_bits, |_| u32::MAX);
}

fn write_dynamic_mask<S, F>(sink: &mut S, size: usize, size_bits: u32, block: F)
where
    S: ByteSink + ?Sized,
    F: Fn(usize) -> u32,
{
    sink.write_size_bits(size_bits as usize, size);

    let full_blocks = size / BLOCK_BITS;
    if size > BLOCK_BITS && !sink.has_unfinished_bit_pack() {
        for index in 0..full_blocks {
            sink.write_u32(block(index));
        }
    } else {
        for index in 0..full_blocks {
            sink.write_bits(BLOCK_BITS, block(index));
        }
    }

    let tail = size % BLOCK_BITS;
    if tail != 0 {
        sink.write_bits(tail, block(full_blocks) & !(u32::MAX << tail));
    }
}

/// Mutable access to a dynamic collection, created after its record bit was marked
#[derive(Debug)]
pub struct DynamicFieldMut<'a, T> {
    field: &'a mut DynamicUpdateField<T>,
}

impl<'a, T: TrackedElement + Default> DynamicFieldMut<'a, T> {
    pub(crate) fn new(field: &'a mut DynamicUpdateField<T>) -> Self {
        Self { field }
    }

    /// Append a value; a nested record is marked changed in full
    pub fn push(&mut self, mut value: T) -> usize {
        value.mark_element_changed();
        self.field.values.push(value);
        let index = self.field.values.len() - 1;
        self.field.mark_element(index);
        index
    }

    /// Insert at `index`, re-marking every element from `index` on
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, value: T) {
        self.field.values.insert(index, value);
        self.remark_from(index);
    }

    /// Remove the element at `index`, shifting the rest down
    ///
    /// Panics if `index >= len`.
    pub fn remove(&mut self, index: usize) -> T {
        let removed = self.field.values.remove(index);
        self.remark_from(index);
        self.field.truncate_mask();
        removed
    }

    /// Mutable access to element `index`
    ///
    /// Indexing past the end grows the collection with default values and only
    /// the requested element is marked.
    pub fn get_mut(&mut self, index: usize) -> &mut T {
        let len = self.field.values.len();
        if index >= len {
            warn!(
                index = index,
                len = len,
                "Dynamic field written past its end, extending"
            );
            self.field.values.resize_with(index + 1, T::default);
        }
        self.field.mark_element(index);
        &mut self.field.values[index]
    }

    /// Overwrite element `index`, returning the previous value
    pub fn set(&mut self, index: usize, value: T) -> T {
        std::mem::replace(self.get_mut(index), value)
    }

    /// Remove every element
    pub fn clear(&mut self) {
        self.field.values.clear();
        self.field.update_mask.clear();
    }

    pub fn len(&self) -> usize {
        self.field.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field.is_empty()
    }

    fn remark_from(&mut self, index: usize) {
        for i in index..self.field.values.len() {
            self.field.mark_element(i);
            self.field.values[i].mark_element_changed();
        }
    }
}
