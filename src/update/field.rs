//! Change-tracked field slots
//!
//! A field never marks anything by itself. Reading goes through `get()` and is
//! always free; writing requires a [`FieldMut`] handed out by
//! [`ChangeTracked`](super::record::ChangeTracked), which sets the owning bits
//! in the record's mask before the guard exists.

use std::ops::{Deref, DerefMut};

use super::mask::UpdateMask;
use super::value::{TrackedElement, UpdateValue};
use crate::net::sink::ByteSink;

/// Bit 0 of every record: "something in this record changed"
pub const SUMMARY_BIT: usize = 0;

/// Mutable access to a field value, created only after its bits were marked
#[derive(Debug)]
pub struct FieldMut<'a, T> {
    value: &'a mut T,
}

impl<'a, T> FieldMut<'a, T> {
    pub(crate) fn new(value: &'a mut T) -> Self {
        Self { value }
    }

    /// Replace the value, returning the previous one
    pub fn set(self, value: T) -> T {
        std::mem::replace(self.value, value)
    }

    /// Consume the guard and borrow the value for the guard's lifetime
    pub fn into_mut(self) -> &'a mut T {
        self.value
    }
}

impl<T> Deref for FieldMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<T> DerefMut for FieldMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
    }
}

// ============ Scalar ============

/// A single value owning one bit of its record
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateField<T> {
    value: T,
    bit: usize,
}

impl<T> UpdateField<T> {
    pub fn new(bit: usize, value: T) -> Self {
        Self { value, bit }
    }

    /// Read the value
    #[inline]
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Bit this field owns
    #[inline]
    pub fn bit(&self) -> usize {
        self.bit
    }

    pub(crate) fn mark(&self, mask: &mut UpdateMask) {
        mask.set(SUMMARY_BIT);
        mask.set(self.bit);
    }

    pub(crate) fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: Default> UpdateField<T> {
    /// A default-valued field at `bit`
    pub fn at(bit: usize) -> Self {
        Self::new(bit, T::default())
    }
}

impl<T: UpdateValue> UpdateField<T> {
    pub fn write<S: ByteSink + ?Sized>(&self, sink: &mut S) {
        self.value.write_value(sink);
    }
}

impl<T: TrackedElement> UpdateField<T> {
    /// Clear nested changes held by the value
    pub fn clear_changes(&mut self) {
        self.value.clear_element_changes();
    }
}

// ============ Optional ============

/// A value that may be absent; written as a presence bit then the value
#[derive(Debug, Clone, PartialEq)]
pub struct OptionalUpdateField<T> {
    value: Option<T>,
    bit: usize,
}

impl<T> OptionalUpdateField<T> {
    pub fn new(bit: usize) -> Self {
        Self { value: None, bit }
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    #[inline]
    pub fn bit(&self) -> usize {
        self.bit
    }

    pub(crate) fn mark(&self, mask: &mut UpdateMask) {
        mask.set(SUMMARY_BIT);
        mask.set(self.bit);
    }

    pub(crate) fn value_mut(&mut self) -> &mut Option<T> {
        &mut self.value
    }

    /// Write the presence bit only
    pub fn write_presence<S: ByteSink + ?Sized>(&self, sink: &mut S) -> bool {
        sink.write_bit(self.value.is_some())
    }
}

impl<T: TrackedElement> OptionalUpdateField<T> {
    pub fn clear_changes(&mut self) {
        if let Some(value) = self.value.as_mut() {
            value.clear_element_changes();
        }
    }
}

/// Mutable access to an optional field
#[derive(Debug)]
pub struct OptionalFieldMut<'a, T> {
    value: &'a mut Option<T>,
}

impl<'a, T> OptionalFieldMut<'a, T> {
    pub(crate) fn new(value: &'a mut Option<T>) -> Self {
        Self { value }
    }

    /// Store a value, returning the previous one
    pub fn set(self, value: T) -> Option<T> {
        self.value.replace(value)
    }

    /// Remove the value
    pub fn clear(self) -> Option<T> {
        self.value.take()
    }

    /// Borrow the stored value, inserting a default one if absent
    pub fn get_or_insert_default(self) -> &'a mut T
    where
        T: Default,
    {
        self.value.get_or_insert_with(T::default)
    }
}

// ============ Fixed array ============

/// A fixed-size array owning one "any element" bit plus one bit per element
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateFieldArray<T, const N: usize> {
    values: [T; N],
    bit: usize,
    first_element_bit: usize,
}

impl<T: Default, const N: usize> UpdateFieldArray<T, N> {
    pub fn new(bit: usize, first_element_bit: usize) -> Self {
        Self {
            values: std::array::from_fn(|_| T::default()),
            bit,
            first_element_bit,
        }
    }
}

impl<T, const N: usize> UpdateFieldArray<T, N> {
    /// Number of elements
    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// Read element `index`
    ///
    /// Panics if `index >= N`.
    pub fn get(&self, index: usize) -> &T {
        assert!(index < N, "array index {} out of range ({})", index, N);
        &self.values[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }

    /// The array's own bit
    #[inline]
    pub fn bit(&self) -> usize {
        self.bit
    }

    /// Bit owned by element `index`
    #[inline]
    pub fn element_bit(&self, index: usize) -> usize {
        self.first_element_bit + index
    }

    pub(crate) fn mark(&self, mask: &mut UpdateMask, index: usize) {
        assert!(index < N, "array index {} out of range ({})", index, N);
        mask.set(SUMMARY_BIT);
        mask.set(self.bit);
        mask.set(self.element_bit(index));
    }

    pub(crate) fn element_mut(&mut self, index: usize) -> &mut T {
        &mut self.values[index]
    }
}

impl<T: TrackedElement, const N: usize> UpdateFieldArray<T, N> {
    /// Clear nested changes held by every element
    pub fn clear_changes(&mut self) {
        for value in self.values.iter_mut() {
            value.clear_element_changes();
        }
    }
}

impl<T: UpdateValue, const N: usize> UpdateFieldArray<T, N> {
    /// Write element `index`
    pub fn write_element<S: ByteSink + ?Sized>(&self, sink: &mut S, index: usize) {
        self.get(index).write_value(sink);
    }
}
