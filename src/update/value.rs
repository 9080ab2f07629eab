//! Wire encodings for field values
//!
//! [`UpdateValue`] covers everything a record writes as a single value.
//! [`TrackedElement`] is the capability used by arrays and dynamic
//! collections to reach into elements that carry their own change mask.

use crate::game::guid::ObjectGuid;
use crate::net::sink::ByteSink;

/// A value with a fixed wire encoding
pub trait UpdateValue: Clone + Default + PartialEq {
    /// Append this value to the sink
    fn write_value<S: ByteSink + ?Sized>(&self, sink: &mut S);
}

/// Element of an array or dynamic collection
///
/// Plain values use the no-op defaults. Nested records override both so a
/// freshly appended element is sent in full and clearing reaches into it.
pub trait TrackedElement {
    /// Mark every field of this element as changed
    fn mark_element_changed(&mut self) {}

    /// Drop this element's accumulated changes
    fn clear_element_changes(&mut self) {}
}

macro_rules! impl_update_value {
    ($($ty:ty => $method:ident),* $(,)?) => {
        $(
            impl UpdateValue for $ty {
                #[inline]
                fn write_value<S: ByteSink + ?Sized>(&self, sink: &mut S) {
                    sink.$method(*self);
                }
            }

            impl TrackedElement for $ty {}
        )*
    };
}

impl_update_value! {
    u8 => write_u8,
    u16 => write_u16,
    u32 => write_u32,
    u64 => write_u64,
    i32 => write_i32,
    i64 => write_i64,
    f32 => write_f32,
    ObjectGuid => write_packed_guid,
}

impl UpdateValue for i8 {
    fn write_value<S: ByteSink + ?Sized>(&self, sink: &mut S) {
        sink.write_u8(*self as u8);
    }
}

impl TrackedElement for i8 {}

impl UpdateValue for i16 {
    fn write_value<S: ByteSink + ?Sized>(&self, sink: &mut S) {
        sink.write_u16(*self as u16);
    }
}

impl TrackedElement for i16 {}

impl UpdateValue for bool {
    fn write_value<S: ByteSink + ?Sized>(&self, sink: &mut S) {
        sink.write_bit(*self);
    }
}

impl TrackedElement for bool {}

impl TrackedElement for String {}
