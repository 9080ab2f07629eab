//! Byte sink contract
//!
//! The replication core never touches sockets. Everything it produces goes
//! through a [`ByteSink`]: an append-only writer that supports both bit-packed
//! runs and byte-aligned values in the same stream.
//!
//! Conventions:
//! - bits are packed MSB-first within each byte
//! - an open bit pack is zero-padded and flushed before any byte-aligned write
//! - byte-aligned scalars are little-endian

use crate::game::guid::ObjectGuid;

/// Bit-level output stream used by every record writer
pub trait ByteSink {
    /// Write a single bit, returning it so callers can branch on what they wrote
    fn write_bit(&mut self, bit: bool) -> bool;

    /// Write the low `count` bits of `value`, most significant first (`count <= 32`)
    fn write_bits(&mut self, count: usize, value: u32);

    /// Close the open bit pack, padding the current byte with zeroes
    fn flush_bits(&mut self);

    /// Whether a bit pack has been started and not yet flushed
    fn has_unfinished_bit_pack(&self) -> bool;

    /// Write an unsigned byte
    fn write_u8(&mut self, value: u8);

    /// Write a little-endian u16
    fn write_u16(&mut self, value: u16);

    /// Write a little-endian u32
    fn write_u32(&mut self, value: u32);

    /// Write a little-endian u64
    fn write_u64(&mut self, value: u64);

    /// Write raw bytes
    fn write_bytes(&mut self, bytes: &[u8]);

    /// Write a GUID in packed form
    fn write_packed_guid(&mut self, guid: ObjectGuid);

    /// Number of complete bytes written so far
    fn len(&self) -> usize;

    /// Whether nothing has been written yet
    fn is_empty(&self) -> bool {
        self.len() == 0 && !self.has_unfinished_bit_pack()
    }

    /// Write a `count`-bit size or length prefix
    ///
    /// Panics when `size` needs more than `count` bits.
    fn write_size_bits(&mut self, count: usize, size: usize) {
        assert!(
            count >= usize::BITS as usize || size >> count == 0,
            "size {} does not fit in a {}-bit prefix",
            size,
            count
        );
        self.write_bits(count, size as u32);
    }

    /// Write a little-endian i32
    fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    /// Write a little-endian i64
    fn write_i64(&mut self, value: i64) {
        self.write_u64(value as u64);
    }

    /// Write a little-endian IEEE-754 float
    fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    /// Write string bytes without any length prefix
    fn write_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }
}
