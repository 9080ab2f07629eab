//! Packet buffer implementation
//!
//! Provides a byte buffer with the read/write operations used by the update protocol:
//! - Little-endian integer and float types
//! - Implicit bit packing (MSB-first) interleaved with byte-aligned writes
//! - Packed GUIDs
//! - A matching read side so written frames can be decoded and inspected

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::game::guid::ObjectGuid;
use crate::net::sink::ByteSink;

/// Maximum packet size (64KB)
pub const MAX_PACKET_SIZE: usize = 65535;

/// Bit position value meaning "no bit pack open"
const NO_BIT_PACK: u8 = 8;

/// Packet buffer for reading and writing update protocol data
#[derive(Debug, Clone)]
pub struct PacketBuffer {
    /// Internal byte buffer
    data: BytesMut,
    /// Current read position
    read_pos: usize,
    /// Remaining free bits in `bit_value` while writing (8 = none open)
    bit_pos: u8,
    /// Byte being assembled by the open write bit pack
    bit_value: u8,
    /// Bits consumed from `read_bit_value` (8 = none loaded)
    read_bit_pos: u8,
    /// Byte being consumed by the open read bit pack
    read_bit_value: u8,
}

impl PacketBuffer {
    /// Create a new empty packet buffer
    pub fn new() -> Self {
        Self::wrap(BytesMut::new())
    }

    /// Create a packet buffer with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self::wrap(BytesMut::with_capacity(capacity))
    }

    /// Create a packet buffer from existing bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::wrap(BytesMut::from(bytes))
    }

    /// Create a packet buffer by wrapping a BytesMut
    pub fn wrap(data: BytesMut) -> Self {
        Self {
            data,
            read_pos: 0,
            bit_pos: NO_BIT_PACK,
            bit_value: 0,
            read_bit_pos: NO_BIT_PACK,
            read_bit_value: 0,
        }
    }

    // ============ Properties ============

    /// Get the current read position
    #[inline]
    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    /// Number of flushed bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the current write position (end of flushed data)
    #[inline]
    pub fn write_position(&self) -> usize {
        self.data.len()
    }

    /// Get the number of bytes remaining to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.read_pos)
    }

    /// Check if there are bytes remaining to read
    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Get a reference to the flushed bytes
    ///
    /// Bits of an open bit pack are not included until [`ByteSink::flush_bits`].
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Flush any open bit pack and take the underlying BytesMut
    pub fn into_inner(mut self) -> BytesMut {
        self.flush_bits();
        self.data
    }

    /// Clear the buffer and reset positions
    pub fn clear(&mut self) {
        self.data.clear();
        self.reset();
        self.bit_pos = NO_BIT_PACK;
        self.bit_value = 0;
    }

    /// Reset read position to start
    pub fn reset(&mut self) {
        self.read_pos = 0;
        self.read_bit_pos = NO_BIT_PACK;
        self.read_bit_value = 0;
    }

    /// Append the flushed contents of another buffer
    pub fn append(&mut self, other: &PacketBuffer) {
        self.write_bytes(other.as_bytes());
    }

    // ============ Reading Methods ============

    fn take(&mut self, count: usize) -> Result<&[u8], ProtocolError> {
        self.reset_bit_reader();
        if self.remaining() < count {
            return Err(ProtocolError::BufferUnderflow {
                needed: count,
                remaining: self.remaining(),
            });
        }
        let start = self.read_pos;
        self.read_pos += count;
        Ok(&self.data[start..start + count])
    }

    /// Read an unsigned byte
    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian u16
    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read a little-endian u32
    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a little-endian u64
    pub fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        let low = self.read_u32()? as u64;
        let high = self.read_u32()? as u64;
        Ok((high << 32) | low)
    }

    /// Read a little-endian i32
    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(self.read_u32()? as i32)
    }

    /// Read a little-endian i64
    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(self.read_u64()? as i64)
    }

    /// Read a little-endian float
    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Read a specific number of bytes
    pub fn read_bytes(&mut self, length: usize) -> Result<Vec<u8>, ProtocolError> {
        Ok(self.take(length)?.to_vec())
    }

    /// Read a string of known byte length
    pub fn read_string(&mut self, length: usize) -> Result<String, ProtocolError> {
        let bytes = self.take(length)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read a packed GUID
    pub fn read_packed_guid(&mut self) -> Result<ObjectGuid, ProtocolError> {
        let low_mask = self.read_u8()?;
        let high_mask = self.read_u8()?;
        let low = self.read_packed_u64(low_mask)?;
        let high = self.read_packed_u64(high_mask)?;
        Ok(ObjectGuid::new(high, low))
    }

    fn read_packed_u64(&mut self, mask: u8) -> Result<u64, ProtocolError> {
        let mut value = 0u64;
        for i in 0..8 {
            if mask & (1 << i) != 0 {
                value |= (self.read_u8()? as u64) << (i * 8);
            }
        }
        Ok(value)
    }

    // ============ Bit Reading ============

    /// Read a single bit
    pub fn read_bit(&mut self) -> Result<bool, ProtocolError> {
        if self.read_bit_pos >= NO_BIT_PACK {
            if !self.has_remaining() {
                return Err(ProtocolError::BufferUnderflow {
                    needed: 1,
                    remaining: 0,
                });
            }
            self.read_bit_value = self.data[self.read_pos];
            self.read_pos += 1;
            self.read_bit_pos = 0;
        }
        let bit = (self.read_bit_value >> (7 - self.read_bit_pos)) & 1 != 0;
        self.read_bit_pos += 1;
        Ok(bit)
    }

    /// Read `count` bits, most significant first
    pub fn read_bits(&mut self, count: usize) -> Result<u32, ProtocolError> {
        assert!(count <= 32, "cannot read {} bits into a u32", count);
        let mut value = 0u32;
        for i in (0..count).rev() {
            if self.read_bit()? {
                value |= 1 << i;
            }
        }
        Ok(value)
    }

    /// Discard the rest of the current read bit pack
    pub fn reset_bit_reader(&mut self) {
        self.read_bit_pos = NO_BIT_PACK;
        self.read_bit_value = 0;
    }
}

impl ByteSink for PacketBuffer {
    fn write_bit(&mut self, bit: bool) -> bool {
        self.bit_pos -= 1;
        if bit {
            self.bit_value |= 1 << self.bit_pos;
        }
        if self.bit_pos == 0 {
            self.data.put_u8(self.bit_value);
            self.bit_pos = NO_BIT_PACK;
            self.bit_value = 0;
        }
        bit
    }

    fn write_bits(&mut self, count: usize, value: u32) {
        assert!(count <= 32, "cannot write {} bits from a u32", count);
        for i in (0..count).rev() {
            self.write_bit((value >> i) & 1 != 0);
        }
    }

    fn flush_bits(&mut self) {
        if self.bit_pos == NO_BIT_PACK {
            return;
        }
        self.data.put_u8(self.bit_value);
        self.bit_pos = NO_BIT_PACK;
        self.bit_value = 0;
    }

    fn has_unfinished_bit_pack(&self) -> bool {
        self.bit_pos != NO_BIT_PACK
    }

    fn write_u8(&mut self, value: u8) {
        self.flush_bits();
        self.data.put_u8(value);
    }

    fn write_u16(&mut self, value: u16) {
        self.flush_bits();
        self.data.put_u16_le(value);
    }

    fn write_u32(&mut self, value: u32) {
        self.flush_bits();
        self.data.put_u32_le(value);
    }

    fn write_u64(&mut self, value: u64) {
        self.flush_bits();
        self.data.put_u64_le(value);
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.flush_bits();
        self.data.extend_from_slice(bytes);
    }

    fn write_packed_guid(&mut self, guid: ObjectGuid) {
        let (low_mask, low_bytes) = pack_u64(guid.low());
        let (high_mask, high_bytes) = pack_u64(guid.high());
        self.write_u8(low_mask);
        self.write_u8(high_mask);
        self.write_bytes(&low_bytes);
        self.write_bytes(&high_bytes);
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

/// Split a u64 into a presence mask and its non-zero bytes
fn pack_u64(value: u64) -> (u8, Vec<u8>) {
    let mut mask = 0u8;
    let mut bytes = Vec::with_capacity(8);
    for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
        if byte != 0 {
            mask |= 1 << i;
            bytes.push(byte);
        }
    }
    (mask, bytes)
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<u8>> for PacketBuffer {
    fn from(vec: Vec<u8>) -> Self {
        Self::from_bytes(&vec)
    }
}

impl From<&[u8]> for PacketBuffer {
    fn from(slice: &[u8]) -> Self {
        Self::from_bytes(slice)
    }
}

impl AsRef<[u8]> for PacketBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_read_write() {
        let mut buf = PacketBuffer::new();

        buf.write_u8(255);
        buf.write_u16(1234);
        buf.write_u32(987654);
        buf.write_u64(123456789012345);
        buf.write_f32(1.5);

        assert_eq!(buf.read_u8().unwrap(), 255);
        assert_eq!(buf.read_u16().unwrap(), 1234);
        assert_eq!(buf.read_u32().unwrap(), 987654);
        assert_eq!(buf.read_u64().unwrap(), 123456789012345);
        assert_eq!(buf.read_f32().unwrap(), 1.5);
        assert!(!buf.has_remaining());
    }

    #[test]
    fn test_little_endian_layout() {
        let mut buf = PacketBuffer::new();
        buf.write_u32(0x12345678);
        assert_eq!(buf.as_bytes(), &[0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_bit_packing_is_msb_first() {
        let mut buf = PacketBuffer::new();
        buf.write_bit(true);
        buf.write_bits(3, 0b010);
        assert!(buf.has_unfinished_bit_pack());
        assert_eq!(buf.len(), 0);

        buf.flush_bits();
        assert!(!buf.has_unfinished_bit_pack());
        assert_eq!(buf.as_bytes(), &[0b1010_0000]);
    }

    #[test]
    fn test_byte_write_flushes_bit_pack() {
        let mut buf = PacketBuffer::new();
        buf.write_bits(2, 0b11);
        buf.write_u8(0xAB);
        assert_eq!(buf.as_bytes(), &[0b1100_0000, 0xAB]);
    }

    #[test]
    fn test_full_byte_of_bits_closes_pack() {
        let mut buf = PacketBuffer::new();
        buf.write_bits(8, 0xA5);
        assert!(!buf.has_unfinished_bit_pack());
        assert_eq!(buf.as_bytes(), &[0xA5]);
    }

    #[test]
    fn test_bit_access() {
        let mut buf = PacketBuffer::new();

        buf.write_bits(1, 1);
        buf.write_bits(5, 15);
        buf.write_bits(11, 1234);
        buf.write_bits(32, 0xDEADBEEF);
        buf.write_u16(7);

        assert_eq!(buf.read_bits(1).unwrap(), 1);
        assert_eq!(buf.read_bits(5).unwrap(), 15);
        assert_eq!(buf.read_bits(11).unwrap(), 1234);
        assert_eq!(buf.read_bits(32).unwrap(), 0xDEADBEEF);
        assert_eq!(buf.read_u16().unwrap(), 7);
    }

    #[test]
    fn test_packed_guid() {
        let mut buf = PacketBuffer::new();
        let guid = ObjectGuid::new(0x0000_0100_0000_0000, 0x0000_0000_00FF_0001);
        buf.write_packed_guid(guid);

        // masks + 2 low bytes + 1 high byte
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.as_bytes()[0], 0b0000_0101);
        assert_eq!(buf.as_bytes()[1], 0b0010_0000);
        assert_eq!(buf.read_packed_guid().unwrap(), guid);
    }

    #[test]
    fn test_empty_guid_is_two_bytes() {
        let mut buf = PacketBuffer::new();
        buf.write_packed_guid(ObjectGuid::EMPTY);
        assert_eq!(buf.as_bytes(), &[0, 0]);
    }

    #[test]
    fn test_underflow() {
        let mut buf = PacketBuffer::from_bytes(&[1, 2]);
        let err = buf.read_u32().unwrap_err();
        assert_eq!(
            err,
            ProtocolError::BufferUnderflow {
                needed: 4,
                remaining: 2
            }
        );
    }

    #[test]
    fn test_into_inner_flushes() {
        let mut buf = PacketBuffer::new();
        buf.write_bit(true);
        let bytes = buf.into_inner();
        assert_eq!(&bytes[..], &[0x80]);
    }

    #[test]
    fn test_len_counts_flushed_bytes() {
        let mut buf = PacketBuffer::new();
        assert!(buf.is_empty());
        buf.write_bit(true);
        assert_eq!(buf.len(), 0);
        buf.write_u16(7);
        assert_eq!(buf.len(), 3);
    }
}
