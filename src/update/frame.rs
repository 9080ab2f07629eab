//! Replication frames
//!
//! A frame collects everything one receiver gets in one tick: destroyed and
//! out-of-range GUIDs plus the serialized create/values blocks.
//!
//! Packet layout:
//! ```text
//! u16   map id
//! bit   has destroy / out-of-range data
//!   u16   destroy count
//!   u32   destroy + out-of-range count
//!   packed guid * (destroy, then out-of-range)
//! u32   block count
//! u32   block bytes length
//! [u8]  block bytes
//! ```

use std::collections::BTreeSet;

use tracing::trace;

use crate::error::ProtocolError;
use crate::game::guid::ObjectGuid;
use crate::net::buffer::PacketBuffer;
use crate::net::sink::ByteSink;

/// Kind of an update block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UpdateType {
    /// Changed fields of an object the receiver knows
    Values = 0,
    /// Object entering the receiver's view
    CreateObject = 1,
    /// The receiver's own object
    CreateObject2 = 2,
}

impl UpdateType {
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(UpdateType::Values),
            1 => Ok(UpdateType::CreateObject),
            2 => Ok(UpdateType::CreateObject2),
            other => Err(ProtocolError::InvalidUpdateType(other)),
        }
    }
}

/// One serialized create or values block
#[derive(Debug, Clone)]
pub struct UpdateBlock {
    pub update_type: UpdateType,
    pub guid: ObjectGuid,
    pub data: PacketBuffer,
}

impl UpdateBlock {
    /// Size of the serialized block in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Per-receiver accumulator for one tick
#[derive(Debug, Default)]
pub struct ReplicationFrame {
    map_id: u16,
    destroy: BTreeSet<ObjectGuid>,
    out_of_range: BTreeSet<ObjectGuid>,
    block_count: u32,
    data: PacketBuffer,
}

impl ReplicationFrame {
    pub fn new(map_id: u16) -> Self {
        Self {
            map_id,
            ..Self::default()
        }
    }

    pub fn map_id(&self) -> u16 {
        self.map_id
    }

    /// Append a serialized block
    pub fn add_block(&mut self, block: &UpdateBlock) {
        trace!(
            guid = %block.guid,
            update_type = ?block.update_type,
            size = block.len(),
            "Appending update block"
        );
        self.data.append(&block.data);
        self.block_count += 1;
    }

    /// The object no longer exists
    pub fn add_destroy(&mut self, guid: ObjectGuid) {
        self.destroy.insert(guid);
    }

    /// The object still exists but left the receiver's view
    pub fn add_out_of_range(&mut self, guid: ObjectGuid) {
        self.out_of_range.insert(guid);
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    pub fn destroyed(&self) -> impl Iterator<Item = &ObjectGuid> {
        self.destroy.iter()
    }

    pub fn out_of_range(&self) -> impl Iterator<Item = &ObjectGuid> {
        self.out_of_range.iter()
    }

    /// Whether the frame carries anything worth sending
    pub fn has_data(&self) -> bool {
        self.block_count > 0 || !self.destroy.is_empty() || !self.out_of_range.is_empty()
    }

    /// Assemble the packet, failing if it would exceed `max_size` bytes
    pub fn build_packet(&self, max_size: usize) -> Result<PacketBuffer, ProtocolError> {
        let destroy_count =
            u16::try_from(self.destroy.len()).map_err(|_| ProtocolError::TooManyDestroyed {
                count: self.destroy.len(),
                max: u16::MAX as usize,
            })?;

        let mut packet = PacketBuffer::with_capacity(self.data.len() + 64);
        packet.write_u16(self.map_id);

        let has_removals = !self.destroy.is_empty() || !self.out_of_range.is_empty();
        if packet.write_bit(has_removals) {
            packet.write_u16(destroy_count);
            packet.write_u32((self.destroy.len() + self.out_of_range.len()) as u32);
            for guid in self.destroy.iter().chain(self.out_of_range.iter()) {
                packet.write_packed_guid(*guid);
            }
        }

        packet.write_u32(self.block_count);
        packet.write_u32(self.data.len() as u32);
        packet.write_bytes(self.data.as_bytes());
        packet.flush_bits();

        if packet.len() > max_size {
            return Err(ProtocolError::FrameTooLarge {
                size: packet.len(),
                max: max_size,
            });
        }
        Ok(packet)
    }

    /// Drop everything accumulated; the map id is kept
    pub fn clear(&mut self) {
        self.destroy.clear();
        self.out_of_range.clear();
        self.block_count = 0;
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::guid::HighGuid;

    fn block(guid: ObjectGuid, bytes: &[u8]) -> UpdateBlock {
        UpdateBlock {
            update_type: UpdateType::Values,
            guid,
            data: PacketBuffer::from_bytes(bytes),
        }
    }

    #[test]
    fn test_update_type_from_u8() {
        assert_eq!(UpdateType::from_u8(2), Ok(UpdateType::CreateObject2));
        assert_eq!(
            UpdateType::from_u8(7),
            Err(ProtocolError::InvalidUpdateType(7))
        );
    }

    #[test]
    fn test_empty_frame_layout() {
        let frame = ReplicationFrame::new(571);
        assert!(!frame.has_data());

        let packet = frame.build_packet(1024).unwrap();
        assert_eq!(
            packet.as_bytes(),
            &[0x3B, 0x02, 0x00, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_frame_with_removals_and_blocks() {
        let mut frame = ReplicationFrame::new(1);
        let gone = ObjectGuid::player(5);
        let far = ObjectGuid::create(HighGuid::Creature, 1, 10, 3);
        frame.add_destroy(gone);
        frame.add_out_of_range(far);
        frame.add_destroy(gone);
        frame.add_block(&block(ObjectGuid::player(9), &[0xAA, 0xBB]));

        let mut reader = frame.build_packet(1024).unwrap();
        assert_eq!(reader.read_u16().unwrap(), 1);
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.read_u16().unwrap(), 1);
        assert_eq!(reader.read_u32().unwrap(), 2);
        assert_eq!(reader.read_packed_guid().unwrap(), gone);
        assert_eq!(reader.read_packed_guid().unwrap(), far);
        assert_eq!(reader.read_u32().unwrap(), 1);
        assert_eq!(reader.read_u32().unwrap(), 2);
        assert_eq!(reader.read_bytes(2).unwrap(), vec![0xAA, 0xBB]);
        assert!(!reader.has_remaining());
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let mut frame = ReplicationFrame::new(0);
        frame.add_block(&block(ObjectGuid::player(1), &[0u8; 100]));

        assert_eq!(
            frame.build_packet(64).unwrap_err(),
            ProtocolError::FrameTooLarge { size: 111, max: 64 }
        );
    }

    #[test]
    fn test_destroy_count_must_fit_u16() {
        let mut frame = ReplicationFrame::new(0);
        for counter in 0..=u16::MAX as u64 {
            frame.add_destroy(ObjectGuid::player(counter + 1));
        }

        assert_eq!(
            frame.build_packet(usize::MAX).unwrap_err(),
            ProtocolError::TooManyDestroyed {
                count: 65536,
                max: 65535
            }
        );
    }

    #[test]
    fn test_clear_resets_frame() {
        let mut frame = ReplicationFrame::new(3);
        frame.add_destroy(ObjectGuid::player(1));
        frame.add_block(&block(ObjectGuid::player(2), &[1]));
        assert!(frame.has_data());

        frame.clear();
        assert!(!frame.has_data());
        assert_eq!(frame.block_count(), 0);
        assert_eq!(frame.map_id(), 3);
    }
}
