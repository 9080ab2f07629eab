//! Object GUIDs
//!
//! 128-bit identifiers for everything that can be replicated. The high half
//! carries the object kind, map and template entry; the low half is a
//! per-kind counter.
//!
//! High half layout (MSB to LSB):
//! | field     | bits |
//! |-----------|------|
//! | high type |    6 |
//! | reserved  |   13 |
//! | map id    |   16 |
//! | entry     |   23 |
//! | reserved  |    6 |

use std::fmt;

/// Kind of object a GUID refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HighGuid {
    Null = 0,
    Player = 2,
    Item = 3,
    Creature = 8,
    AreaTrigger = 12,
}

impl HighGuid {
    /// Convert from the raw 6-bit tag
    pub fn from_u8(value: u8) -> Self {
        match value {
            2 => Self::Player,
            3 => Self::Item,
            8 => Self::Creature,
            12 => Self::AreaTrigger,
            _ => Self::Null,
        }
    }
}

/// 128-bit object identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectGuid {
    high: u64,
    low: u64,
}

impl ObjectGuid {
    /// The empty GUID
    pub const EMPTY: ObjectGuid = ObjectGuid { high: 0, low: 0 };

    /// Create a GUID from raw halves
    pub const fn new(high: u64, low: u64) -> Self {
        Self { high, low }
    }

    /// Create a GUID for a world object
    pub fn create(high_type: HighGuid, map_id: u16, entry: u32, counter: u64) -> Self {
        let high = ((high_type as u64) << 58)
            | ((map_id as u64) << 29)
            | (((entry as u64) & 0x7F_FFFF) << 6);
        Self { high, low: counter }
    }

    /// Create a player GUID (players carry no map or entry)
    pub fn player(counter: u64) -> Self {
        Self::create(HighGuid::Player, 0, 0, counter)
    }

    /// High 64 bits
    #[inline]
    pub fn high(&self) -> u64 {
        self.high
    }

    /// Low 64 bits
    #[inline]
    pub fn low(&self) -> u64 {
        self.low
    }

    /// Whether this is the empty GUID
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.high == 0 && self.low == 0
    }

    /// Object kind
    pub fn high_type(&self) -> HighGuid {
        HighGuid::from_u8((self.high >> 58) as u8)
    }

    /// Map the object was created on
    pub fn map_id(&self) -> u16 {
        ((self.high >> 29) & 0xFFFF) as u16
    }

    /// Template entry
    pub fn entry(&self) -> u32 {
        ((self.high >> 6) & 0x7F_FFFF) as u32
    }

    /// Per-kind counter
    pub fn counter(&self) -> u64 {
        self.low
    }
}

impl fmt::Display for ObjectGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}-{}-{}-{:X}",
            self.high_type(),
            self.map_id(),
            self.entry(),
            self.low
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_round_trips_components() {
        let guid = ObjectGuid::create(HighGuid::Creature, 571, 31146, 42);
        assert_eq!(guid.high_type(), HighGuid::Creature);
        assert_eq!(guid.map_id(), 571);
        assert_eq!(guid.entry(), 31146);
        assert_eq!(guid.counter(), 42);
        assert!(!guid.is_empty());
    }

    #[test]
    fn test_empty() {
        assert!(ObjectGuid::EMPTY.is_empty());
        assert_eq!(ObjectGuid::default(), ObjectGuid::EMPTY);
        assert_eq!(ObjectGuid::EMPTY.high_type(), HighGuid::Null);
    }

    #[test]
    fn test_display() {
        let guid = ObjectGuid::create(HighGuid::Item, 0, 19019, 0xAB);
        assert_eq!(guid.to_string(), "Item-0-19019-AB");
    }
}
