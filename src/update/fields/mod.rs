//! Record catalog
//!
//! Bit layouts of every replicated fragment. Bit 0 of each record is the
//! summary bit; the remaining bits follow field order. Create and update
//! writers emit fields in the same order.

pub mod area_trigger;
pub mod item;
pub mod object;
pub mod player;
pub mod unit;

pub use area_trigger::{AreaTriggerData, AreaTriggerShape};
pub use item::{ArtifactPower, ItemData, ItemEnchantment, SocketedGem};
pub use object::{ObjectData, UnitDynamicFlags};
pub use player::{ChrCustomizationChoice, DeclinedNames, PlayerData, QuestLog};
pub use unit::{NpcFlags, UnitData, VisibleItem};
