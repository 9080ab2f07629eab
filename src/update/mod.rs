//! Field-masked replication
//!
//! Entities keep their replicated state in change-tracked records. Each tick
//! the per-receiver pass turns those records into create or values blocks,
//! filtered by what the receiver is allowed to see, and packs the blocks into
//! one [`ReplicationFrame`] per receiver.

pub mod builder;
pub mod dynamic;
pub mod field;
pub mod fields;
pub mod frame;
pub mod mask;
pub mod record;
pub mod sync;
pub mod value;
pub mod viewer;

pub use builder::{build_create_block, build_values_block};
pub use dynamic::{DynamicFieldMut, DynamicUpdateField};
pub use field::{
    FieldMut, OptionalFieldMut, OptionalUpdateField, UpdateField, UpdateFieldArray, SUMMARY_BIT,
};
pub use frame::{ReplicationFrame, UpdateBlock, UpdateType};
pub use mask::UpdateMask;
pub use record::{ChangeTracked, HasChangesMask, UpdateRecord};
pub use sync::ReplicationSync;
pub use value::{TrackedElement, UpdateValue};
pub use viewer::{
    resolve_viewer_flags, ViewContext, ViewerFlags, VisibilityPolicy, VisibilityRule,
    VisibilityTable,
};

/// Serialization knobs shared by every writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Records with at most this many bits skip the blocks-mask layer (capped at 32)
    pub single_block_threshold: usize,
    /// Bit width of dynamic collection size prefixes
    pub dynamic_size_bits: u32,
    /// Write quest log entries in full instead of through their own masks
    pub skip_quest_log_changes_mask: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            single_block_threshold: 32,
            dynamic_size_bits: 32,
            skip_quest_log_changes_mask: false,
        }
    }
}
