//! Game module
//!
//! The world-side half of replication:
//! - GUIDs and the entities that carry replicated fragments
//! - The relationship table answering visibility questions
//! - The world that owns entities and drives the tick loop

pub mod entity;
pub mod guid;
pub mod relations;
pub mod world;

pub use entity::{TypeId, TypeMask, WorldEntity};
pub use guid::{HighGuid, ObjectGuid};
pub use relations::RelationTable;
pub use world::{ReplicaWorld, WorldSettings, WorldState};
