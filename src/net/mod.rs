//! Networking module
//!
//! Byte-level plumbing shared by every writer:
//! - The `ByteSink` contract the replication core writes into
//! - `PacketBuffer`, the bit-packing buffer implementing it

pub mod buffer;
pub mod sink;

pub use buffer::PacketBuffer;
pub use sink::ByteSink;
