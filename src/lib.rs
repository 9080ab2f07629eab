//! Rustscape Replication Library
//!
//! Field-masked, per-viewer incremental replication of world entities.
//!
//! ## Modules
//!
//! - `config` - Replication configuration management
//! - `error` - Error types and result definitions
//! - `game` - GUIDs, entities, relationships and the world tick
//! - `net` - Byte sink contract and packet buffer
//! - `update` - Change masks, change-tracked records, viewer filtering and frames

pub mod config;
pub mod error;
pub mod game;
pub mod net;
pub mod update;

// Re-export commonly used types
pub use config::ReplicationConfig;
pub use error::{ProtocolError, ReplicationError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
