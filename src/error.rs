//! Error handling module
//!
//! Defines custom error types for the replication layer.
//!
//! Most failure modes in this crate are programming errors (bit index out of
//! range, mismatched mask capacities) and panic instead of returning an error.
//! The types here cover the recoverable surfaces: configuration loading,
//! frame assembly limits and decoding with the packet reader.

use thiserror::Error;

/// Main error type for the replication layer
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Wire-protocol errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Wire-protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Buffer underflow: needed {needed} more bytes, {remaining} remaining")]
    BufferUnderflow { needed: usize, remaining: usize },

    #[error("Invalid update type: {0}")]
    InvalidUpdateType(u8),

    #[error("Invalid area trigger shape type: {0}")]
    InvalidShapeType(u8),

    #[error("Too many destroyed objects in one frame: {count} (max: {max})")]
    TooManyDestroyed { count: usize, max: usize },

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("String too long for field: {length} bytes (max: {max})")]
    InvalidStringLength { length: usize, max: usize },
}

/// Result type alias for replication operations
pub type Result<T> = std::result::Result<T, ReplicationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::InvalidUpdateType(9);
        assert_eq!(err.to_string(), "Invalid update type: 9");

        let err = ProtocolError::FrameTooLarge {
            size: 70000,
            max: 65535,
        };
        assert_eq!(err.to_string(), "Frame too large: 70000 bytes (max: 65535)");

        let err = ProtocolError::BufferUnderflow {
            needed: 4,
            remaining: 1,
        };
        assert_eq!(
            err.to_string(),
            "Buffer underflow: needed 4 more bytes, 1 remaining"
        );
    }

    #[test]
    fn test_protocol_error_conversion() {
        let err: ReplicationError = ProtocolError::InvalidShapeType(7).into();
        assert!(matches!(
            err,
            ReplicationError::Protocol(ProtocolError::InvalidShapeType(7))
        ));
        assert_eq!(
            err.to_string(),
            "Protocol error: Invalid area trigger shape type: 7"
        );
    }
}
