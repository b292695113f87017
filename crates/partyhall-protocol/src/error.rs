//! Error types for the protocol layer.
//!
//! Each crate in Partyhall defines its own error enum. When you see a
//! `ProtocolError`, the problem is in the shape of a message (bad JSON,
//! an out-of-range room number, an unknown game), not in networking or
//! game rules.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, an unknown `type` tag, missing
    /// required fields, or wrong field types.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A room number outside the four-digit range.
    #[error("room id must be between 1000 and 9999, got {0}")]
    RoomIdOutOfRange(u32),

    /// A game name that no room type answers to.
    #[error("unknown game type: {0}")]
    UnknownGameType(String),

    /// The message is invalid at the protocol level.
    ///
    /// For logical errors that pass deserialization but violate protocol
    /// rules, e.g. a message that needs a room sent outside of one.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
