//! Unified error type for the Partyhall server.

use partyhall_protocol::ProtocolError;
use partyhall_room::RoomError;
use partyhall_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls,
/// so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum PartyhallError {
    /// Listening, accepting, or a socket read or write.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room-level error (full, not found, wrong phase).
    #[error(transparent)]
    Room(#[from] RoomError),
}

#[cfg(test)]
mod tests {
    use partyhall_protocol::RoomId;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err: PartyhallError = TransportError::Listen(io).into();
        assert!(matches!(err, PartyhallError::Transport(TransportError::Listen(_))));
        assert_eq!(err.to_string(), "listener error: port taken");
    }

    #[test]
    fn test_from_protocol_error() {
        let err: PartyhallError = ProtocolError::RoomIdOutOfRange(12).into();
        assert!(matches!(err, PartyhallError::Protocol(_)));
        assert!(err.to_string().contains("12"));
    }

    #[test]
    fn test_from_room_error_keeps_message() {
        let id = RoomId::new(4242).unwrap();
        let err: PartyhallError = RoomError::RoomFull(id).into();
        assert!(matches!(err, PartyhallError::Room(RoomError::RoomFull(_))));
        assert_eq!(err.to_string(), "room 4242 is full");
    }
}
