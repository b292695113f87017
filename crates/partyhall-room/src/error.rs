//! Error types for the room layer.

use partyhall_protocol::RoomId;

/// Errors that can occur during room operations.
///
/// These are the failures an operation reports back to its caller
/// (joining, reconnecting, kicking, creating a room). Rejected game
/// actions never surface here; the room answers the acting player with
/// an `error` message instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// Every player slot is taken.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The room is in a phase that doesn't allow this operation, e.g.
    /// joining after the game has started.
    #[error("the game has already started or ended ({0})")]
    WrongPhase(&'static str),

    /// No seat matches the name a reconnecting client presented.
    #[error("no disconnected player named {0:?} in this room")]
    NoSuchPlayer(String),

    /// Only the player in seat 0 may do this.
    #[error("only the host can do that")]
    NotHost,

    /// A kick aimed at an empty seat or at the host itself.
    #[error("invalid player index {0}")]
    InvalidTarget(usize),

    /// The name was kicked from this room earlier.
    #[error("{0:?} was removed from this room by the host")]
    Banned(String),

    /// The requested game type doesn't exist.
    #[error("unknown game type: {0}")]
    InvalidGameType(String),

    /// A room with this id is already running.
    #[error("room {0} already exists")]
    AlreadyExists(RoomId),

    /// All four-digit room numbers are taken.
    #[error("no free room ids left")]
    NoFreeRoomId,

    /// The room's command channel is full or closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}
