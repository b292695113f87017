//! Wire protocol for Partyhall.
//!
//! This crate defines the parts of the wire format that exist before a
//! player is inside a room:
//!
//! - **Identities** ([`PlayerId`], [`RoomId`]) shared by every layer.
//! - **Game selection** ([`GameType`], [`GameConfig`]): which game a room
//!   hosts and the options requested at creation.
//! - **Lobby requests** ([`LobbyRequest`]): the lifecycle messages handled
//!   above a room's own dispatch (`join_room`, `spectate`, ...).
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become bytes.
//!
//! Game actions and outbound events are defined next to the games that
//! produce them, in `partyhall-room`.
//!
//! ```text
//! Transport (bytes) → Protocol (LobbyRequest | game action) → Room
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{GameConfig, GameType, LobbyRequest, PlayerId, RoomId};
