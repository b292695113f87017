//! # Partyhall
//!
//! A room-based multiplayer party game server.
//!
//! Clients connect over WebSocket, join a numbered room (creating it on
//! first join), and play one of five games against each other:
//! Number-Duel, Bluffing-Card, Hidden-Count-Guess, Speed-Match and
//! Board-Capture. Spectators may watch any room and dropped players may
//! reclaim their seat by name.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use partyhall::prelude::*;
//!
//! # async fn start() -> Result<(), PartyhallError> {
//! partyhall::setup_logger("my-server", "info");
//! let server = PartyhallServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod logger;
mod server;

pub use error::PartyhallError;
pub use logger::{default_filter, setup_logger};
pub use server::{PartyhallServer, PartyhallServerBuilder, ServerConfig};

/// Re-exports of the types most servers and clients need.
pub mod prelude {
    pub use crate::{PartyhallError, PartyhallServer, PartyhallServerBuilder, ServerConfig};
    pub use partyhall_protocol::{Codec, GameConfig, GameType, JsonCodec, LobbyRequest, PlayerId, RoomId};
    pub use partyhall_room::{
        GameAction, GameOver, GameOverReason, RegistryConfig, RoomError, ServerMessage, Timing,
    };
}
