//! Rooms and games for Partyhall.
//!
//! Each room runs as an isolated Tokio task (actor model) owning one game
//! and the timers that drive it.
//!
//! # Key types
//!
//! - [`GameRoom`]: the trait each of the five games implements
//! - [`RoomSession`]: seats, spectators, timers and messaging every game embeds
//! - [`RoomRegistry`]: creates, looks up and evicts rooms
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`GameAction`] / [`ServerMessage`]: the in-room wire vocabulary
//! - [`RoomSettings`] / [`Timing`]: resolved per-room configuration

mod actor;
mod cards;
mod config;
mod error;
mod game;
mod games;
mod message;
mod random;
mod registry;
mod session;

#[cfg(test)]
mod testing;

pub use actor::{RoomHandle, RoomInfo, spawn_room};
pub use cards::{
    Card, Fruit, FruitCard, Rank, Suit, build_decks, build_fruit_deck, deal_round_robin,
    fruit_reaching_target, shuffled_deck, sort_hand,
};
pub use config::{RegistryConfig, RoomSettings, Timing};
pub use error::RoomError;
pub use game::GameRoom;
pub use games::{BluffCard, BoardCapture, HiddenCount, NumberDuel, SpeedMatch};
pub use message::{
    BluffTurn, ChallengeOutcome, GameAction, GameOver, GameOverReason, GameView, GuessRecord,
    PlayView, PrivateView, Ranking, RoomSnapshot, SeatView, ServerMessage, StoneMove,
};
pub use random::{
    Randomness, ScriptedRandomness, ThreadRandomness, choose, compare_digit_positions, shuffle,
    validate_four_digit,
};
pub use registry::{RoomRegistry, Sweep};
pub use session::{ClientHandle, ClientSender, DissolveHook, Outbound, RoomSession, Seat, TimerKey};
