//! Core protocol types shared by every Partyhall layer.
//!
//! Everything here travels on the wire as camelCase JSON. Messages are
//! "tagged records": a `type` field names the variant and the remaining
//! fields carry its payload.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// An ephemeral identifier for one client connection.
///
/// A new `PlayerId` is issued for every connection. Reconnecting players
/// arrive with a fresh one and are matched back to their seat by display
/// name, so the id never has to survive a socket.
///
/// `#[serde(transparent)]` serializes `PlayerId(42)` as plain `42`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A four-digit room number in `1000..=9999`.
///
/// The inner value is private so a `RoomId` can only be obtained through
/// [`RoomId::new`] (or deserialization, which runs the same check). Any
/// `RoomId` in hand is therefore already in range.
///
/// `try_from`/`into` make serde go through the `u32` conversions below,
/// so `{"roomId": 42}` fails to decode instead of producing a bad id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RoomId(u16);

impl RoomId {
    /// Smallest valid room number.
    pub const MIN: u16 = 1000;
    /// Largest valid room number.
    pub const MAX: u16 = 9999;

    /// Validates and wraps a room number.
    ///
    /// # Errors
    /// Returns [`ProtocolError::RoomIdOutOfRange`] outside `1000..=9999`.
    pub fn new(value: u32) -> Result<Self, ProtocolError> {
        if (u32::from(Self::MIN)..=u32::from(Self::MAX)).contains(&value) {
            // In range, so the narrowing cast cannot truncate.
            Ok(Self(value as u16))
        } else {
            Err(ProtocolError::RoomIdOutOfRange(value))
        }
    }

    /// Returns the room number.
    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u32> for RoomId {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoomId> for u32 {
    fn from(id: RoomId) -> Self {
        u32::from(id.0)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Game selection
// ---------------------------------------------------------------------------

/// Which game a room hosts. Chosen once, when the room is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameType {
    /// Two players race to guess each other's secret four-digit number.
    NumberDuel,
    /// Shed your hand by playing face-down cards, calling bluffs.
    BluffCard,
    /// A dealer hides a count, everyone else guesses in turn.
    HiddenCount,
    /// Flip fruit cards and ring the bell when a fruit totals five.
    SpeedMatch,
    /// Five-in-a-row on a 15×15 board.
    BoardCapture,
}

impl GameType {
    /// Every game type, in a stable order.
    pub const ALL: [GameType; 5] = [
        GameType::NumberDuel,
        GameType::BluffCard,
        GameType::HiddenCount,
        GameType::SpeedMatch,
        GameType::BoardCapture,
    ];

    /// The wire name (matches the serde representation).
    pub fn as_str(self) -> &'static str {
        match self {
            GameType::NumberDuel => "number-duel",
            GameType::BluffCard => "bluff-card",
            GameType::HiddenCount => "hidden-count",
            GameType::SpeedMatch => "speed-match",
            GameType::BoardCapture => "board-capture",
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameType::ALL
            .into_iter()
            .find(|game| game.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownGameType(s.to_string()))
    }
}

/// Options requested when a room is created.
///
/// Every field is optional; the room resolves missing or out-of-range
/// values to the game's own defaults. Fields a game doesn't use are
/// ignored (e.g. `deckCount` outside the bluffing game).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    /// Seat count for variable-size games (2–6).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_players: Option<u32>,
    /// Turn length in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_time: Option<u32>,
    /// Number of 54-card decks for the bluffing game (1–4).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deck_count: Option<u32>,
    /// Deal from an (N+1)-deck shuffle truncated to N decks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shuffle_mode: Option<bool>,
    /// Number duel: begin setup as soon as the second player sits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_start: Option<bool>,
}

// ---------------------------------------------------------------------------
// Lobby requests
// ---------------------------------------------------------------------------

/// Lifecycle messages a client sends outside of any one game's rules.
///
/// These are handled by the connection handler and the room registry;
/// everything else a client sends is a game action routed into its room.
///
/// JSON shape (internally tagged):
/// ```json
/// {"type": "join_room", "roomId": 4242, "playerName": "ana", "gameType": "number-duel"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum LobbyRequest {
    /// Take a seat. Creates the room when it doesn't exist yet and a
    /// `gameType` is given.
    JoinRoom {
        room_id: RoomId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        game_type: Option<GameType>,
        #[serde(default)]
        config: GameConfig,
    },

    /// Watch a room without a seat.
    Spectate { room_id: RoomId },

    /// Reclaim a seat left behind by a dropped connection.
    Reconnect { room_id: RoomId, player_name: String },

    /// Give up the current seat (or stop spectating).
    LeaveRoom,

    /// Host only, before the game starts: remove another player.
    KickPlayer { player_index: usize },
}
