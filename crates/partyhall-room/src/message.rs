//! Game actions (client → room) and events (room → client).
//!
//! Both are internally tagged JSON records: `{"type": "guess", "number": 1234}`.
//! Field names are camelCase on the wire.

use partyhall_protocol::{GameType, PlayerId, RoomId};
use serde::{Deserialize, Serialize};

use crate::cards::{Card, Fruit, FruitCard, Rank};

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// An action a seated player takes inside a game.
///
/// Every room accepts `start_game`; the rest belong to one game each and
/// are answered with an error by the others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GameAction {
    StartGame,

    // Number duel
    SetNumber {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        number: Option<i64>,
        #[serde(default)]
        random: bool,
    },
    ConfirmNumber,
    Guess {
        number: i64,
    },

    // Bluffing game
    PlayCards {
        card_ids: Vec<String>,
        declared_rank: Rank,
        declared_count: usize,
    },
    Challenge,
    Pass,

    // Hidden count
    HideCaps {
        count: i64,
    },
    GuessNumber {
        number: i64,
    },

    // Speed match
    FlipCard,
    RingBell,

    // Board game
    PlaceStone {
        row: i64,
        col: i64,
    },
}

impl GameAction {
    /// The wire tag, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            GameAction::StartGame => "start_game",
            GameAction::SetNumber { .. } => "set_number",
            GameAction::ConfirmNumber => "confirm_number",
            GameAction::Guess { .. } => "guess",
            GameAction::PlayCards { .. } => "play_cards",
            GameAction::Challenge => "challenge",
            GameAction::Pass => "pass",
            GameAction::HideCaps { .. } => "hide_caps",
            GameAction::GuessNumber { .. } => "guess_number",
            GameAction::FlipCard => "flip_card",
            GameAction::RingBell => "ring_bell",
            GameAction::PlaceStone { .. } => "place_stone",
        }
    }
}

// ---------------------------------------------------------------------------
// Views shared by several events
// ---------------------------------------------------------------------------

/// Public information about one occupied seat.
///
/// Which optional fields are filled depends on the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    pub name: String,
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub losses: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discard_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cards: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_card: Option<FruitCard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eliminated: Option<bool>,
}

impl SeatView {
    pub fn new(name: impl Into<String>, connected: bool) -> Self {
        Self {
            name: name.into(),
            connected,
            confirmed: None,
            card_count: None,
            losses: None,
            draw_count: None,
            discard_count: None,
            total_cards: None,
            top_card: None,
            eliminated: None,
        }
    }
}

/// Extra turn details for the bluffing game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BluffTurn {
    pub can_challenge: bool,
    pub can_pass: bool,
    pub must_play: bool,
    pub declared_rank: Option<Rank>,
    pub pile_count: usize,
    pub play_order: Vec<usize>,
}

/// One entry of the number duel's guess history. A timed-out turn has no
/// guess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuessRecord {
    pub player_index: usize,
    pub guess: Option<u16>,
    pub correct_count: Option<u8>,
    pub round_number: u32,
}

/// One stone on the board game's move list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoneMove {
    pub player_index: usize,
    pub row: usize,
    pub col: usize,
    pub stone: u8,
}

/// What a bluffing-game play claimed, without its cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayView {
    pub player_index: usize,
    pub player_name: String,
    pub declared_rank: Rank,
    pub declared_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    /// A duel guess matched all four digits.
    Guessed,
    /// The opponent left mid-game.
    Disconnect,
    FiveInRow,
    Draw,
    /// A bluffing-game player emptied their hand.
    EmptyHand,
    /// Everyone else was eliminated or left.
    LastStanding,
}

/// Final placing of one seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    pub player_index: usize,
    pub player_name: String,
    pub rank: usize,
    pub is_winner: bool,
    pub is_loser: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOver {
    pub winner: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_name: Option<String>,
    pub reason: GameOverReason,
    /// Number duel: both secrets, revealed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numbers: Option<[Option<u16>; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rankings: Option<Vec<Ranking>>,
    /// Board game: the winning line, sorted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win_line: Option<Vec<[usize; 2]>>,
}

impl GameOver {
    pub fn new(winner: Option<usize>, reason: GameOverReason) -> Self {
        Self {
            winner,
            winner_name: None,
            reason,
            numbers: None,
            rankings: None,
            win_line: None,
        }
    }
}

/// A resolved bluffing-game challenge. Every card of the pile is shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeOutcome {
    pub challenger_index: usize,
    pub challenger_name: String,
    pub challenged_index: usize,
    pub challenged_name: String,
    pub declared_rank: Rank,
    pub revealed_cards: Vec<Card>,
    pub all_pile_cards: Vec<Card>,
    pub is_bluff: bool,
    pub loser_index: usize,
    pub loser_name: String,
    pub winner_index: usize,
    pub winner_name: String,
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Everything a spectator (or a reconnecting player) needs to rebuild the
/// public state of a room. Never contains an unrevealed secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub game_type: GameType,
    pub state: String,
    pub players: Vec<Option<SeatView>>,
    pub max_players: usize,
    pub turn_time_limit: u64,
    pub spectator_count: usize,
    pub game: GameView,
}

/// The game-specific half of a [`RoomSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum GameView {
    NumberDuel {
        current_turn: Option<usize>,
        round_number: u32,
        history: Vec<GuessRecord>,
        winner: Option<usize>,
        dice: Option<[u8; 2]>,
        /// Only once the game is over.
        numbers: Option<[Option<u16>; 2]>,
        turn_time_remaining: Option<u64>,
    },
    BluffCard {
        current_turn: Option<usize>,
        last_play: Option<PlayView>,
        pile_count: usize,
        round_number: u32,
        winners: Vec<usize>,
        play_order: Vec<usize>,
        deck_count: usize,
        shuffle_mode: bool,
    },
    HiddenCount {
        dealer_index: Option<usize>,
        round_players: usize,
        guess_order: Vec<usize>,
        current_guesser: Option<usize>,
        guessed_numbers: Vec<u8>,
        /// Only during the round result and after.
        revealed_count: Option<u8>,
        round_number: u32,
    },
    SpeedMatch {
        play_order: Vec<usize>,
        current_turn: Option<usize>,
        bell_locked: bool,
        round_number: u32,
    },
    BoardCapture {
        current_turn: Option<usize>,
        board: Vec<Vec<u8>>,
        history: Vec<StoneMove>,
        winner: Option<usize>,
        win_line: Option<Vec<[usize; 2]>>,
        dice: Option<[u8; 2]>,
        turn_time_remaining: Option<u64>,
    },
}

/// A player's own secret, sent only with their reconnect snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum PrivateView {
    Number { number: Option<u16>, confirmed: bool },
    Hand { hand: Vec<Card> },
    HiddenCount { count: u8 },
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Every event a client can receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    // -- connection and lifecycle --------------------------------------
    Connected {
        player_id: PlayerId,
    },
    Error {
        message: String,
    },
    RoomJoined {
        room_id: RoomId,
        player_id: PlayerId,
        player_index: usize,
        player_name: String,
        game_type: GameType,
        max_players: usize,
        turn_time_limit: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deck_count: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shuffle_mode: Option<bool>,
    },
    RoomLeft,
    Kicked {
        message: String,
    },
    PlayerJoined {
        player_index: usize,
        player_name: String,
    },
    PlayerLeft {
        player_index: usize,
        player_name: String,
    },
    PlayerIndexUpdate {
        player_index: usize,
    },
    PlayerList {
        players: Vec<Option<SeatView>>,
        max_players: usize,
    },
    PlayerAway {
        player_index: usize,
        player_name: String,
    },
    PlayerBack {
        player_index: usize,
        player_name: String,
    },
    PlayerDisconnected {
        player_index: usize,
        player_name: String,
    },
    OpponentDisconnected {
        player_index: usize,
        player_name: String,
    },
    SpectatorCount {
        count: usize,
    },
    SpectateJoined(RoomSnapshot),
    Reconnected {
        player_index: usize,
        snapshot: RoomSnapshot,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        private: Option<PrivateView>,
    },
    RoomDissolved {
        message: String,
        redirect: bool,
    },

    // -- shared game flow ----------------------------------------------
    StateChange {
        state: String,
    },
    DiceResult {
        dice: Vec<u8>,
    },
    DiceTie {
        tied_players: Vec<usize>,
    },
    FirstPlayer {
        player_index: usize,
        player_name: String,
    },
    TurnStart {
        player_index: usize,
        player_name: String,
        time_limit: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        round_number: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bluff: Option<BluffTurn>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table: Option<Vec<Option<SeatView>>>,
    },
    TurnTimeout {
        player_index: usize,
    },
    GameOver(GameOver),

    // -- number duel ---------------------------------------------------
    NumberSet {
        number: u16,
    },
    PlayerConfirmed {
        player_index: usize,
    },
    GuessResult {
        player_index: usize,
        guess: u16,
        correct_count: u8,
        round_number: u32,
    },

    // -- bluffing game -------------------------------------------------
    HandUpdate {
        hand: Vec<Card>,
    },
    CardsPlayed {
        player_index: usize,
        player_name: String,
        declared_rank: Rank,
        declared_count: usize,
        pile_count: usize,
    },
    PlayerPassed {
        player_index: usize,
        player_name: String,
        is_timeout: bool,
    },
    ChallengeResult(ChallengeOutcome),
    NewRound {
        round_number: u32,
        starter_index: Option<usize>,
    },

    // -- hidden count --------------------------------------------------
    DealerChosen {
        dealer_index: usize,
        dealer_name: String,
    },
    HidingPhase {
        dealer_index: usize,
        dealer_name: String,
        max_caps: usize,
        time_limit: u64,
    },
    CapsSet {
        count: u8,
    },
    CapsHidden {
        dealer_index: usize,
        dealer_name: String,
    },
    GuessTurn {
        guesser_index: usize,
        guesser_name: String,
        available_numbers: Vec<u8>,
        guessed_numbers: Vec<u8>,
        max_caps: usize,
        time_limit: u64,
    },
    NumberGuessed {
        guesser_index: usize,
        guesser_name: String,
        number: u8,
        correct: bool,
        is_timeout: bool,
    },
    RoundResult {
        loser_index: usize,
        loser_name: String,
        dealer_index: usize,
        dealer_lost: bool,
        revealed_count: u8,
        next_dealer_index: usize,
        guessed_numbers: Vec<u8>,
    },

    // -- speed match ---------------------------------------------------
    CardFlipped {
        player_index: usize,
        player_name: String,
        card: FruitCard,
        table: Vec<Option<SeatView>>,
    },
    PileRecycled {
        player_index: usize,
        player_name: String,
    },
    BellResult {
        ringer_index: usize,
        ringer_name: String,
        correct: bool,
        fruit: Option<Fruit>,
        cards_won: usize,
        cards_lost: usize,
        table: Vec<Option<SeatView>>,
    },
    PlayerEliminated {
        player_index: usize,
        player_name: String,
    },

    // -- board game ----------------------------------------------------
    StonePlaced {
        player_index: usize,
        row: usize,
        col: usize,
        stone: u8,
        move_number: usize,
    },
}

impl ServerMessage {
    /// Shorthand for an [`ServerMessage::Error`].
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}
