//! Room configuration: per-game option resolution and the delay table.

use std::ops::RangeInclusive;
use std::time::Duration;

use partyhall_protocol::{GameConfig, GameType};

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Every fixed delay a room uses.
///
/// Most of these exist so that clients have time to animate (dice, card
/// reveals) before the next state arrives. Tests shorten them freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    /// How long a dropped player's seat is held mid-game.
    pub reconnect_grace: Duration,
    /// Delay between game over and the room dissolving.
    pub dissolve_delay: Duration,
    /// Number duel: time allowed for both players to confirm numbers.
    pub setup_timeout: Duration,
    /// Pause before dice are rolled.
    pub dice_delay: Duration,
    /// Pause between showing tied dice and announcing the tie.
    pub tie_notice_delay: Duration,
    /// Pause between the tie notice and the reroll.
    pub reroll_delay: Duration,
    /// Pause between the deciding roll and the first turn.
    pub first_turn_delay: Duration,
    /// Moves still count this long past the advertised turn limit. The
    /// turn timer fires when it runs out.
    pub turn_grace: Duration,
    /// Bluffing game: how long a revealed challenge stays on screen.
    pub challenge_view: Duration,
    /// Hidden count: dice → dealer announcement.
    pub dealer_announce_delay: Duration,
    /// Hidden count: dealer announcement → hiding phase.
    pub hiding_delay: Duration,
    /// Hidden count: caps hidden → first guess.
    pub guessing_delay: Duration,
    /// Hidden count: wrong guess → next guesser.
    pub next_guess_delay: Duration,
    /// Hidden count: round result → next hiding phase.
    pub round_result_delay: Duration,
    /// Speed match: flip → automatic turn advance.
    pub flip_advance: Duration,
    /// Speed match: bell lock after a correct ring.
    pub correct_ring_lock: Duration,
    /// Speed match: bell lock after a wrong ring.
    pub wrong_ring_lock: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(30),
            dissolve_delay: Duration::from_secs(10),
            setup_timeout: Duration::from_secs(60),
            dice_delay: Duration::from_millis(800),
            tie_notice_delay: Duration::from_millis(2200),
            reroll_delay: Duration::from_millis(1500),
            first_turn_delay: Duration::from_millis(2500),
            turn_grace: Duration::from_secs(2),
            challenge_view: Duration::from_secs(4),
            dealer_announce_delay: Duration::from_millis(1500),
            hiding_delay: Duration::from_millis(1500),
            guessing_delay: Duration::from_millis(800),
            next_guess_delay: Duration::from_millis(800),
            round_result_delay: Duration::from_secs(4),
            flip_advance: Duration::from_secs(3),
            correct_ring_lock: Duration::from_millis(2500),
            wrong_ring_lock: Duration::from_secs(2),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-game bounds
// ---------------------------------------------------------------------------

struct Bounds {
    players: RangeInclusive<u32>,
    default_players: u32,
    turn_secs: RangeInclusive<u32>,
    default_turn_secs: u32,
}

fn bounds(game_type: GameType) -> Bounds {
    match game_type {
        GameType::NumberDuel => Bounds {
            players: 2..=2,
            default_players: 2,
            turn_secs: 15..=60,
            default_turn_secs: 30,
        },
        GameType::BluffCard => Bounds {
            players: 2..=6,
            default_players: 6,
            turn_secs: 15..=30,
            default_turn_secs: 20,
        },
        GameType::HiddenCount => Bounds {
            players: 2..=6,
            default_players: 6,
            turn_secs: 6..=30,
            default_turn_secs: 12,
        },
        GameType::SpeedMatch => Bounds {
            players: 2..=6,
            default_players: 6,
            turn_secs: 3..=10,
            default_turn_secs: 5,
        },
        GameType::BoardCapture => Bounds {
            players: 2..=2,
            default_players: 2,
            turn_secs: 15..=60,
            default_turn_secs: 30,
        },
    }
}

const DECKS: RangeInclusive<u32> = 1..=4;

/// Keeps `value` if it lies in `range`, otherwise falls back to `default`.
fn within(value: Option<u32>, range: &RangeInclusive<u32>, default: u32) -> u32 {
    value.filter(|v| range.contains(v)).unwrap_or(default)
}

// ---------------------------------------------------------------------------
// RoomSettings
// ---------------------------------------------------------------------------

/// A room's resolved, validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSettings {
    pub game_type: GameType,
    pub max_players: usize,
    pub turn_time: Duration,
    pub deck_count: usize,
    pub shuffle_mode: bool,
    pub auto_start: bool,
    pub timing: Timing,
}

impl RoomSettings {
    /// Applies the game's defaults and bounds to requested options.
    ///
    /// Values outside a game's range are replaced by its default rather
    /// than clamped to the nearest edge.
    pub fn resolve(game_type: GameType, requested: &GameConfig) -> Self {
        let b = bounds(game_type);
        let max_players = within(requested.max_players, &b.players, b.default_players);
        let turn_secs = within(requested.turn_time, &b.turn_secs, b.default_turn_secs);
        let bluffing = game_type == GameType::BluffCard;
        Self {
            game_type,
            max_players: max_players as usize,
            turn_time: Duration::from_secs(u64::from(turn_secs)),
            deck_count: if bluffing {
                within(requested.deck_count, &DECKS, 1) as usize
            } else {
                1
            },
            shuffle_mode: bluffing && requested.shuffle_mode.unwrap_or(false),
            auto_start: game_type == GameType::NumberDuel
                && requested.auto_start.unwrap_or(true),
            timing: Timing::default(),
        }
    }

    /// Replaces the delay table.
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// The advertised turn limit in milliseconds, as sent to clients.
    pub fn turn_millis(&self) -> u64 {
        self.turn_time.as_millis() as u64
    }

    /// When a timed turn really ends: the turn timer fires then, and a
    /// move arriving later is refused.
    pub fn turn_deadline(&self) -> Duration {
        self.turn_time + self.timing.turn_grace
    }
}

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// Configuration for the [`RoomRegistry`](crate::RoomRegistry).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Empty rooms younger than this survive the sweep.
    pub idle_grace: Duration,
    /// How long a sweep waits on one room's answer before leaving it be.
    pub info_timeout: Duration,
    /// Command channel size for each room actor.
    pub command_buffer: usize,
    /// Delay table handed to every new room.
    pub timing: Timing,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_grace: Duration::from_secs(60),
            info_timeout: Duration::from_secs(1),
            command_buffer: 64,
            timing: Timing::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_empty_config_uses_game_defaults() {
        let duel = RoomSettings::resolve(GameType::NumberDuel, &GameConfig::default());
        assert_eq!(duel.max_players, 2);
        assert_eq!(duel.turn_time, Duration::from_secs(30));
        assert!(duel.auto_start);

        let bluff = RoomSettings::resolve(GameType::BluffCard, &GameConfig::default());
        assert_eq!(bluff.max_players, 6);
        assert_eq!(bluff.turn_time, Duration::from_secs(20));
        assert_eq!(bluff.deck_count, 1);
        assert!(!bluff.shuffle_mode);

        let speed = RoomSettings::resolve(GameType::SpeedMatch, &GameConfig::default());
        assert_eq!(speed.turn_time, Duration::from_secs(5));

        let hidden = RoomSettings::resolve(GameType::HiddenCount, &GameConfig::default());
        assert_eq!(hidden.turn_time, Duration::from_secs(12));
    }

    #[test]
    fn test_resolve_in_range_values_are_kept() {
        let config = GameConfig {
            max_players: Some(3),
            turn_time: Some(25),
            deck_count: Some(4),
            shuffle_mode: Some(true),
            ..GameConfig::default()
        };
        let settings = RoomSettings::resolve(GameType::BluffCard, &config);
        assert_eq!(settings.max_players, 3);
        assert_eq!(settings.turn_time, Duration::from_secs(25));
        assert_eq!(settings.deck_count, 4);
        assert!(settings.shuffle_mode);
    }

    #[test]
    fn test_resolve_out_of_range_values_fall_back_to_default() {
        let config = GameConfig {
            max_players: Some(9),
            turn_time: Some(120),
            deck_count: Some(0),
            ..GameConfig::default()
        };
        let settings = RoomSettings::resolve(GameType::BluffCard, &config);
        assert_eq!(settings.max_players, 6);
        assert_eq!(settings.turn_time, Duration::from_secs(20));
        assert_eq!(settings.deck_count, 1);
    }

    #[test]
    fn test_resolve_two_seat_games_ignore_max_players() {
        let config = GameConfig {
            max_players: Some(5),
            ..GameConfig::default()
        };
        assert_eq!(
            RoomSettings::resolve(GameType::BoardCapture, &config).max_players,
            2
        );
        assert_eq!(
            RoomSettings::resolve(GameType::NumberDuel, &config).max_players,
            2
        );
    }

    #[test]
    fn test_resolve_deck_options_only_apply_to_bluffing_game() {
        let config = GameConfig {
            deck_count: Some(3),
            shuffle_mode: Some(true),
            auto_start: Some(true),
            ..GameConfig::default()
        };
        let settings = RoomSettings::resolve(GameType::SpeedMatch, &config);
        assert_eq!(settings.deck_count, 1);
        assert!(!settings.shuffle_mode);
        assert!(!settings.auto_start);
    }

    #[test]
    fn test_turn_millis() {
        let settings = RoomSettings::resolve(GameType::SpeedMatch, &GameConfig::default());
        assert_eq!(settings.turn_millis(), 5_000);
    }
}
