//! Number duel: each player hides a four-digit number and the two take
//! turns guessing the other's, scored by matching digit positions.

use partyhall_protocol::PlayerId;
use tokio::time::Instant;

use super::dice::OpeningRoll;
use crate::error::RoomError;
use crate::game::GameRoom;
use crate::message::{
    GameAction, GameOver, GameOverReason, GameView, GuessRecord, PrivateView, SeatView,
    ServerMessage,
};
use crate::random::{compare_digit_positions, validate_four_digit};
use crate::session::{ClientHandle, RoomSession, TimerKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Waiting,
    Setup,
    Rolling,
    Playing,
    Finished,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Waiting => "WAITING",
            Phase::Setup => "SETUP",
            Phase::Rolling => "ROLLING",
            Phase::Playing => "PLAYING",
            Phase::Finished => "FINISHED",
        }
    }
}

/// A duellist's secret.
#[derive(Debug, Default)]
pub struct DuelSeat {
    number: Option<u16>,
    confirmed: bool,
}

#[derive(Debug)]
pub struct NumberDuel {
    session: RoomSession<DuelSeat>,
    phase: Phase,
    roll: OpeningRoll,
    current_turn: Option<usize>,
    round_number: u32,
    history: Vec<GuessRecord>,
    winner: Option<usize>,
    turn_started: Option<Instant>,
    /// Set once the current player's guess is accepted.
    turn_locked: bool,
    /// Both secrets, once they may be shown.
    revealed: Option<[Option<u16>; 2]>,
}

impl NumberDuel {
    fn numbers(&self) -> [Option<u16>; 2] {
        [0, 1].map(|i| self.session.seat(i).and_then(|s| s.state.number))
    }

    fn start_game(&mut self, index: usize) {
        if self.phase != Phase::Waiting {
            self.session.send_error(index, "the game has already started");
            return;
        }
        if index != 0 {
            self.session.send_error(index, "only the host can start the game");
            return;
        }
        if self.session.player_count() < 2 {
            self.session.send_error(index, "waiting for an opponent");
            return;
        }
        self.enter_setup();
    }

    fn enter_setup(&mut self) {
        self.phase = Phase::Setup;
        self.session.broadcast_state(self.phase.name());
        let timeout = self.session.settings().timing.setup_timeout;
        self.session.schedule(TimerKey::Phase, timeout);
        tracing::info!(room_id = %self.session.room_id(), "number setup started");
    }

    fn set_number(&mut self, index: usize, number: Option<i64>, random: bool) {
        if self.phase != Phase::Setup {
            self.session.send_error(index, "numbers can only be set before the game");
            return;
        }
        let candidate = if random {
            Some(1000 + self.session.rng().below(9000) as i64)
        } else {
            number
        };
        let Some(number) = candidate.filter(|n| validate_four_digit(*n)) else {
            self.session
                .send_error(index, "the number must be between 1000 and 9999");
            return;
        };
        let Some(seat) = self.session.seat_mut(index) else {
            return;
        };
        if seat.state.confirmed {
            self.session
                .send_error(index, "your number is already confirmed");
            return;
        }
        // Range checked above.
        let number = number as u16;
        seat.state.number = Some(number);
        self.session.send_to(index, ServerMessage::NumberSet { number });
    }

    fn confirm_number(&mut self, index: usize) {
        if self.phase != Phase::Setup {
            self.session.send_error(index, "numbers can only be set before the game");
            return;
        }
        let Some(seat) = self.session.seat_mut(index) else {
            return;
        };
        if seat.state.number.is_none() {
            self.session.send_error(index, "set a number first");
            return;
        }
        if seat.state.confirmed {
            self.session.send_error(index, "your number is already confirmed");
            return;
        }
        seat.state.confirmed = true;
        self.session
            .broadcast(ServerMessage::PlayerConfirmed { player_index: index });

        let all_confirmed = (0..2).all(|i| {
            self.session
                .seat(i)
                .is_some_and(|seat| seat.state.confirmed)
        });
        if all_confirmed {
            self.session.cancel(TimerKey::Phase);
            self.phase = Phase::Rolling;
            self.session.broadcast_state(self.phase.name());
            self.roll.begin(&mut self.session);
        }
    }

    fn start_playing(&mut self, first: usize) {
        self.phase = Phase::Playing;
        self.round_number = 1;
        self.current_turn = Some(first);
        self.session.broadcast_state(self.phase.name());
        self.session.broadcast(ServerMessage::FirstPlayer {
            player_index: first,
            player_name: self.session.name_of(first),
        });
        self.start_turn(first);
    }

    fn start_turn(&mut self, index: usize) {
        self.turn_started = Some(Instant::now());
        self.turn_locked = false;
        let limit = self.session.settings().turn_deadline();
        self.session.broadcast(ServerMessage::TurnStart {
            player_index: index,
            player_name: self.session.name_of(index),
            time_limit: self.session.settings().turn_millis(),
            round_number: Some(self.round_number),
            bluff: None,
            table: None,
        });
        self.session.schedule(TimerKey::Turn, limit);
    }

    fn next_turn(&mut self) {
        let next = self.current_turn.map_or(0, |turn| 1 - turn);
        self.current_turn = Some(next);
        self.round_number += 1;
        self.start_turn(next);
    }

    fn guess(&mut self, index: usize, guess: i64) {
        if self.phase != Phase::Playing {
            self.session.send_error(index, "the game is not in progress");
            return;
        }
        if self.current_turn != Some(index) {
            self.session.send_error(index, "it is not your turn");
            return;
        }
        if self.turn_locked {
            self.session
                .send_error(index, "you already guessed this turn");
            return;
        }
        let deadline = self.session.settings().turn_deadline();
        if self.turn_started.is_some_and(|start| start.elapsed() > deadline) {
            self.session.send_error(index, "your turn has timed out");
            return;
        }
        if !validate_four_digit(guess) {
            self.session
                .send_error(index, "the guess must be between 1000 and 9999");
            return;
        }
        let Some(target) = self.session.seat(1 - index).and_then(|s| s.state.number) else {
            return;
        };
        // Range checked above.
        let guess = guess as u16;

        self.turn_locked = true;
        self.session.cancel(TimerKey::Turn);
        let correct_count = compare_digit_positions(guess, target);
        self.history.push(GuessRecord {
            player_index: index,
            guess: Some(guess),
            correct_count: Some(correct_count),
            round_number: self.round_number,
        });
        self.session.broadcast(ServerMessage::GuessResult {
            player_index: index,
            guess,
            correct_count,
            round_number: self.round_number,
        });

        if correct_count == 4 {
            let numbers = self.numbers();
            self.phase = Phase::Finished;
            self.winner = Some(index);
            self.revealed = Some(numbers);
            let mut over = GameOver::new(Some(index), GameOverReason::Guessed);
            over.winner_name = Some(self.session.name_of(index));
            over.numbers = Some(numbers);
            self.session.broadcast(ServerMessage::GameOver(over));
            tracing::info!(
                room_id = %self.session.room_id(),
                winner = index,
                rounds = self.round_number,
                "number guessed"
            );
            let delay = self.session.settings().timing.dissolve_delay;
            self.session.schedule_dissolve(delay);
            return;
        }
        self.next_turn();
    }

    fn turn_timed_out(&mut self) {
        let Some(index) = self.current_turn else {
            return;
        };
        self.history.push(GuessRecord {
            player_index: index,
            guess: None,
            correct_count: None,
            round_number: self.round_number,
        });
        self.session
            .broadcast(ServerMessage::TurnTimeout { player_index: index });
        self.next_turn();
    }

    /// The opponent left mid-game: the remaining player wins. The numbers
    /// go to spectators only.
    fn forfeit(&mut self, winner: usize, leaver: usize, leaver_name: String, numbers: [Option<u16>; 2]) {
        self.phase = Phase::Finished;
        self.winner = Some(winner);
        self.revealed = Some(numbers);

        self.session.send_to(
            winner,
            ServerMessage::OpponentDisconnected {
                player_index: leaver,
                player_name: leaver_name.clone(),
            },
        );
        let mut over = GameOver::new(Some(winner), GameOverReason::Disconnect);
        over.winner_name = Some(self.session.name_of(winner));
        self.session
            .send_to(winner, ServerMessage::GameOver(over.clone()));

        self.session.send_to_spectators(ServerMessage::PlayerDisconnected {
            player_index: leaver,
            player_name: leaver_name,
        });
        over.numbers = Some(numbers);
        self.session.send_to_spectators(ServerMessage::GameOver(over));

        let delay = self.session.settings().timing.dissolve_delay;
        self.session.schedule_dissolve(delay);
    }
}

impl GameRoom for NumberDuel {
    type Seat = DuelSeat;

    fn create(session: RoomSession<DuelSeat>) -> Self {
        Self {
            session,
            phase: Phase::Waiting,
            roll: OpeningRoll::default(),
            current_turn: None,
            round_number: 0,
            history: Vec::new(),
            winner: None,
            turn_started: None,
            turn_locked: false,
            revealed: None,
        }
    }

    fn session(&self) -> &RoomSession<DuelSeat> {
        &self.session
    }

    fn session_mut(&mut self) -> &mut RoomSession<DuelSeat> {
        &mut self.session
    }

    fn phase_name(&self) -> &'static str {
        self.phase.name()
    }

    fn is_waiting(&self) -> bool {
        self.phase == Phase::Waiting
    }

    fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    fn add_player(&mut self, client: ClientHandle, name: String) -> Result<usize, RoomError> {
        let index = self.seat_player(client, name, DuelSeat::default())?;
        self.broadcast_player_list();
        if self.session.settings().auto_start && self.session.player_count() == 2 {
            self.enter_setup();
        }
        Ok(index)
    }

    fn remove_player(&mut self, player: PlayerId) {
        let Some(index) = self.session.index_of(player) else {
            return;
        };
        let numbers = self.numbers();
        let name = self.session.name_of(index);
        self.session.seats_mut()[index] = None;
        self.session.cancel(TimerKey::Turn);
        self.session.cancel(TimerKey::Phase);
        tracing::info!(room_id = %self.session.room_id(), %player, phase = self.phase.name(), "player removed");

        let other = 1 - index;
        let other_present = self.session.is_seated(other);
        match self.phase {
            Phase::Setup | Phase::Rolling | Phase::Playing => {
                if other_present {
                    self.forfeit(other, index, name, numbers);
                } else {
                    self.phase = Phase::Finished;
                    let delay = self.session.settings().timing.dissolve_delay;
                    self.session.schedule_dissolve(delay);
                }
            }
            Phase::Waiting => {
                if other_present && other != 0 {
                    let seats = self.session.seats_mut();
                    seats.swap(0, other);
                    self.session
                        .send_to(0, ServerMessage::PlayerIndexUpdate { player_index: 0 });
                }
                self.session.broadcast(ServerMessage::PlayerLeft {
                    player_index: index,
                    player_name: name,
                });
                self.session.broadcast_state(self.phase.name());
                self.broadcast_player_list();
            }
            Phase::Finished => {
                self.session.broadcast(ServerMessage::PlayerLeft {
                    player_index: index,
                    player_name: name,
                });
            }
        }
    }

    fn handle_message(&mut self, sender: PlayerId, action: GameAction) {
        let Some(index) = self.session.index_of(sender) else {
            tracing::debug!(%sender, "action from unseated connection ignored");
            return;
        };
        match action {
            GameAction::StartGame => self.start_game(index),
            GameAction::SetNumber { number, random } => self.set_number(index, number, random),
            GameAction::ConfirmNumber => self.confirm_number(index),
            GameAction::Guess { number } => self.guess(index, number),
            other => self.session.send_error(
                index,
                format!("`{}` is not a number duel action", other.name()),
            ),
        }
    }

    fn on_timer(&mut self, key: TimerKey) {
        match (key, self.phase) {
            (TimerKey::Phase, Phase::Setup) => {
                self.phase = Phase::Finished;
                self.session
                    .dissolve("numbers were not set in time, the room has closed");
            }
            (TimerKey::Phase, Phase::Rolling) => {
                if let Some(first) = self.roll.advance(&mut self.session) {
                    self.start_playing(first);
                }
            }
            (TimerKey::Turn, Phase::Playing) => self.turn_timed_out(),
            _ => {}
        }
    }

    fn player_views(&self) -> Vec<Option<SeatView>> {
        self.session.seat_views(|seat| SeatView {
            confirmed: Some(seat.state.confirmed),
            ..seat.view()
        })
    }

    fn game_view(&self) -> GameView {
        GameView::NumberDuel {
            current_turn: self.current_turn,
            round_number: self.round_number,
            history: self.history.clone(),
            winner: self.winner,
            dice: self.roll.dice(),
            numbers: self.revealed,
            turn_time_remaining: (self.phase == Phase::Playing)
                .then(|| self.session.turn_remaining_millis())
                .flatten(),
        }
    }

    fn private_view(&self, index: usize) -> Option<PrivateView> {
        self.session.seat(index).map(|seat| PrivateView::Number {
            number: seat.state.number,
            confirmed: seat.state.confirmed,
        })
    }
}

#[cfg(test)]
mod tests {
    use partyhall_protocol::{GameConfig, GameType};

    use super::*;
    use crate::random::ScriptedRandomness;
    use crate::testing::{drain, drain_all, errors, new_room, pid, seat_all};

    fn duel(dice: &[u8]) -> NumberDuel {
        new_room(
            GameType::NumberDuel,
            GameConfig::default(),
            ScriptedRandomness::new().with_dice(dice.iter().copied()),
        )
    }

    /// Seats two players, sets and confirms both numbers, and runs the
    /// opening roll to completion.
    fn playing(dice: &[u8], numbers: [i64; 2]) -> (NumberDuel, Vec<crate::testing::Inbox>) {
        let mut room = duel(dice);
        let mut inboxes = seat_all(&mut room, &["ana", "ben"]);
        for (i, number) in numbers.into_iter().enumerate() {
            let id = pid(i as u64 + 1);
            room.handle_message(id, GameAction::SetNumber { number: Some(number), random: false });
            room.handle_message(id, GameAction::ConfirmNumber);
        }
        while room.phase == Phase::Rolling {
            room.fire_timer(TimerKey::Phase);
        }
        drain_all(&mut inboxes);
        (room, inboxes)
    }

    #[test]
    fn test_duel_second_player_auto_starts_setup() {
        let mut room = duel(&[]);
        let mut inboxes = seat_all(&mut room, &["ana", "ben"]);

        assert_eq!(room.phase, Phase::Setup);
        assert!(room.session.timers().is_pending(TimerKey::Phase));
        let seen = drain(&mut inboxes[0]);
        assert!(seen.contains(&ServerMessage::StateChange {
            state: "SETUP".into()
        }));
    }

    #[test]
    fn test_duel_host_start_without_auto_start() {
        let config = GameConfig {
            auto_start: Some(false),
            ..GameConfig::default()
        };
        let mut room: NumberDuel =
            new_room(GameType::NumberDuel, config, ScriptedRandomness::new());
        let mut inboxes = seat_all(&mut room, &["ana", "ben"]);
        assert_eq!(room.phase, Phase::Waiting);

        room.handle_message(pid(2), GameAction::StartGame);
        assert_eq!(errors(&drain(&mut inboxes[1])).len(), 1);
        assert_eq!(room.phase, Phase::Waiting);

        room.handle_message(pid(1), GameAction::StartGame);
        assert_eq!(room.phase, Phase::Setup);
    }

    #[test]
    fn test_duel_confirmation_never_broadcasts_the_number() {
        let mut room = duel(&[]);
        let mut inboxes = seat_all(&mut room, &["ana", "ben"]);
        drain_all(&mut inboxes);

        room.handle_message(pid(1), GameAction::SetNumber { number: Some(1357), random: false });
        room.handle_message(pid(1), GameAction::ConfirmNumber);

        let own = drain(&mut inboxes[0]);
        assert!(own.contains(&ServerMessage::NumberSet { number: 1357 }));
        let theirs = drain(&mut inboxes[1]);
        assert_eq!(theirs, vec![ServerMessage::PlayerConfirmed { player_index: 0 }]);
        let json = serde_json::to_string(&theirs).unwrap();
        assert!(!json.contains("1357"));
    }

    #[test]
    fn test_duel_set_number_out_of_range_rejected() {
        let mut room = duel(&[]);
        let mut inboxes = seat_all(&mut room, &["ana", "ben"]);
        drain_all(&mut inboxes);

        room.handle_message(pid(1), GameAction::SetNumber { number: Some(999), random: false });
        room.handle_message(pid(1), GameAction::ConfirmNumber);

        assert_eq!(errors(&drain(&mut inboxes[0])).len(), 2);
        assert_eq!(room.session.seat(0).unwrap().state.number, None);
        assert!(!room.session.seat(0).unwrap().state.confirmed);
    }

    #[test]
    fn test_duel_setup_timeout_dissolves_room() {
        let mut room = duel(&[]);
        let mut inboxes = seat_all(&mut room, &["ana", "ben"]);
        drain_all(&mut inboxes);

        room.fire_timer(TimerKey::Phase);

        assert!(room.session.is_dissolved());
        assert_eq!(room.session.player_count(), 0);
        assert!(drain(&mut inboxes[1])
            .iter()
            .any(|m| matches!(m, ServerMessage::RoomDissolved { .. })));
    }

    #[test]
    fn test_duel_tied_dice_reroll_then_higher_roll_leads() {
        let mut room = duel(&[3, 3, 4, 1]);
        let mut inboxes = seat_all(&mut room, &["ana", "ben"]);
        for id in [pid(1), pid(2)] {
            room.handle_message(id, GameAction::SetNumber { number: None, random: true });
            room.handle_message(id, GameAction::ConfirmNumber);
        }
        assert_eq!(room.phase, Phase::Rolling);
        drain_all(&mut inboxes);

        while room.phase == Phase::Rolling {
            room.fire_timer(TimerKey::Phase);
        }

        let seen = drain(&mut inboxes[1]);
        let dice: Vec<_> = seen
            .iter()
            .filter_map(|m| match m {
                ServerMessage::DiceResult { dice } => Some(dice.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(dice, vec![vec![3, 3], vec![4, 1]]);
        assert!(seen.iter().any(|m| matches!(m, ServerMessage::DiceTie { .. })));
        assert_eq!(room.current_turn, Some(0));
        assert_eq!(room.round_number, 1);
        assert!(room.session.timers().is_pending(TimerKey::Turn));
    }

    #[test]
    fn test_duel_full_game_reveals_both_numbers() {
        let (mut room, mut inboxes) = playing(&[4, 1], [1357, 2468]);

        room.handle_message(pid(1), GameAction::Guess { number: 1350 });
        assert_eq!(room.current_turn, Some(1));
        assert_eq!(room.round_number, 2);
        room.handle_message(pid(2), GameAction::Guess { number: 1357 });

        assert_eq!(room.phase, Phase::Finished);
        assert_eq!(room.winner, Some(1));
        let seen = drain(&mut inboxes[0]);
        assert!(seen.contains(&ServerMessage::GuessResult {
            player_index: 0,
            guess: 1350,
            correct_count: 0,
            round_number: 1,
        }));
        let over = seen.iter().find_map(|m| match m {
            ServerMessage::GameOver(over) => Some(over.clone()),
            _ => None,
        });
        let over = over.unwrap();
        assert_eq!(over.reason, GameOverReason::Guessed);
        assert_eq!(over.numbers, Some([Some(1357), Some(2468)]));
        assert!(room.session.timers().is_pending(TimerKey::Dissolve));
    }

    #[test]
    fn test_duel_second_guess_same_turn_rejected() {
        let (mut room, mut inboxes) = playing(&[6, 1], [1357, 2468]);
        room.handle_message(pid(1), GameAction::Guess { number: 1111 });
        let len = room.history.len();

        // The turn has passed; ana is no longer allowed to guess.
        room.handle_message(pid(1), GameAction::Guess { number: 2222 });

        assert_eq!(room.history.len(), len);
        assert_eq!(errors(&drain(&mut inboxes[0])).len(), 1);
    }

    #[test]
    fn test_duel_locked_turn_rejects_guess() {
        let (mut room, mut inboxes) = playing(&[6, 1], [1357, 2468]);
        room.turn_locked = true;

        room.handle_message(pid(1), GameAction::Guess { number: 2222 });

        assert!(room.history.is_empty());
        assert_eq!(errors(&drain(&mut inboxes[0])), vec!["you already guessed this turn"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duel_guess_counts_until_turn_timer_fires() {
        let (mut room, mut inboxes) = playing(&[6, 1], [1357, 2468]);
        let deadline = room.session.settings().turn_deadline();
        assert_eq!(room.session.timers().remaining(TimerKey::Turn), Some(deadline));

        tokio::time::advance(deadline - std::time::Duration::from_millis(1)).await;
        room.handle_message(pid(1), GameAction::Guess { number: 1111 });
        assert!(errors(&drain(&mut inboxes[0])).is_empty());
        assert_eq!(room.history.len(), 1);

        tokio::time::advance(deadline + std::time::Duration::from_millis(1)).await;
        room.handle_message(pid(2), GameAction::Guess { number: 2222 });
        assert_eq!(errors(&drain(&mut inboxes[1])), vec!["your turn has timed out"]);
        assert_eq!(room.history.len(), 1);
    }

    #[test]
    fn test_duel_turn_timeout_records_empty_guess() {
        let (mut room, mut inboxes) = playing(&[6, 1], [1357, 2468]);

        room.fire_timer(TimerKey::Turn);

        assert_eq!(
            room.history,
            vec![GuessRecord {
                player_index: 0,
                guess: None,
                correct_count: None,
                round_number: 1,
            }]
        );
        assert_eq!(room.current_turn, Some(1));
        assert!(drain(&mut inboxes[1]).contains(&ServerMessage::TurnTimeout { player_index: 0 }));
    }

    #[test]
    fn test_duel_disconnect_forfeit_hides_numbers_from_winner() {
        let (mut room, mut inboxes) = playing(&[6, 1], [1357, 2468]);
        let (watcher, mut watcher_inbox) = crate::testing::client(99);
        room.add_spectator(watcher);
        drain(&mut watcher_inbox);

        room.remove_player(pid(2));

        let winner_saw = drain(&mut inboxes[0]);
        let json = serde_json::to_string(&winner_saw).unwrap();
        assert!(!json.contains("2468"));
        assert!(winner_saw
            .iter()
            .any(|m| matches!(m, ServerMessage::OpponentDisconnected { player_index: 1, .. })));

        let spectator_saw = drain(&mut watcher_inbox);
        let over = spectator_saw.iter().find_map(|m| match m {
            ServerMessage::GameOver(over) => Some(over.clone()),
            _ => None,
        });
        assert_eq!(over.unwrap().numbers, Some([Some(1357), Some(2468)]));
        assert_eq!(room.phase, Phase::Finished);
    }

    #[test]
    fn test_duel_host_leaving_promotes_guest() {
        let config = GameConfig {
            auto_start: Some(false),
            ..GameConfig::default()
        };
        let mut room: NumberDuel =
            new_room(GameType::NumberDuel, config, ScriptedRandomness::new());
        let mut inboxes = seat_all(&mut room, &["ana", "ben"]);
        drain_all(&mut inboxes);

        room.remove_player(pid(1));

        assert_eq!(room.session.index_of(pid(2)), Some(0));
        assert!(!room.session.is_seated(1));
        assert!(drain(&mut inboxes[1]).contains(&ServerMessage::PlayerIndexUpdate { player_index: 0 }));
    }

    #[test]
    fn test_duel_snapshot_hides_numbers_until_finished() {
        let (room, _inboxes) = playing(&[6, 1], [1357, 2468]);
        let snapshot = serde_json::to_string(&room.spectate_state()).unwrap();
        assert!(!snapshot.contains("1357"));
        assert!(!snapshot.contains("2468"));
        assert_eq!(
            room.private_view(1),
            Some(PrivateView::Number {
                number: Some(2468),
                confirmed: true
            })
        );
    }
}
