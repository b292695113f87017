//! Hidden count: a dealer hides between 0 and n-1 caps and the others
//! take turns guessing the count. Whoever finds it deals next.

use partyhall_protocol::PlayerId;

use crate::error::RoomError;
use crate::game::GameRoom;
use crate::message::{GameAction, GameView, PrivateView, SeatView, ServerMessage};
use crate::session::{ClientHandle, RoomSession, TimerKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Waiting,
    Rolling,
    Hiding,
    Guessing,
    RoundResult,
    Finished,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Waiting => "WAITING",
            Phase::Rolling => "ROLLING",
            Phase::Hiding => "HIDING",
            Phase::Guessing => "GUESSING",
            Phase::RoundResult => "ROUND_RESULT",
            Phase::Finished => "FINISHED",
        }
    }
}

/// What the next `Phase` timer does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Roll,
    AnnounceTie,
    AnnounceDealer,
    StartHiding,
    StartGuessing,
    NextGuess,
    NextRound(usize),
}

#[derive(Debug, Default)]
pub struct CountSeat {
    losses: u32,
}

#[derive(Debug)]
pub struct HiddenCount {
    session: RoomSession<CountSeat>,
    phase: Phase,
    step: Step,
    /// Seats still rolling for dealer.
    rollers: Vec<usize>,
    dealer: Option<usize>,
    hidden: Option<u8>,
    /// Player count frozen when the round's hiding phase began.
    round_players: usize,
    guess_order: Vec<usize>,
    guess_cursor: usize,
    /// The current guesser has been prompted and not yet answered.
    guess_open: bool,
    guessed: Vec<u8>,
    round_number: u32,
}

impl HiddenCount {
    fn max_caps(&self) -> usize {
        self.round_players.saturating_sub(1)
    }

    fn current_guesser(&self) -> Option<usize> {
        self.guess_order.get(self.guess_cursor).copied()
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
            self.session
                .send_error(index, "at least two players are needed");
            return;
        }
        self.phase = Phase::Rolling;
        self.rollers = self.session.seated_indices();
        self.session.broadcast_state(self.phase.name());
        self.step = Step::Roll;
        let delay = self.session.settings().timing.dice_delay;
        self.session.schedule(TimerKey::Phase, delay);
        tracing::info!(room_id = %self.session.room_id(), players = self.rollers.len(), "hidden count started");
    }

    /// One die per remaining roller; the single highest roll deals.
    fn roll_for_dealer(&mut self) {
        let session = &mut self.session;
        self.rollers.retain(|&seat| session.is_seated(seat));
        let mut dice = vec![0u8; session.seats().len()];
        for &seat in &self.rollers {
            dice[seat] = session.rng().roll_die();
        }
        session.broadcast(ServerMessage::DiceResult { dice: dice.clone() });

        let top = self.rollers.iter().map(|&seat| dice[seat]).max().unwrap_or(0);
        self.rollers.retain(|&seat| dice[seat] == top);
        let timing = self.session.settings().timing.clone();
        match self.rollers.as_slice() {
            [] => {
                self.session.dissolve("not enough players, the room has closed");
                self.phase = Phase::Finished;
            }
            [dealer] => {
                self.dealer = Some(*dealer);
                self.step = Step::AnnounceDealer;
                self.session
                    .schedule(TimerKey::Phase, timing.dealer_announce_delay);
            }
            _ => {
                self.step = Step::AnnounceTie;
                self.session
                    .schedule(TimerKey::Phase, timing.tie_notice_delay);
            }
        }
    }

    fn announce_tie(&mut self) {
        self.session.broadcast(ServerMessage::DiceTie {
            tied_players: self.rollers.clone(),
        });
        self.step = Step::Roll;
        let delay = self.session.settings().timing.reroll_delay;
        self.session.schedule(TimerKey::Phase, delay);
    }

    fn announce_dealer(&mut self) {
        let Some(dealer) = self.dealer else {
            return;
        };
        self.session.broadcast(ServerMessage::DealerChosen {
            dealer_index: dealer,
            dealer_name: self.session.name_of(dealer),
        });
        self.step = Step::StartHiding;
        let delay = self.session.settings().timing.hiding_delay;
        self.session.schedule(TimerKey::Phase, delay);
    }

    /// The first seated player at or after `preferred`, wrapping.
    fn active_dealer(&self, preferred: usize) -> usize {
        let len = self.session.seats().len().max(1);
        (0..len)
            .map(|offset| (preferred + offset) % len)
            .find(|&seat| self.session.is_seated(seat))
            .unwrap_or(0)
    }

    fn start_hiding(&mut self) {
        let dealer = self.active_dealer(self.dealer.unwrap_or(0));
        self.dealer = Some(dealer);
        self.phase = Phase::Hiding;
        self.hidden = None;
        self.guessed.clear();
        self.guess_order.clear();
        self.guess_cursor = 0;
        self.guess_open = false;
        self.round_players = self.session.player_count();
        self.round_number += 1;

        self.session.broadcast_state(self.phase.name());
        self.session.broadcast(ServerMessage::HidingPhase {
            dealer_index: dealer,
            dealer_name: self.session.name_of(dealer),
            max_caps: self.max_caps(),
            time_limit: self.session.settings().turn_millis(),
        });
        let limit = self.session.settings().turn_time;
        self.session.schedule(TimerKey::Turn, limit);
    }

    fn hide_caps(&mut self, index: usize, count: i64) {
        if self.phase != Phase::Hiding {
            self.session.send_error(index, "caps can only be hidden in the hiding phase");
            return;
        }
        if self.dealer != Some(index) {
            self.session.send_error(index, "you are not the dealer");
            return;
        }
        if self.hidden.is_some() {
            self.session.send_error(index, "the caps are already hidden");
            return;
        }
        let Some(count) = u8::try_from(count)
            .ok()
            .filter(|&c| usize::from(c) < self.round_players)
        else {
            self.session.send_error(
                index,
                format!("choose a number from 0 to {}", self.max_caps()),
            );
            return;
        };
        self.session.cancel(TimerKey::Turn);
        self.caps_hidden(count);
    }

    fn hide_randomly(&mut self) {
        let upper = self.round_players.max(1);
        // below(upper) < round_players <= 6
        let count = self.session.rng().below(upper) as u8;
        self.caps_hidden(count);
    }

    fn caps_hidden(&mut self, count: u8) {
        let Some(dealer) = self.dealer else {
            return;
        };
        self.hidden = Some(count);
        self.session.send_to(dealer, ServerMessage::CapsSet { count });
        self.session.broadcast(ServerMessage::CapsHidden {
            dealer_index: dealer,
            dealer_name: self.session.name_of(dealer),
        });

        let len = self.session.seats().len();
        self.guess_order = (1..len)
            .map(|offset| (dealer + len - offset) % len)
            .filter(|&seat| self.session.is_seated(seat))
            .collect();
        self.guess_cursor = 0;

        self.step = Step::StartGuessing;
        let delay = self.session.settings().timing.guessing_delay;
        self.session.schedule(TimerKey::Phase, delay);
    }

    fn start_guessing(&mut self) {
        self.phase = Phase::Guessing;
        self.session.broadcast_state(self.phase.name());
        self.prompt_guesser();
    }

    fn available(&self) -> Vec<u8> {
        (0..self.round_players)
            .filter_map(|n| u8::try_from(n).ok())
            .filter(|n| !self.guessed.contains(n))
            .collect()
    }

    fn prompt_guesser(&mut self) {
        let (Some(guesser), Some(dealer)) = (self.current_guesser(), self.dealer) else {
            if let Some(dealer) = self.dealer {
                self.end_round(dealer, true);
            }
            return;
        };
        self.guess_open = true;
        self.session.broadcast(ServerMessage::GuessTurn {
            guesser_index: guesser,
            guesser_name: self.session.name_of(guesser),
            available_numbers: self.available(),
            guessed_numbers: self.guessed.clone(),
            max_caps: self.max_caps(),
            time_limit: self.session.settings().turn_millis(),
        });
        let limit = self.session.settings().turn_time;
        self.session.schedule(TimerKey::Turn, limit);
        tracing::debug!(room_id = %self.session.room_id(), dealer, guesser, "guess turn");
    }

    fn guess_number(&mut self, index: usize, number: i64) {
        if self.phase != Phase::Guessing {
            self.session.send_error(index, "it is not time to guess");
            return;
        }
        if !self.guess_open || self.current_guesser() != Some(index) {
            self.session.send_error(index, "it is not your turn");
            return;
        }
        let Some(number) = u8::try_from(number)
            .ok()
            .filter(|&n| usize::from(n) < self.round_players)
        else {
            self.session.send_error(
                index,
                format!("choose a number from 0 to {}", self.max_caps()),
            );
            return;
        };
        if self.guessed.contains(&number) {
            self.session
                .send_error(index, "that number has already been guessed");
            return;
        }
        self.session.cancel(TimerKey::Turn);
        self.process_guess(index, number, false);
    }

    fn process_guess(&mut self, guesser: usize, number: u8, is_timeout: bool) {
        let Some(dealer) = self.dealer else {
            return;
        };
        self.guess_open = false;
        self.guessed.push(number);
        let correct = self.hidden == Some(number);
        self.session.broadcast(ServerMessage::NumberGuessed {
            guesser_index: guesser,
            guesser_name: self.session.name_of(guesser),
            number,
            correct,
            is_timeout,
        });

        if correct {
            self.end_round(guesser, false);
            return;
        }
        self.guess_cursor += 1;
        if self.guess_cursor >= self.guess_order.len() {
            self.end_round(dealer, true);
            return;
        }
        self.step = Step::NextGuess;
        let delay = self.session.settings().timing.next_guess_delay;
        self.session.schedule(TimerKey::Phase, delay);
    }

    /// The guesser who finds the count loses and deals next; if nobody
    /// does, the dealer loses and deals again.
    fn end_round(&mut self, loser: usize, dealer_lost: bool) {
        let Some(dealer) = self.dealer else {
            return;
        };
        self.session.cancel(TimerKey::Turn);
        self.guess_open = false;
        self.phase = Phase::RoundResult;
        if let Some(seat) = self.session.seat_mut(loser) {
            seat.state.losses += 1;
        }
        let next_dealer = if dealer_lost { dealer } else { loser };

        self.session.broadcast_state(self.phase.name());
        self.session.broadcast(ServerMessage::RoundResult {
            loser_index: loser,
            loser_name: self.session.name_of(loser),
            dealer_index: dealer,
            dealer_lost,
            revealed_count: self.hidden.unwrap_or(0),
            next_dealer_index: next_dealer,
            guessed_numbers: self.guessed.clone(),
        });
        self.broadcast_player_list();
        tracing::info!(
            room_id = %self.session.room_id(),
            round = self.round_number,
            loser,
            dealer_lost,
            "round over"
        );

        self.step = Step::NextRound(next_dealer);
        let delay = self.session.settings().timing.round_result_delay;
        self.session.schedule(TimerKey::Phase, delay);
    }

    fn dissolve_short_handed(&mut self) {
        self.phase = Phase::Finished;
        self.session
            .dissolve("not enough players, the room has closed");
    }

    fn advance_step(&mut self) {
        match (self.step, self.phase) {
            (Step::Roll, Phase::Rolling) => self.roll_for_dealer(),
            (Step::AnnounceTie, Phase::Rolling) => self.announce_tie(),
            (Step::AnnounceDealer, Phase::Rolling) => self.announce_dealer(),
            (Step::StartHiding, Phase::Rolling) => self.start_hiding(),
            (Step::StartGuessing, Phase::Hiding) => self.start_guessing(),
            (Step::NextGuess, Phase::Guessing) => self.prompt_guesser(),
            (Step::NextRound(next), Phase::RoundResult) => {
                if self.session.player_count() < 2 {
                    self.dissolve_short_handed();
                } else {
                    self.dealer = Some(next);
                    self.start_hiding();
                }
            }
            _ => {}
        }
    }

    fn turn_timed_out(&mut self) {
        match self.phase {
            Phase::Hiding if self.hidden.is_none() => self.hide_randomly(),
            Phase::Guessing if self.guess_open => {
                let Some(guesser) = self.current_guesser() else {
                    return;
                };
                let available = self.available();
                if available.is_empty() {
                    if let Some(dealer) = self.dealer {
                        self.end_round(dealer, true);
                    }
                    return;
                }
                let pick = available[self.session.rng().below(available.len())];
                self.process_guess(guesser, pick, true);
            }
            _ => {}
        }
    }

    /// Drops a departed guesser from this round's order.
    fn drop_guesser(&mut self, index: usize) {
        let Some(position) = self.guess_order.iter().position(|&seat| seat == index) else {
            return;
        };
        let was_current = position == self.guess_cursor;
        self.guess_order.remove(position);
        if position < self.guess_cursor {
            self.guess_cursor -= 1;
        }
        if self.guess_cursor >= self.guess_order.len() {
            if self.phase == Phase::Guessing {
                if let Some(dealer) = self.dealer {
                    self.end_round(dealer, true);
                }
            }
            return;
        }
        if was_current && self.guess_open {
            self.session.cancel(TimerKey::Turn);
            self.prompt_guesser();
        }
    }
}

impl GameRoom for HiddenCount {
    type Seat = CountSeat;

    fn create(session: RoomSession<CountSeat>) -> Self {
        Self {
            session,
            phase: Phase::Waiting,
            step: Step::Roll,
            rollers: Vec::new(),
            dealer: None,
            hidden: None,
            round_players: 0,
            guess_order: Vec::new(),
            guess_cursor: 0,
            guess_open: false,
            guessed: Vec::new(),
            round_number: 0,
        }
    }

    fn session(&self) -> &RoomSession<CountSeat> {
        &self.session
    }

    fn session_mut(&mut self) -> &mut RoomSession<CountSeat> {
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
        let index = self.seat_player(client, name, CountSeat::default())?;
        self.broadcast_player_list();
        Ok(index)
    }

    fn remove_player(&mut self, player: PlayerId) {
        let Some(index) = self.session.index_of(player) else {
            return;
        };
        let name = self.session.name_of(index);
        self.session.seats_mut()[index] = None;
        tracing::info!(room_id = %self.session.room_id(), %player, phase = self.phase.name(), "player removed");

        if self.phase == Phase::Waiting {
            self.session.seats_mut().retain(Option::is_some);
            self.session.broadcast(ServerMessage::PlayerLeft {
                player_index: index,
                player_name: name,
            });
            for moved in self.session.seated_indices() {
                self.session
                    .send_to(moved, ServerMessage::PlayerIndexUpdate { player_index: moved });
            }
            self.broadcast_player_list();
            return;
        }
        if self.phase == Phase::Finished {
            return;
        }

        self.session.broadcast(ServerMessage::PlayerDisconnected {
            player_index: index,
            player_name: name,
        });
        if self.session.player_count() < 2 {
            self.dissolve_short_handed();
            return;
        }
        self.broadcast_player_list();

        match self.phase {
            Phase::Hiding if self.dealer == Some(index) && self.hidden.is_none() => {
                self.session.cancel(TimerKey::Turn);
                self.hide_randomly();
            }
            Phase::Hiding | Phase::Guessing => self.drop_guesser(index),
            _ => {}
        }
    }

    fn handle_message(&mut self, sender: PlayerId, action: GameAction) {
        let Some(index) = self.session.index_of(sender) else {
            tracing::debug!(%sender, "action from unseated connection ignored");
            return;
        };
        match action {
            GameAction::StartGame => self.start_game(index),
            GameAction::HideCaps { count } => self.hide_caps(index, count),
            GameAction::GuessNumber { number } => self.guess_number(index, number),
            other => self.session.send_error(
                index,
                format!("`{}` is not a hidden count action", other.name()),
            ),
        }
    }

    fn on_timer(&mut self, key: TimerKey) {
        match key {
            TimerKey::Phase => self.advance_step(),
            TimerKey::Turn => self.turn_timed_out(),
            _ => {}
        }
    }

    fn player_views(&self) -> Vec<Option<SeatView>> {
        self.session.seat_views(|seat| SeatView {
            losses: Some(seat.state.losses),
            ..seat.view()
        })
    }

    fn game_view(&self) -> GameView {
        let revealed = matches!(self.phase, Phase::RoundResult | Phase::Finished);
        GameView::HiddenCount {
            dealer_index: self.dealer,
            round_players: self.round_players,
            guess_order: self.guess_order.clone(),
            current_guesser: (self.phase == Phase::Guessing)
                .then(|| self.current_guesser())
                .flatten(),
            guessed_numbers: self.guessed.clone(),
            revealed_count: self.hidden.filter(|_| revealed),
            round_number: self.round_number,
        }
    }

    fn private_view(&self, index: usize) -> Option<PrivateView> {
        if self.dealer != Some(index) {
            return None;
        }
        self.hidden.map(|count| PrivateView::HiddenCount { count })
    }
}

#[cfg(test)]
mod tests {
    use partyhall_protocol::{GameConfig, GameType};

    use super::*;
    use crate::random::ScriptedRandomness;
    use crate::testing::{Inbox, drain, drain_all, errors, new_room, pid, seat_all};

    fn room(rng: ScriptedRandomness, names: &[&str]) -> (HiddenCount, Vec<Inbox>) {
        let mut room: HiddenCount = new_room(GameType::HiddenCount, GameConfig::default(), rng);
        let inboxes = seat_all(&mut room, names);
        (room, inboxes)
    }

    /// Starts the game and runs the dealer roll into the hiding phase.
    fn hiding(dice: &[u8], names: &[&str]) -> (HiddenCount, Vec<Inbox>) {
        let (mut room, mut inboxes) =
            room(ScriptedRandomness::new().with_dice(dice.iter().copied()), names);
        room.handle_message(pid(1), GameAction::StartGame);
        while room.phase == Phase::Rolling {
            room.fire_timer(TimerKey::Phase);
        }
        drain_all(&mut inboxes);
        (room, inboxes)
    }

    fn hide_and_open_guessing(room: &mut HiddenCount, dealer_id: u64, count: i64) {
        room.handle_message(pid(dealer_id), GameAction::HideCaps { count });
        room.fire_timer(TimerKey::Phase);
        assert_eq!(room.phase, Phase::Guessing);
    }

    #[test]
    fn test_hidden_tie_rerolls_only_tied_players() {
        let (mut room, mut inboxes) = room(
            ScriptedRandomness::new().with_dice([6, 6, 2, 3, 5]),
            &["ana", "ben", "cy"],
        );
        room.handle_message(pid(1), GameAction::StartGame);
        drain_all(&mut inboxes);
        while room.phase == Phase::Rolling {
            room.fire_timer(TimerKey::Phase);
        }

        let seen = drain(&mut inboxes[2]);
        let rolls: Vec<_> = seen
            .iter()
            .filter_map(|m| match m {
                ServerMessage::DiceResult { dice } => Some(dice.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(rolls, vec![vec![6, 6, 2], vec![3, 5, 0]]);
        assert!(seen.contains(&ServerMessage::DiceTie {
            tied_players: vec![0, 1]
        }));
        assert_eq!(room.dealer, Some(1));
        assert_eq!(room.phase, Phase::Hiding);
        assert_eq!(room.round_players, 3);
    }

    #[test]
    fn test_hidden_count_goes_only_to_dealer() {
        let (mut room, mut inboxes) = hiding(&[6, 1], &["ana", "ben"]);

        room.handle_message(pid(1), GameAction::HideCaps { count: 1 });

        assert!(drain(&mut inboxes[0]).contains(&ServerMessage::CapsSet { count: 1 }));
        let guest = drain(&mut inboxes[1]);
        assert!(!guest.iter().any(|m| matches!(m, ServerMessage::CapsSet { .. })));
        assert!(guest.iter().any(|m| matches!(m, ServerMessage::CapsHidden { .. })));
        assert_eq!(room.private_view(0), Some(PrivateView::HiddenCount { count: 1 }));
        assert_eq!(room.private_view(1), None);
    }

    #[test]
    fn test_hidden_out_of_range_and_non_dealer_rejected() {
        let (mut room, mut inboxes) = hiding(&[6, 1], &["ana", "ben"]);

        room.handle_message(pid(1), GameAction::HideCaps { count: 2 });
        room.handle_message(pid(2), GameAction::HideCaps { count: 0 });

        assert_eq!(errors(&drain(&mut inboxes[0])), vec!["choose a number from 0 to 1"]);
        assert_eq!(errors(&drain(&mut inboxes[1])), vec!["you are not the dealer"]);
        assert!(room.hidden.is_none());
    }

    #[test]
    fn test_hidden_guess_order_runs_counter_clockwise() {
        let (mut room, _inboxes) = hiding(&[1, 6, 1], &["ana", "ben", "cy"]);
        assert_eq!(room.dealer, Some(1));

        room.handle_message(pid(2), GameAction::HideCaps { count: 0 });

        assert_eq!(room.guess_order, vec![0, 2]);
    }

    #[test]
    fn test_hidden_correct_guesser_loses_and_deals_next() {
        let (mut room, mut inboxes) = hiding(&[6, 1, 1], &["ana", "ben", "cy"]);
        hide_and_open_guessing(&mut room, 1, 2);
        assert_eq!(room.guess_order, vec![2, 1]);

        room.handle_message(pid(3), GameAction::GuessNumber { number: 2 });

        assert_eq!(room.phase, Phase::RoundResult);
        assert_eq!(room.session.seat(2).unwrap().state.losses, 1);
        let result = drain(&mut inboxes[0]).into_iter().find_map(|m| match m {
            ServerMessage::RoundResult {
                loser_index,
                next_dealer_index,
                revealed_count,
                dealer_lost,
                ..
            } => Some((loser_index, next_dealer_index, revealed_count, dealer_lost)),
            _ => None,
        });
        assert_eq!(result, Some((2, 2, 2, false)));

        room.fire_timer(TimerKey::Phase);
        assert_eq!(room.phase, Phase::Hiding);
        assert_eq!(room.dealer, Some(2));
        assert_eq!(room.round_number, 2);
    }

    #[test]
    fn test_hidden_all_wrong_dealer_loses_and_keeps_dealing() {
        let (mut room, _inboxes) = hiding(&[6, 1, 1], &["ana", "ben", "cy"]);
        hide_and_open_guessing(&mut room, 1, 0);

        room.handle_message(pid(3), GameAction::GuessNumber { number: 1 });
        room.fire_timer(TimerKey::Phase);
        room.handle_message(pid(2), GameAction::GuessNumber { number: 2 });

        assert_eq!(room.phase, Phase::RoundResult);
        assert_eq!(room.session.seat(0).unwrap().state.losses, 1);
        room.fire_timer(TimerKey::Phase);
        assert_eq!(room.dealer, Some(0));
    }

    #[test]
    fn test_hidden_repeated_number_rejected() {
        let (mut room, mut inboxes) = hiding(&[6, 1, 1], &["ana", "ben", "cy"]);
        hide_and_open_guessing(&mut room, 1, 0);
        room.handle_message(pid(3), GameAction::GuessNumber { number: 1 });
        room.fire_timer(TimerKey::Phase);
        drain_all(&mut inboxes);

        room.handle_message(pid(2), GameAction::GuessNumber { number: 1 });

        assert_eq!(
            errors(&drain(&mut inboxes[1])),
            vec!["that number has already been guessed"]
        );
        assert_eq!(room.guessed, vec![1]);
    }

    #[test]
    fn test_hidden_range_stays_fixed_after_departure() {
        let (mut room, _inboxes) = hiding(&[6, 1, 1, 1], &["ana", "ben", "cy", "dee"]);
        hide_and_open_guessing(&mut room, 1, 3);
        assert_eq!(room.guess_order, vec![3, 2, 1]);

        room.remove_player(pid(2));

        assert_eq!(room.round_players, 4);
        assert_eq!(room.guess_order, vec![3, 2]);
        room.handle_message(pid(4), GameAction::GuessNumber { number: 3 });
        assert_eq!(room.phase, Phase::RoundResult);
    }

    #[test]
    fn test_hidden_departing_current_guesser_passes_turn() {
        let (mut room, mut inboxes) = hiding(&[6, 1, 1], &["ana", "ben", "cy"]);
        hide_and_open_guessing(&mut room, 1, 0);
        drain_all(&mut inboxes);

        room.remove_player(pid(3));

        assert_eq!(room.current_guesser(), Some(1));
        assert!(room.guess_open);
        assert!(drain(&mut inboxes[1])
            .iter()
            .any(|m| matches!(m, ServerMessage::GuessTurn { guesser_index: 1, .. })));
    }

    #[test]
    fn test_hidden_dealer_leaving_while_hiding_forces_random_hide() {
        let (mut room, _inboxes) = hiding(&[6, 1, 1], &["ana", "ben", "cy"]);

        room.remove_player(pid(1));

        assert_eq!(room.hidden, Some(0));
        assert_eq!(room.guess_order, vec![2, 1]);
        assert!(room.session.timers().is_pending(TimerKey::Phase));
    }

    #[test]
    fn test_hidden_fewer_than_two_players_dissolves() {
        let (mut room, mut inboxes) = hiding(&[6, 1], &["ana", "ben"]);

        room.remove_player(pid(2));

        assert!(room.session.is_dissolved());
        assert_eq!(room.phase, Phase::Finished);
        assert!(drain(&mut inboxes[0])
            .iter()
            .any(|m| matches!(m, ServerMessage::RoomDissolved { .. })));
    }

    #[test]
    fn test_hidden_guess_timeout_picks_unguessed_number() {
        let rng = ScriptedRandomness::new().with_dice([6, 1, 1]).with_picks([0]);
        let (mut room, mut inboxes) = room(rng, &["ana", "ben", "cy"]);
        room.handle_message(pid(1), GameAction::StartGame);
        while room.phase == Phase::Rolling {
            room.fire_timer(TimerKey::Phase);
        }
        hide_and_open_guessing(&mut room, 1, 2);
        room.handle_message(pid(3), GameAction::GuessNumber { number: 0 });
        room.fire_timer(TimerKey::Phase);
        drain_all(&mut inboxes);

        room.fire_timer(TimerKey::Turn);

        assert_eq!(room.guessed, vec![0, 1]);
        assert!(drain(&mut inboxes[0]).contains(&ServerMessage::NumberGuessed {
            guesser_index: 1,
            guesser_name: "ben".into(),
            number: 1,
            correct: false,
            is_timeout: true,
        }));
    }

    #[test]
    fn test_hidden_snapshot_reveals_count_only_after_round() {
        let (mut room, _inboxes) = hiding(&[6, 1], &["ana", "ben"]);
        hide_and_open_guessing(&mut room, 1, 1);
        let GameView::HiddenCount { revealed_count, .. } = room.game_view() else {
            panic!("wrong view");
        };
        assert_eq!(revealed_count, None);

        room.handle_message(pid(2), GameAction::GuessNumber { number: 0 });
        let GameView::HiddenCount { revealed_count, .. } = room.game_view() else {
            panic!("wrong view");
        };
        assert_eq!(revealed_count, Some(1));
    }
}
