//! Speed match: players flip fruit cards in turn and race to ring the
//! bell whenever one fruit totals exactly five across the table.

use partyhall_protocol::PlayerId;

use crate::cards::{Fruit, FruitCard, build_fruit_deck, deal_round_robin, fruit_reaching_target};
use crate::error::RoomError;
use crate::game::GameRoom;
use crate::message::{GameAction, GameOver, GameOverReason, GameView, Ranking, SeatView, ServerMessage};
use crate::random::shuffle;
use crate::session::{ClientHandle, RoomSession, TimerKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Waiting,
    Playing,
    Finished,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Waiting => "WAITING",
            Phase::Playing => "PLAYING",
            Phase::Finished => "FINISHED",
        }
    }
}

/// How play continues once the bell unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume {
    /// Re-prompt the player at the cursor.
    Redisplay,
    /// Move on to the next player.
    Advance,
}

/// Both piles keep their top card at the end of the vector.
#[derive(Debug, Default)]
pub struct MatchSeat {
    draw: Vec<FruitCard>,
    discard: Vec<FruitCard>,
}

impl MatchSeat {
    fn total(&self) -> usize {
        self.draw.len() + self.discard.len()
    }

    /// Turns the discard pile over to form a new draw pile.
    fn recycle(&mut self) {
        self.discard.reverse();
        std::mem::swap(&mut self.draw, &mut self.discard);
    }
}

#[derive(Debug)]
pub struct SpeedMatch {
    session: RoomSession<MatchSeat>,
    phase: Phase,
    play_order: Vec<usize>,
    cursor: usize,
    /// The current player has been prompted and has not flipped.
    awaiting_flip: bool,
    /// At least one card has been turned this game.
    has_flipped: bool,
    bell_locked: bool,
    resume: Resume,
    /// Seats knocked out, in order.
    eliminated: Vec<usize>,
    round_number: u32,
}

impl SpeedMatch {
    fn current(&self) -> Option<usize> {
        self.play_order.get(self.cursor).copied()
    }

    /// Every seat's pile counts and top card, as shown on the table.
    fn table(&self) -> Vec<Option<SeatView>> {
        let mut views = self.session.seat_views(|seat| SeatView {
            draw_count: Some(seat.state.draw.len()),
            discard_count: Some(seat.state.discard.len()),
            total_cards: Some(seat.state.total()),
            top_card: seat.state.discard.last().cloned(),
            eliminated: Some(false),
            ..seat.view()
        });
        for &seat in &self.eliminated {
            if let Some(Some(view)) = views.get_mut(seat) {
                view.eliminated = Some(true);
            }
        }
        views
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

        let mut deck = build_fruit_deck();
        shuffle(self.session.rng(), &mut deck);
        let seated = self.session.seated_indices();
        for (&index, pile) in seated.iter().zip(deal_round_robin(deck, seated.len())) {
            if let Some(seat) = self.session.seat_mut(index) {
                seat.state = MatchSeat {
                    draw: pile,
                    discard: Vec::new(),
                };
            }
        }

        self.phase = Phase::Playing;
        self.play_order = seated.iter().rev().copied().collect();
        self.cursor = 0;
        self.round_number = 1;
        self.has_flipped = false;
        self.bell_locked = false;
        self.eliminated.clear();
        tracing::info!(room_id = %self.session.room_id(), players = seated.len(), "speed match started");

        self.session.broadcast_state(self.phase.name());
        self.broadcast_player_list();
        self.start_turn();
    }

    fn start_turn(&mut self) {
        if self.phase != Phase::Playing {
            return;
        }
        let Some(current) = self.current() else {
            return;
        };
        self.awaiting_flip = true;
        self.session.broadcast(ServerMessage::TurnStart {
            player_index: current,
            player_name: self.session.name_of(current),
            time_limit: self.session.settings().turn_millis(),
            round_number: Some(self.round_number),
            bluff: None,
            table: Some(self.table()),
        });
        let limit = self.session.settings().turn_time;
        self.session.schedule(TimerKey::Turn, limit);
    }

    fn flip_card(&mut self, index: usize) {
        if self.phase != Phase::Playing {
            self.session.send_error(index, "the game is not in progress");
            return;
        }
        if self.bell_locked {
            self.session.send_error(index, "the bell is being resolved");
            return;
        }
        if self.current() != Some(index) || !self.awaiting_flip {
            self.session.send_error(index, "it is not your turn to flip");
            return;
        }
        self.flip(index);
    }

    fn flip(&mut self, index: usize) {
        self.session.cancel(TimerKey::Turn);
        self.awaiting_flip = false;
        let name = self.session.name_of(index);
        let Some(seat) = self.session.seat_mut(index) else {
            return;
        };
        let recycled = seat.state.draw.is_empty() && !seat.state.discard.is_empty();
        if recycled {
            seat.state.recycle();
        }
        let card = seat.state.draw.pop();
        if let Some(card) = &card {
            seat.state.discard.push(card.clone());
        }

        if recycled {
            self.session.broadcast(ServerMessage::PileRecycled {
                player_index: index,
                player_name: name.clone(),
            });
        }
        let Some(card) = card else {
            self.advance_turn();
            return;
        };
        self.round_number += 1;
        self.has_flipped = true;
        self.session.broadcast(ServerMessage::CardFlipped {
            player_index: index,
            player_name: name,
            card,
            table: self.table(),
        });
        let delay = self.session.settings().timing.flip_advance;
        self.session.schedule(TimerKey::Advance, delay);
    }

    fn ring_bell(&mut self, index: usize) {
        if self.phase != Phase::Playing {
            self.session.send_error(index, "the game is not in progress");
            return;
        }
        if self.bell_locked {
            self.session
                .send_error(index, "someone else rang the bell first");
            return;
        }
        if !self.play_order.contains(&index) {
            self.session.send_error(index, "you are out of this game");
            return;
        }
        if !self.has_flipped {
            self.session
                .send_error(index, "no card has been flipped yet");
            return;
        }
        self.bell_locked = true;
        self.session.cancel(TimerKey::Advance);
        self.session.cancel(TimerKey::Turn);

        let tops: Vec<FruitCard> = self
            .play_order
            .iter()
            .filter_map(|&seat| self.session.seat(seat)?.state.discard.last().cloned())
            .collect();
        match fruit_reaching_target(&tops) {
            Some(fruit) => self.correct_ring(index, fruit),
            None => self.wrong_ring(index),
        }
    }

    /// The ringer takes every discard pile, shuffled, under their draw pile.
    fn correct_ring(&mut self, ringer: usize, fruit: Fruit) {
        let mut won = Vec::new();
        for &seat in &self.play_order {
            if let Some(seat) = self.session.seat_mut(seat) {
                won.append(&mut seat.state.discard);
            }
        }
        shuffle(self.session.rng(), &mut won);
        let cards_won = won.len();
        if let Some(seat) = self.session.seat_mut(ringer) {
            won.append(&mut seat.state.draw);
            seat.state.draw = won;
        }

        self.session.broadcast(ServerMessage::BellResult {
            ringer_index: ringer,
            ringer_name: self.session.name_of(ringer),
            correct: true,
            fruit: Some(fruit),
            cards_won,
            cards_lost: 0,
            table: self.table(),
        });
        tracing::debug!(room_id = %self.session.room_id(), ringer, ?fruit, cards_won, "correct ring");

        self.check_eliminations();
        if self.phase != Phase::Playing {
            return;
        }
        if let Some(position) = self.play_order.iter().position(|&seat| seat == ringer) {
            self.cursor = (position + 1) % self.play_order.len();
        }
        self.resume = Resume::Redisplay;
        let lock = self.session.settings().timing.correct_ring_lock;
        self.session.schedule(TimerKey::BellLock, lock);
    }

    /// The ringer pays one card to every other active player.
    fn wrong_ring(&mut self, ringer: usize) {
        let others: Vec<usize> = self
            .play_order
            .iter()
            .copied()
            .filter(|&seat| seat != ringer)
            .collect();
        let mut cards_lost = 0;
        for other in others {
            let Some(payer) = self.session.seat_mut(ringer) else {
                break;
            };
            let card = match payer.state.draw.pop() {
                Some(card) => Some(card),
                // The top discard stays on the table.
                None if payer.state.discard.len() > 1 => Some(payer.state.discard.remove(0)),
                None => None,
            };
            let Some(card) = card else {
                break;
            };
            if let Some(receiver) = self.session.seat_mut(other) {
                receiver.state.draw.insert(0, card);
                cards_lost += 1;
            }
        }

        self.session.broadcast(ServerMessage::BellResult {
            ringer_index: ringer,
            ringer_name: self.session.name_of(ringer),
            correct: false,
            fruit: None,
            cards_won: 0,
            cards_lost,
            table: self.table(),
        });
        tracing::debug!(room_id = %self.session.room_id(), ringer, cards_lost, "wrong ring");

        self.check_eliminations();
        if self.phase != Phase::Playing {
            return;
        }
        self.resume = if self.awaiting_flip {
            Resume::Redisplay
        } else {
            Resume::Advance
        };
        let lock = self.session.settings().timing.wrong_ring_lock;
        self.session.schedule(TimerKey::BellLock, lock);
    }

    fn unlock_bell(&mut self) {
        self.bell_locked = false;
        match self.resume {
            Resume::Redisplay => self.start_turn(),
            Resume::Advance => self.advance_turn(),
        }
    }

    /// Removes every active seat that has no cards left.
    fn check_eliminations(&mut self) {
        let out: Vec<usize> = self
            .play_order
            .iter()
            .copied()
            .filter(|&seat| {
                self.session
                    .seat(seat)
                    .is_some_and(|s| s.state.total() == 0)
            })
            .collect();
        for seat in out {
            if let Some(position) = self.play_order.iter().position(|&s| s == seat) {
                self.play_order.remove(position);
                if position < self.cursor {
                    self.cursor -= 1;
                }
            }
            self.eliminated.push(seat);
            self.session.broadcast(ServerMessage::PlayerEliminated {
                player_index: seat,
                player_name: self.session.name_of(seat),
            });
            tracing::info!(room_id = %self.session.room_id(), player_index = seat, "player eliminated");
        }
        if self.cursor >= self.play_order.len() {
            self.cursor = 0;
        }
        if self.play_order.len() <= 1 {
            self.end_game();
        }
    }

    fn advance_turn(&mut self) {
        if self.phase != Phase::Playing || self.play_order.is_empty() {
            return;
        }
        self.cursor = (self.cursor + 1) % self.play_order.len();
        let Some(next) = self.current() else {
            return;
        };
        let name = self.session.name_of(next);
        let mut recycled = false;
        let mut empty = false;
        if let Some(seat) = self.session.seat_mut(next) {
            if seat.state.draw.is_empty() && !seat.state.discard.is_empty() {
                seat.state.recycle();
                recycled = true;
            }
            empty = seat.state.total() == 0;
        }
        if recycled {
            self.session.broadcast(ServerMessage::PileRecycled {
                player_index: next,
                player_name: name,
            });
            self.broadcast_player_list();
        }
        if empty {
            self.check_eliminations();
        }
        self.start_turn();
    }

    fn end_game(&mut self) {
        self.session.cancel(TimerKey::Turn);
        self.session.cancel(TimerKey::Advance);
        self.session.cancel(TimerKey::BellLock);
        self.phase = Phase::Finished;
        self.bell_locked = true;

        let winner = self.play_order.first().copied();
        let mut order: Vec<usize> = winner.into_iter().collect();
        order.extend(self.eliminated.iter().rev().copied());
        for seat in self.session.seated_indices() {
            if !order.contains(&seat) {
                order.push(seat);
            }
        }
        order.retain(|&seat| self.session.is_seated(seat));

        let count = order.len();
        let rankings = order
            .iter()
            .enumerate()
            .map(|(place, &seat)| Ranking {
                player_index: seat,
                player_name: self.session.name_of(seat),
                rank: place + 1,
                is_winner: Some(seat) == winner,
                is_loser: count > 1 && place == count - 1,
            })
            .collect();
        let mut over = GameOver::new(winner, GameOverReason::LastStanding);
        over.winner_name = winner.map(|seat| self.session.name_of(seat));
        over.rankings = Some(rankings);
        self.session.broadcast(ServerMessage::GameOver(over));
        tracing::info!(room_id = %self.session.room_id(), ?winner, "speed match over");

        let delay = self.session.settings().timing.dissolve_delay;
        self.session.schedule_dissolve(delay);
    }
}

impl GameRoom for SpeedMatch {
    type Seat = MatchSeat;

    fn create(session: RoomSession<MatchSeat>) -> Self {
        Self {
            session,
            phase: Phase::Waiting,
            play_order: Vec::new(),
            cursor: 0,
            awaiting_flip: false,
            has_flipped: false,
            bell_locked: false,
            resume: Resume::Redisplay,
            eliminated: Vec::new(),
            round_number: 0,
        }
    }

    fn session(&self) -> &RoomSession<MatchSeat> {
        &self.session
    }

    fn session_mut(&mut self) -> &mut RoomSession<MatchSeat> {
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
        let index = self.seat_player(client, name, MatchSeat::default())?;
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

        match self.phase {
            Phase::Waiting => {
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
            }
            Phase::Playing => {
                self.session.broadcast(ServerMessage::PlayerDisconnected {
                    player_index: index,
                    player_name: name,
                });
                let Some(position) = self.play_order.iter().position(|&seat| seat == index) else {
                    return;
                };
                let was_current = position == self.cursor;
                self.play_order.remove(position);
                if self.play_order.len() <= 1 {
                    self.end_game();
                    return;
                }
                if position < self.cursor {
                    self.cursor -= 1;
                }
                if self.cursor >= self.play_order.len() {
                    self.cursor = 0;
                }
                self.broadcast_player_list();
                if was_current {
                    if self.bell_locked {
                        self.resume = Resume::Redisplay;
                    } else {
                        self.session.cancel(TimerKey::Advance);
                        self.start_turn();
                    }
                }
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
            GameAction::FlipCard => self.flip_card(index),
            GameAction::RingBell => self.ring_bell(index),
            other => self.session.send_error(
                index,
                format!("`{}` is not a speed match action", other.name()),
            ),
        }
    }

    fn on_timer(&mut self, key: TimerKey) {
        if self.phase != Phase::Playing {
            return;
        }
        match key {
            TimerKey::Turn if self.awaiting_flip && !self.bell_locked => {
                if let Some(current) = self.current() {
                    self.flip(current);
                }
            }
            TimerKey::Advance if !self.bell_locked => self.advance_turn(),
            TimerKey::BellLock => self.unlock_bell(),
            _ => {}
        }
    }

    fn player_views(&self) -> Vec<Option<SeatView>> {
        self.table()
    }

    fn game_view(&self) -> GameView {
        GameView::SpeedMatch {
            play_order: self.play_order.clone(),
            current_turn: (self.phase == Phase::Playing)
                .then(|| self.current())
                .flatten(),
            bell_locked: self.bell_locked,
            round_number: self.round_number,
        }
    }
}
