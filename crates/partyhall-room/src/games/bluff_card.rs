//! Bluffing card game: play cards face down claiming a rank, and call
//! out anyone you think is lying.

use std::collections::HashSet;

use partyhall_protocol::PlayerId;

use crate::cards::{Card, Rank, deal_round_robin, shuffled_deck, sort_hand};
use crate::error::RoomError;
use crate::game::GameRoom;
use crate::message::{
    BluffTurn, ChallengeOutcome, GameAction, GameOver, GameOverReason, GameView, PlayView,
    PrivateView, Ranking, SeatView, ServerMessage,
};
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

#[derive(Debug, Default)]
pub struct BluffSeat {
    hand: Vec<Card>,
}

/// The most recent play on the open pile.
#[derive(Debug)]
struct Play {
    player_index: usize,
    cards: Vec<Card>,
    declared_rank: Rank,
    declared_count: usize,
}

#[derive(Debug)]
pub struct BluffCard {
    session: RoomSession<BluffSeat>,
    phase: Phase,
    /// Seat indices in turn order (descending seat index).
    play_order: Vec<usize>,
    /// Position in `play_order` of the player to act.
    cursor: usize,
    pile: Vec<Card>,
    last_play: Option<Play>,
    round_number: u32,
    /// Seats that emptied their hand, in order.
    winners: Vec<usize>,
    /// A challenge was just revealed; the next round starts on the
    /// `Phase` timer.
    between_rounds: bool,
}

impl BluffCard {
    fn current(&self) -> Option<usize> {
        self.play_order.get(self.cursor).copied()
    }

    fn hand(&self, index: usize) -> &[Card] {
        self.session
            .seat(index)
            .map_or(&[], |seat| seat.state.hand.as_slice())
    }

    fn send_hand(&self, index: usize) {
        self.session.send_to(
            index,
            ServerMessage::HandUpdate {
                hand: self.hand(index).to_vec(),
            },
        );
    }

    /// Checks that `index` may act now, replying with an error if not.
    fn may_act(&self, index: usize) -> bool {
        if self.phase != Phase::Playing {
            self.session.send_error(index, "the game is not in progress");
            return false;
        }
        if self.between_rounds {
            self.session.send_error(index, "wait for the next round");
            return false;
        }
        if self.current() != Some(index) {
            self.session.send_error(index, "it is not your turn");
            return false;
        }
        true
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

        let settings = self.session.settings();
        let (decks, shuffle_mode) = (settings.deck_count, settings.shuffle_mode);
        let deck = shuffled_deck(self.session.rng(), decks, shuffle_mode);
        let seated = self.session.seated_indices();
        let hands = deal_round_robin(deck, seated.len());
        for (&index, mut hand) in seated.iter().zip(hands) {
            sort_hand(&mut hand);
            if let Some(seat) = self.session.seat_mut(index) {
                seat.state.hand = hand;
            }
        }

        self.phase = Phase::Playing;
        self.play_order = seated.iter().rev().copied().collect();
        self.cursor = 0;
        self.pile.clear();
        self.last_play = None;
        self.round_number = 1;
        tracing::info!(
            room_id = %self.session.room_id(),
            players = seated.len(),
            decks,
            shuffle_mode,
            "bluffing game started"
        );

        self.session.broadcast_state(self.phase.name());
        for &index in &seated {
            self.send_hand(index);
        }
        self.broadcast_player_list();
        self.start_turn();
    }

    fn start_turn(&mut self) {
        let Some(current) = self.current() else {
            return;
        };
        let open = self.last_play.as_ref();
        let bluff = BluffTurn {
            can_challenge: open.is_some_and(|play| play.player_index != current),
            can_pass: open.is_some(),
            must_play: open.is_none(),
            declared_rank: open.map(|play| play.declared_rank),
            pile_count: self.pile.len(),
            play_order: self.play_order.clone(),
        };
        self.session.broadcast(ServerMessage::TurnStart {
            player_index: current,
            player_name: self.session.name_of(current),
            time_limit: self.session.settings().turn_millis(),
            round_number: Some(self.round_number),
            bluff: Some(bluff),
            table: None,
        });
        let limit = self.session.settings().turn_time;
        self.session.schedule(TimerKey::Turn, limit);
    }

    /// Clears the pile once the turn has come back around to whoever made
    /// the last play. They open the next round.
    fn close_round_if_passed(&mut self) {
        let owner = self.last_play.as_ref().map(|play| play.player_index);
        if owner.is_some() && owner == self.current() {
            self.close_round();
        }
    }

    fn close_round(&mut self) {
        self.pile.clear();
        self.last_play = None;
        self.round_number += 1;
        self.session.broadcast(ServerMessage::NewRound {
            round_number: self.round_number,
            starter_index: self.current(),
        });
    }

    fn advance_turn(&mut self) {
        if self.play_order.is_empty() {
            return;
        }
        self.cursor = (self.cursor + 1) % self.play_order.len();
        self.close_round_if_passed();
        self.start_turn();
    }

    fn play_cards(
        &mut self,
        index: usize,
        card_ids: Vec<String>,
        declared_rank: Rank,
        declared_count: usize,
    ) {
        if !self.may_act(index) {
            return;
        }
        if card_ids.is_empty() {
            self.session.send_error(index, "choose at least one card");
            return;
        }
        if declared_count != card_ids.len() {
            self.session
                .send_error(index, "the declared count does not match the cards played");
            return;
        }
        if !Rank::STANDARD.contains(&declared_rank) {
            self.session
                .send_error(index, format!("`{declared_rank}` is not a rank you can declare"));
            return;
        }
        if let Some(open) = &self.last_play {
            if open.declared_rank != declared_rank {
                self.session.send_error(
                    index,
                    format!("this round's rank is {}", open.declared_rank),
                );
                return;
            }
        }
        let mut unique = HashSet::new();
        if !card_ids.iter().all(|id| unique.insert(id.as_str())) {
            self.session.send_error(index, "a card was listed twice");
            return;
        }
        let hand = self.hand(index);
        if !card_ids.iter().all(|id| hand.iter().any(|card| card.id == *id)) {
            self.session.send_error(index, "you do not hold that card");
            return;
        }

        let Some(seat) = self.session.seat_mut(index) else {
            return;
        };
        let (played, kept): (Vec<Card>, Vec<Card>) = std::mem::take(&mut seat.state.hand)
            .into_iter()
            .partition(|card| unique.contains(card.id.as_str()));
        seat.state.hand = kept;
        let emptied = seat.state.hand.is_empty();

        self.session.cancel(TimerKey::Turn);
        self.pile.extend(played.iter().cloned());
        self.last_play = Some(Play {
            player_index: index,
            cards: played,
            declared_rank,
            declared_count,
        });

        self.session.broadcast(ServerMessage::CardsPlayed {
            player_index: index,
            player_name: self.session.name_of(index),
            declared_rank,
            declared_count,
            pile_count: self.pile.len(),
        });
        self.send_hand(index);
        self.broadcast_player_list();

        if emptied {
            self.winners.push(index);
            self.end_game(GameOverReason::EmptyHand);
            return;
        }
        self.advance_turn();
    }

    fn pass(&mut self, index: usize, is_timeout: bool) {
        if !is_timeout && !self.may_act(index) {
            return;
        }
        if self.last_play.is_none() {
            self.session
                .send_error(index, "the first player of a round must play");
            return;
        }
        self.session.cancel(TimerKey::Turn);
        self.session.broadcast(ServerMessage::PlayerPassed {
            player_index: index,
            player_name: self.session.name_of(index),
            is_timeout,
        });
        self.advance_turn();
    }

    fn challenge(&mut self, index: usize) {
        if !self.may_act(index) {
            return;
        }
        let Some(play) = self.last_play.take_if(|play| play.player_index != index) else {
            let message = if self.last_play.is_some() {
                "you cannot challenge your own play"
            } else {
                "there is nothing to challenge"
            };
            self.session.send_error(index, message);
            return;
        };
        self.session.cancel(TimerKey::Turn);

        // Jokers are wild and never expose a bluff.
        let is_bluff = play
            .cards
            .iter()
            .any(|card| !card.is_joker && card.rank != play.declared_rank);
        let (loser, winner) = if is_bluff {
            (play.player_index, index)
        } else {
            (index, play.player_index)
        };
        let pile = std::mem::take(&mut self.pile);
        self.session
            .broadcast(ServerMessage::ChallengeResult(ChallengeOutcome {
                challenger_index: index,
                challenger_name: self.session.name_of(index),
                challenged_index: play.player_index,
                challenged_name: self.session.name_of(play.player_index),
                declared_rank: play.declared_rank,
                revealed_cards: play.cards,
                all_pile_cards: pile.clone(),
                is_bluff,
                loser_index: loser,
                loser_name: self.session.name_of(loser),
                winner_index: winner,
                winner_name: self.session.name_of(winner),
            }));
        tracing::info!(
            room_id = %self.session.room_id(),
            challenger = index,
            challenged = play.player_index,
            is_bluff,
            pile = pile.len(),
            "challenge resolved"
        );

        if let Some(seat) = self.session.seat_mut(loser) {
            seat.state.hand.extend(pile);
            sort_hand(&mut seat.state.hand);
            self.send_hand(loser);
        }
        self.round_number += 1;
        self.broadcast_player_list();

        if let Some(position) = self.play_order.iter().position(|&seat| seat == winner) {
            self.cursor = position;
        }
        self.between_rounds = true;
        let view = self.session.settings().timing.challenge_view;
        self.session.schedule(TimerKey::Phase, view);
    }

    fn next_round_after_challenge(&mut self) {
        self.between_rounds = false;
        self.session.broadcast(ServerMessage::NewRound {
            round_number: self.round_number,
            starter_index: self.current(),
        });
        self.start_turn();
    }

    /// An idle player passes if they can, otherwise plays their first card
    /// under its own rank (a joker is declared as an ace).
    fn turn_timed_out(&mut self) {
        let Some(index) = self.current() else {
            return;
        };
        self.session
            .broadcast(ServerMessage::TurnTimeout { player_index: index });
        if self.last_play.is_some() {
            self.pass(index, true);
            return;
        }
        let Some(card) = self.hand(index).first().cloned() else {
            return;
        };
        let declared = if card.is_joker { Rank::Ace } else { card.rank };
        self.play_cards(index, vec![card.id], declared, 1);
    }

    fn end_game(&mut self, reason: GameOverReason) {
        self.session.cancel(TimerKey::Turn);
        self.session.cancel(TimerKey::Phase);
        self.phase = Phase::Finished;
        self.between_rounds = false;

        let mut remaining: Vec<usize> = self
            .play_order
            .iter()
            .copied()
            .filter(|seat| !self.winners.contains(seat))
            .collect();
        remaining.sort_by_key(|&seat| self.hand(seat).len());
        self.winners.extend(remaining);

        let count = self.winners.len();
        let rankings = self
            .winners
            .iter()
            .enumerate()
            .map(|(place, &seat)| Ranking {
                player_index: seat,
                player_name: self.session.name_of(seat),
                rank: place + 1,
                is_winner: place == 0,
                is_loser: count > 1 && place == count - 1,
            })
            .collect();

        let winner = self.winners.first().copied();
        let mut over = GameOver::new(winner, reason);
        over.winner_name = winner.map(|seat| self.session.name_of(seat));
        over.rankings = Some(rankings);
        self.session.broadcast(ServerMessage::GameOver(over));
        tracing::info!(room_id = %self.session.room_id(), ?winner, ?reason, "bluffing game over");

        let delay = self.session.settings().timing.dissolve_delay;
        self.session.schedule_dissolve(delay);
    }
}

impl GameRoom for BluffCard {
    type Seat = BluffSeat;

    fn create(session: RoomSession<BluffSeat>) -> Self {
        Self {
            session,
            phase: Phase::Waiting,
            play_order: Vec::new(),
            cursor: 0,
            pile: Vec::new(),
            last_play: None,
            round_number: 0,
            winners: Vec::new(),
            between_rounds: false,
        }
    }

    fn session(&self) -> &RoomSession<BluffSeat> {
        &self.session
    }

    fn session_mut(&mut self) -> &mut RoomSession<BluffSeat> {
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
        let index = self.seat_player(client, name, BluffSeat::default())?;
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
                let owned_play = self
                    .last_play
                    .as_ref()
                    .is_some_and(|play| play.player_index == index);
                self.play_order.remove(position);
                if self.play_order.len() <= 1 {
                    self.end_game(GameOverReason::LastStanding);
                    return;
                }
                if position < self.cursor {
                    self.cursor -= 1;
                }
                if self.cursor >= self.play_order.len() {
                    self.cursor = 0;
                }
                self.broadcast_player_list();
                if self.between_rounds {
                    return;
                }
                // The turn can no longer come back to a departed player, so
                // their play closes the round and the player to act opens
                // the next one.
                if owned_play {
                    self.session.cancel(TimerKey::Turn);
                    self.close_round();
                    self.start_turn();
                } else if was_current {
                    self.session.cancel(TimerKey::Turn);
                    self.close_round_if_passed();
                    self.start_turn();
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
            GameAction::PlayCards {
                card_ids,
                declared_rank,
                declared_count,
            } => self.play_cards(index, card_ids, declared_rank, declared_count),
            GameAction::Challenge => self.challenge(index),
            GameAction::Pass => self.pass(index, false),
            other => self.session.send_error(
                index,
                format!("`{}` is not a bluffing game action", other.name()),
            ),
        }
    }

    fn on_timer(&mut self, key: TimerKey) {
        if self.phase != Phase::Playing {
            return;
        }
        match key {
            TimerKey::Turn if !self.between_rounds => self.turn_timed_out(),
            TimerKey::Phase if self.between_rounds => self.next_round_after_challenge(),
            _ => {}
        }
    }

    fn player_views(&self) -> Vec<Option<SeatView>> {
        self.session.seat_views(|seat| SeatView {
            card_count: Some(seat.state.hand.len()),
            ..seat.view()
        })
    }

    fn game_view(&self) -> GameView {
        let settings = self.session.settings();
        GameView::BluffCard {
            current_turn: (self.phase == Phase::Playing)
                .then(|| self.current())
                .flatten(),
            last_play: self.last_play.as_ref().map(|play| PlayView {
                player_index: play.player_index,
                player_name: self.session.name_of(play.player_index),
                declared_rank: play.declared_rank,
                declared_count: play.declared_count,
            }),
            pile_count: self.pile.len(),
            round_number: self.round_number,
            winners: self.winners.clone(),
            play_order: self.play_order.clone(),
            deck_count: settings.deck_count,
            shuffle_mode: settings.shuffle_mode,
        }
    }

    fn private_view(&self, index: usize) -> Option<PrivateView> {
        self.session.seat(index).map(|seat| PrivateView::Hand {
            hand: seat.state.hand.clone(),
        })
    }
}
