//! The `GameRoom` trait: one implementation per game, sharing the room
//! lifecycle through provided methods.
//!
//! A game supplies its rules (seating, actions, timers, views). The
//! lifecycle every room shares (disconnect grace, reconnect, spectators,
//! kicking, dissolution) is written once here against
//! [`RoomSession`], which each game embeds.

use partyhall_protocol::{GameType, PlayerId};

use crate::actor::RoomInfo;
use crate::error::RoomError;
use crate::message::{GameAction, GameView, PrivateView, RoomSnapshot, SeatView, ServerMessage};
use crate::session::{ClientHandle, RoomSession, TimerKey};

/// A game's rules, driven by the room actor.
///
/// Every method runs on the room's own task, one at a time. Timer keys
/// reach [`GameRoom::on_timer`] only while still scheduled, but a game
/// must still check its phase before acting on one.
pub trait GameRoom: Send + 'static {
    /// Private per-player state kept in each seat.
    type Seat: Send + 'static;

    /// Builds the game around a fresh session.
    fn create(session: RoomSession<Self::Seat>) -> Self
    where
        Self: Sized;

    fn session(&self) -> &RoomSession<Self::Seat>;

    fn session_mut(&mut self) -> &mut RoomSession<Self::Seat>;

    /// Name of the current phase, as sent in `state_change`.
    fn phase_name(&self) -> &'static str;

    /// Players may join only while this is `true`.
    fn is_waiting(&self) -> bool;

    fn is_finished(&self) -> bool;

    /// Seats a new player.
    ///
    /// # Errors
    /// [`RoomError::WrongPhase`] once the game has started,
    /// [`RoomError::RoomFull`] with every seat taken.
    fn add_player(&mut self, client: ClientHandle, name: String) -> Result<usize, RoomError>;

    /// Removes a player for good. Unknown ids are ignored.
    fn remove_player(&mut self, player: PlayerId);

    /// Applies one game action from a seated player.
    fn handle_message(&mut self, sender: PlayerId, action: GameAction);

    /// Reacts to a game timer (`Turn`, `Phase`, `Advance`, `BellLock`).
    fn on_timer(&mut self, key: TimerKey);

    /// Public seat views in slot order.
    fn player_views(&self) -> Vec<Option<SeatView>>;

    /// The game-specific public state.
    fn game_view(&self) -> GameView;

    /// A seat's own secret, for its reconnect snapshot.
    fn private_view(&self, _index: usize) -> Option<PrivateView> {
        None
    }

    // -----------------------------------------------------------------
    // Provided lifecycle
    // -----------------------------------------------------------------

    fn is_in_progress(&self) -> bool {
        !self.is_waiting() && !self.is_finished()
    }

    /// A full public snapshot, free of unrevealed secrets.
    fn spectate_state(&self) -> RoomSnapshot {
        let session = self.session();
        let settings = session.settings();
        RoomSnapshot {
            room_id: session.room_id(),
            game_type: settings.game_type,
            state: self.phase_name().to_string(),
            players: self.player_views(),
            max_players: settings.max_players,
            turn_time_limit: settings.turn_millis(),
            spectator_count: session.spectator_count(),
            game: self.game_view(),
        }
    }

    /// Sends a rejoining player the public snapshot plus their own secret.
    fn send_reconnect_state(&self, index: usize) {
        self.session().send_to(
            index,
            ServerMessage::Reconnected {
                player_index: index,
                snapshot: self.spectate_state(),
                private: self.private_view(index),
            },
        );
    }

    fn broadcast_player_list(&self) {
        self.session().broadcast(ServerMessage::PlayerList {
            players: self.player_views(),
            max_players: self.session().settings().max_players,
        });
    }

    /// Shared join checks and notifications; games call this from
    /// [`GameRoom::add_player`] with the new seat's initial state.
    fn seat_player(
        &mut self,
        client: ClientHandle,
        name: String,
        state: Self::Seat,
    ) -> Result<usize, RoomError> {
        if !self.is_waiting() {
            return Err(RoomError::WrongPhase(self.phase_name()));
        }
        let session = self.session_mut();
        if session.is_banned(&name) {
            return Err(RoomError::Banned(name));
        }
        let room_id = session.room_id();
        let player_id = client.id();
        let index = session
            .take_seat(client, name.clone(), state)
            .ok_or(RoomError::RoomFull(room_id))?;

        let settings = session.settings();
        let bluffing = settings.game_type == GameType::BluffCard;
        session.send_to(
            index,
            ServerMessage::RoomJoined {
                room_id,
                player_id,
                player_index: index,
                player_name: name.clone(),
                game_type: settings.game_type,
                max_players: settings.max_players,
                turn_time_limit: settings.turn_millis(),
                deck_count: bluffing.then_some(settings.deck_count),
                shuffle_mode: bluffing.then_some(settings.shuffle_mode),
            },
        );
        for other in session.seated_indices() {
            if other == index {
                continue;
            }
            session.send_to(
                index,
                ServerMessage::PlayerJoined {
                    player_index: other,
                    player_name: session.name_of(other),
                },
            );
            session.send_to(
                other,
                ServerMessage::PlayerJoined {
                    player_index: index,
                    player_name: name.clone(),
                },
            );
        }
        tracing::info!(
            room_id = %room_id,
            %player_id,
            player_index = index,
            players = session.player_count(),
            "player joined"
        );
        Ok(index)
    }

    /// A connection dropped. Mid-game the seat is held for the reconnect
    /// grace period; otherwise the player is removed at once.
    fn handle_disconnect(&mut self, player: PlayerId) {
        let Some(index) = self.session().index_of(player) else {
            return;
        };
        if !self.is_in_progress() {
            self.remove_player(player);
            return;
        }
        let session = self.session_mut();
        let grace = session.settings().timing.reconnect_grace;
        session.schedule(TimerKey::Grace(player), grace);
        session.broadcast(ServerMessage::PlayerAway {
            player_index: index,
            player_name: session.name_of(index),
        });
        tracing::info!(
            room_id = %session.room_id(),
            %player,
            player_index = index,
            ?grace,
            "player away, holding seat"
        );
    }

    /// An explicit leave: the grace timer (if any) goes with the seat.
    fn leave(&mut self, player: PlayerId) {
        self.session_mut().cancel(TimerKey::Grace(player));
        self.remove_player(player);
    }

    /// Hands a held seat to a new connection presenting the same name.
    ///
    /// # Errors
    /// [`RoomError::NoSuchPlayer`] if no disconnected seat has that name.
    fn reconnect_player(&mut self, client: ClientHandle, name: &str) -> Result<usize, RoomError> {
        let session = self.session_mut();
        let index = session
            .reconnect_slot(name)
            .ok_or_else(|| RoomError::NoSuchPlayer(name.to_string()))?;
        let Some(seat) = session.seat_mut(index) else {
            return Err(RoomError::NoSuchPlayer(name.to_string()));
        };
        let old_id = seat.id();
        let new_id = client.id();
        let stale = std::mem::replace(&mut seat.client, client);
        stale.close();
        session.cancel(TimerKey::Grace(old_id));
        tracing::info!(
            room_id = %session.room_id(),
            %old_id,
            %new_id,
            player_index = index,
            "player reconnected"
        );

        self.send_reconnect_state(index);
        let session = self.session();
        session.broadcast_except(
            index,
            ServerMessage::PlayerBack {
                player_index: index,
                player_name: session.name_of(index),
            },
        );
        self.broadcast_player_list();
        Ok(index)
    }

    fn add_spectator(&mut self, client: ClientHandle) {
        let id = client.id();
        self.session_mut().push_spectator(client.clone());
        client.send(ServerMessage::SpectateJoined(self.spectate_state()));
        let session = self.session();
        session.broadcast_spectator_count();
        tracing::debug!(
            room_id = %session.room_id(),
            spectator = %id,
            spectators = session.spectator_count(),
            "spectator joined"
        );
    }

    fn remove_spectator(&mut self, id: PlayerId) {
        if self.session_mut().drop_spectator(id) {
            self.session().broadcast_spectator_count();
        }
    }

    /// Host-only, before the game starts: removes the player in `target`
    /// and bars their name from rejoining.
    ///
    /// # Errors
    /// [`RoomError::WrongPhase`], [`RoomError::NotHost`], or
    /// [`RoomError::InvalidTarget`] for an empty seat or the host's own.
    fn kick_player(&mut self, requester: PlayerId, target: usize) -> Result<(), RoomError> {
        if !self.is_waiting() {
            return Err(RoomError::WrongPhase(self.phase_name()));
        }
        let session = self.session_mut();
        if !session.is_host(requester) {
            return Err(RoomError::NotHost);
        }
        let Some(seat) = session.seat(target).filter(|_| target != 0) else {
            return Err(RoomError::InvalidTarget(target));
        };
        let target_id = seat.id();
        let name = seat.name.clone();
        session.send_to(
            target,
            ServerMessage::Kicked {
                message: "you were removed from the room by the host".into(),
            },
        );
        session.ban(&name);
        tracing::info!(room_id = %session.room_id(), player = %target_id, "player kicked");
        self.remove_player(target_id);
        Ok(())
    }

    /// Routes a fired timer: lifecycle keys here, game keys to
    /// [`GameRoom::on_timer`].
    fn fire_timer(&mut self, key: TimerKey) {
        match key {
            TimerKey::Grace(player) => {
                tracing::info!(
                    room_id = %self.session().room_id(),
                    %player,
                    "reconnect grace expired"
                );
                self.remove_player(player);
            }
            TimerKey::Dissolve => self
                .session_mut()
                .dissolve("the game is over and the room has closed"),
            other => self.on_timer(other),
        }
    }

    fn info(&self) -> RoomInfo {
        let session = self.session();
        RoomInfo {
            room_id: session.room_id(),
            game_type: session.game_type(),
            state: self.phase_name(),
            player_count: session.player_count(),
            spectator_count: session.spectator_count(),
            max_players: session.settings().max_players,
            created_at: session.created_at(),
        }
    }
}
