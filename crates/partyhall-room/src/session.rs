//! The room session: seats, spectators, timers and messaging primitives
//! that every game embeds.
//!
//! A game owns exactly one [`RoomSession`] and adds its own state around
//! it. The session knows nothing about any game's rules; it only keeps
//! the bookkeeping every room needs consistent.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use partyhall_protocol::{GameType, PlayerId, RoomId};
use partyhall_timer::TimerWheel;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::RoomSettings;
use crate::message::{SeatView, ServerMessage};
use crate::random::Randomness;

// ---------------------------------------------------------------------------
// Client handles
// ---------------------------------------------------------------------------

/// What a room pushes down a connection's outbound channel.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// An event, shared between every recipient of the same broadcast.
    Message(Arc<ServerMessage>),
    /// The room has replaced this connection; the handler should close it.
    Close,
}

/// Channel sender for delivering outbound events to one connection.
pub type ClientSender = mpsc::UnboundedSender<Outbound>;

/// A room's view of one connection: its identity plus its outbound channel.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: PlayerId,
    sender: ClientSender,
}

impl ClientHandle {
    pub fn new(id: PlayerId, sender: ClientSender) -> Self {
        Self { id, sender }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// `false` once the connection handler has dropped its receiver.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Delivers a shared event. Closed connections are skipped silently.
    pub fn deliver(&self, message: Arc<ServerMessage>) {
        if self.is_open() {
            let _ = self.sender.send(Outbound::Message(message));
        }
    }

    pub fn send(&self, message: ServerMessage) {
        self.deliver(Arc::new(message));
    }

    /// Asks the connection handler to close the socket.
    pub fn close(&self) {
        let _ = self.sender.send(Outbound::Close);
    }
}

// ---------------------------------------------------------------------------
// Seats
// ---------------------------------------------------------------------------

/// An occupied player slot: connection, display name, and the game's
/// private per-player state `S`.
#[derive(Debug)]
pub struct Seat<S> {
    pub client: ClientHandle,
    pub name: String,
    pub state: S,
}

impl<S> Seat<S> {
    pub fn id(&self) -> PlayerId {
        self.client.id()
    }

    /// A public view with just the name and connection flag filled in.
    pub fn view(&self) -> SeatView {
        SeatView::new(self.name.clone(), self.client.is_open())
    }
}

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

/// What a room timer is for. One pending timer per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// A disconnected player's seat is released when this fires.
    Grace(PlayerId),
    /// Post-game dissolution.
    Dissolve,
    /// The current turn (or hiding window) ran out.
    Turn,
    /// The next step of a timed phase sequence (dice, reveals, rounds).
    Phase,
    /// Speed match: automatic turn advance after a flip.
    Advance,
    /// Speed match: end of the bell lockout.
    BellLock,
}

/// Called once when a room dissolves, with the room's id.
pub type DissolveHook = Box<dyn FnMut(RoomId) + Send>;

// ---------------------------------------------------------------------------
// RoomSession
// ---------------------------------------------------------------------------

pub struct RoomSession<S> {
    room_id: RoomId,
    settings: RoomSettings,
    seats: Vec<Option<Seat<S>>>,
    spectators: Vec<ClientHandle>,
    banned: HashSet<String>,
    timers: TimerWheel<TimerKey>,
    rng: Box<dyn Randomness>,
    created_at: Instant,
    on_dissolve: Option<DissolveHook>,
    dissolved: bool,
}

impl<S> fmt::Debug for RoomSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomSession")
            .field("room_id", &self.room_id)
            .field("game_type", &self.settings.game_type)
            .field("players", &self.player_count())
            .field("spectators", &self.spectators.len())
            .field("timers", &self.timers.pending_keys())
            .field("dissolved", &self.dissolved)
            .finish()
    }
}

impl<S> RoomSession<S> {
    pub fn new(room_id: RoomId, settings: RoomSettings, rng: Box<dyn Randomness>) -> Self {
        Self {
            room_id,
            settings,
            seats: Vec::new(),
            spectators: Vec::new(),
            banned: HashSet::new(),
            timers: TimerWheel::new(),
            rng,
            created_at: Instant::now(),
            on_dissolve: None,
            dissolved: false,
        }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn game_type(&self) -> GameType {
        self.settings.game_type
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn rng(&mut self) -> &mut dyn Randomness {
        self.rng.as_mut()
    }

    // -- seats ----------------------------------------------------------

    pub fn seats(&self) -> &[Option<Seat<S>>] {
        &self.seats
    }

    /// Mutable access to the slot list, for games that size or compact it.
    pub fn seats_mut(&mut self) -> &mut Vec<Option<Seat<S>>> {
        &mut self.seats
    }

    pub fn seat(&self, index: usize) -> Option<&Seat<S>> {
        self.seats.get(index).and_then(Option::as_ref)
    }

    pub fn seat_mut(&mut self, index: usize) -> Option<&mut Seat<S>> {
        self.seats.get_mut(index).and_then(Option::as_mut)
    }

    pub fn is_seated(&self, index: usize) -> bool {
        self.seat(index).is_some()
    }

    pub fn player_count(&self) -> usize {
        self.seats.iter().flatten().count()
    }

    /// Indices of occupied seats, ascending.
    pub fn seated_indices(&self) -> Vec<usize> {
        self.seats
            .iter()
            .enumerate()
            .filter_map(|(i, seat)| seat.as_ref().map(|_| i))
            .collect()
    }

    pub fn index_of(&self, player: PlayerId) -> Option<usize> {
        self.seats
            .iter()
            .position(|seat| seat.as_ref().is_some_and(|s| s.id() == player))
    }

    /// The display name in a seat, or an empty string for an empty seat.
    pub fn name_of(&self, index: usize) -> String {
        self.seat(index).map(|s| s.name.clone()).unwrap_or_default()
    }

    /// Is `player` the host (seat 0)?
    pub fn is_host(&self, player: PlayerId) -> bool {
        self.seat(0).is_some_and(|s| s.id() == player)
    }

    /// Finds the seat a reconnecting client named `name` should take over.
    ///
    /// Seats holding a reconnect grace timer win; otherwise a seat whose
    /// connection has already closed. A seat with a live connection is
    /// never handed to someone else.
    pub fn reconnect_slot(&self, name: &str) -> Option<usize> {
        let by_name = |seat: &&Seat<S>| seat.name == name;
        self.seats
            .iter()
            .position(|seat| {
                seat.as_ref()
                    .filter(by_name)
                    .is_some_and(|s| self.timers.is_pending(TimerKey::Grace(s.id())))
            })
            .or_else(|| {
                self.seats.iter().position(|seat| {
                    seat.as_ref().filter(by_name).is_some_and(|s| !s.client.is_open())
                })
            })
    }

    /// Seats a player in a free slot.
    ///
    /// Fixed-size games pre-fill `seats` with `None`; for dynamic games
    /// a new slot is appended while below `max_players`.
    pub fn take_seat(&mut self, client: ClientHandle, name: String, state: S) -> Option<usize> {
        let seat = Seat {
            client,
            name,
            state,
        };
        if let Some(index) = self.seats.iter().position(Option::is_none) {
            self.seats[index] = Some(seat);
            return Some(index);
        }
        if self.seats.len() < self.settings.max_players {
            self.seats.push(Some(seat));
            return Some(self.seats.len() - 1);
        }
        None
    }

    /// Public seat views in slot order.
    pub fn seat_views(&self, mut view: impl FnMut(&Seat<S>) -> SeatView) -> Vec<Option<SeatView>> {
        self.seats
            .iter()
            .map(|seat| seat.as_ref().map(&mut view))
            .collect()
    }

    pub fn ban(&mut self, name: &str) {
        self.banned.insert(name.to_string());
    }

    pub fn is_banned(&self, name: &str) -> bool {
        self.banned.contains(name)
    }

    // -- spectators -----------------------------------------------------

    pub fn spectator_count(&self) -> usize {
        self.spectators.len()
    }

    pub fn push_spectator(&mut self, client: ClientHandle) {
        self.spectators.push(client);
    }

    /// Removes a spectator. Returns whether one was found.
    pub fn drop_spectator(&mut self, id: PlayerId) -> bool {
        let before = self.spectators.len();
        self.spectators.retain(|s| s.id() != id);
        self.spectators.len() != before
    }

    // -- messaging ------------------------------------------------------

    /// Sends one event to every seated player and every spectator.
    pub fn broadcast(&self, message: ServerMessage) {
        let shared = Arc::new(message);
        for seat in self.seats.iter().flatten() {
            seat.client.deliver(Arc::clone(&shared));
        }
        for spectator in &self.spectators {
            spectator.deliver(Arc::clone(&shared));
        }
    }

    /// Sends to every seated player except `skip`, and to spectators.
    pub fn broadcast_except(&self, skip: usize, message: ServerMessage) {
        let shared = Arc::new(message);
        for (index, seat) in self.seats.iter().enumerate() {
            if index != skip {
                if let Some(seat) = seat {
                    seat.client.deliver(Arc::clone(&shared));
                }
            }
        }
        for spectator in &self.spectators {
            spectator.deliver(Arc::clone(&shared));
        }
    }

    /// Sends to one seat. Empty seats and closed connections are skipped.
    pub fn send_to(&self, index: usize, message: ServerMessage) {
        if let Some(seat) = self.seat(index) {
            seat.client.send(message);
        }
    }

    pub fn send_error(&self, index: usize, message: impl Into<String>) {
        self.send_to(index, ServerMessage::error(message));
    }

    pub fn send_to_spectators(&self, message: ServerMessage) {
        let shared = Arc::new(message);
        for spectator in &self.spectators {
            spectator.deliver(Arc::clone(&shared));
        }
    }

    pub fn broadcast_spectator_count(&self) {
        self.broadcast(ServerMessage::SpectatorCount {
            count: self.spectators.len(),
        });
    }

    pub fn broadcast_state(&self, state: &str) {
        self.broadcast(ServerMessage::StateChange {
            state: state.to_string(),
        });
    }

    // -- timers ---------------------------------------------------------

    pub fn timers(&self) -> &TimerWheel<TimerKey> {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut TimerWheel<TimerKey> {
        &mut self.timers
    }

    /// Schedules `key`, replacing any timer already pending for it.
    pub fn schedule(&mut self, key: TimerKey, delay: Duration) {
        self.timers.schedule(key, delay);
    }

    pub fn cancel(&mut self, key: TimerKey) {
        self.timers.cancel(key);
    }

    /// Milliseconds left on the advertised turn limit. The turn timer
    /// itself runs on for the grace period after that.
    pub fn turn_remaining_millis(&self) -> Option<u64> {
        let grace = self.settings.timing.turn_grace;
        self.timers
            .remaining(TimerKey::Turn)
            .map(|left| left.saturating_sub(grace).as_millis() as u64)
    }

    // -- dissolution ----------------------------------------------------

    pub fn set_dissolve_hook(&mut self, hook: DissolveHook) {
        self.on_dissolve = Some(hook);
    }

    pub fn is_dissolved(&self) -> bool {
        self.dissolved
    }

    /// Schedules the room to dissolve after `delay`.
    ///
    /// A dissolve already pending is left alone. Reconnect grace timers
    /// are dropped: nobody is coming back to a finished game.
    pub fn schedule_dissolve(&mut self, delay: Duration) {
        self.timers
            .cancel_where(|key| matches!(key, TimerKey::Grace(_)));
        if self.timers.schedule_if_absent(TimerKey::Dissolve, delay) {
            tracing::info!(room_id = %self.room_id, ?delay, "room dissolve scheduled");
        }
    }

    /// Dissolves the room now: tells everyone, empties every seat, cancels
    /// every timer and fires the dissolve hook. Idempotent.
    pub fn dissolve(&mut self, message: &str) {
        if self.dissolved {
            return;
        }
        self.dissolved = true;
        self.timers.clear();
        self.broadcast(ServerMessage::RoomDissolved {
            message: message.to_string(),
            redirect: true,
        });
        for seat in &mut self.seats {
            *seat = None;
        }
        tracing::info!(room_id = %self.room_id, reason = message, "room dissolved");
        if let Some(hook) = self.on_dissolve.as_mut() {
            hook(self.room_id);
        }
    }

    /// Stops the room without notifying anyone (registry eviction).
    pub fn shutdown(&mut self) {
        self.timers.clear();
        self.dissolved = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoomSettings;
    use crate::random::ScriptedRandomness;
    use crate::testing::{client, drain};
    use partyhall_protocol::GameConfig;

    fn session(max_players: u32) -> RoomSession<()> {
        let config = GameConfig {
            max_players: Some(max_players),
            ..GameConfig::default()
        };
        RoomSession::new(
            RoomId::new(4242).unwrap(),
            RoomSettings::resolve(GameType::BluffCard, &config),
            Box::new(ScriptedRandomness::new()),
        )
    }

    #[test]
    fn test_take_seat_fills_holes_then_appends_up_to_max() {
        let mut s = session(3);
        let (a, _ra) = client(1);
        let (b, _rb) = client(2);
        let (c, _rc) = client(3);
        let (d, _rd) = client(4);
        assert_eq!(s.take_seat(a, "a".into(), ()), Some(0));
        assert_eq!(s.take_seat(b, "b".into(), ()), Some(1));
        s.seats_mut()[0] = None;
        assert_eq!(s.take_seat(c, "c".into(), ()), Some(0));
        assert_eq!(s.take_seat(d.clone(), "d".into(), ()), Some(2));
        assert_eq!(s.take_seat(d, "e".into(), ()), None);
        assert_eq!(s.player_count(), 3);
    }

    #[test]
    fn test_broadcast_reaches_players_and_spectators() {
        let mut s = session(6);
        let (a, mut ra) = client(1);
        let (spec, mut rs) = client(9);
        s.take_seat(a, "a".into(), ());
        s.push_spectator(spec);

        s.broadcast(ServerMessage::SpectatorCount { count: 1 });

        assert_eq!(drain(&mut ra), vec![ServerMessage::SpectatorCount { count: 1 }]);
        assert_eq!(drain(&mut rs), vec![ServerMessage::SpectatorCount { count: 1 }]);
    }

    #[test]
    fn test_send_to_closed_connection_is_skipped() {
        let mut s = session(6);
        let (a, ra) = client(1);
        s.take_seat(a, "a".into(), ());
        drop(ra);
        s.send_error(0, "nobody hears this");
        s.send_error(5, "empty seat");
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_dissolve_is_idempotent_and_drops_grace_timers() {
        let mut s = session(6);
        s.schedule(TimerKey::Grace(PlayerId(1)), Duration::from_secs(30));
        s.schedule_dissolve(Duration::from_secs(10));
        s.schedule_dissolve(Duration::from_secs(1));

        assert!(!s.timers().is_pending(TimerKey::Grace(PlayerId(1))));
        assert_eq!(
            s.timers().remaining(TimerKey::Dissolve),
            Some(Duration::from_secs(10))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dissolve_clears_seats_timers_and_fires_hook_once() {
        let mut s = session(6);
        let (a, mut ra) = client(1);
        s.take_seat(a, "a".into(), ());
        s.schedule(TimerKey::Turn, Duration::from_secs(5));
        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        s.set_dissolve_hook(Box::new(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }));

        s.dissolve("done");
        s.dissolve("again");

        assert!(s.is_dissolved());
        assert_eq!(s.player_count(), 0);
        assert!(s.timers().is_empty());
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(
            drain(&mut ra),
            vec![ServerMessage::RoomDissolved {
                message: "done".into(),
                redirect: true
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_slot_prefers_seat_in_grace() {
        let mut s = session(6);
        let (a, _ra) = client(1);
        let (b, rb) = client(2);
        s.take_seat(a, "same".into(), ());
        s.take_seat(b, "same".into(), ());
        drop(rb);
        assert_eq!(s.reconnect_slot("same"), Some(1));

        s.schedule(TimerKey::Grace(PlayerId(1)), Duration::from_secs(30));
        assert_eq!(s.reconnect_slot("same"), Some(0));
        assert_eq!(s.reconnect_slot("other"), None);
    }

    #[test]
    fn test_reconnect_slot_never_takes_live_seat() {
        let mut s = session(6);
        let (a, _ra) = client(1);
        s.take_seat(a, "ana".into(), ());
        assert_eq!(s.reconnect_slot("ana"), None);
    }
}
