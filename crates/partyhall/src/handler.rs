//! Per-connection handler: identity, lobby requests, and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Assign an ephemeral `PlayerId` → send `connected`
//!   2. Loop over two sources: frames from the socket, and events the
//!      bound room pushes down this connection's outbound channel
//!   3. On exit, tell the bound room the player went away

use std::sync::Arc;
use std::time::Duration;

use partyhall_protocol::{Codec, GameConfig, GameType, LobbyRequest, PlayerId, RoomId};
use partyhall_room::{
    ClientHandle, ClientSender, GameAction, Outbound, RoomError, RoomHandle, ServerMessage,
};
use partyhall_transport::{Connection, WebSocketConnection};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::PartyhallError;
use crate::server::ServerState;

/// Display name for players who join without one.
const DEFAULT_NAME: &str = "Player";

/// Anything a client may send: a lifecycle request or an in-game action.
///
/// Both are tagged by `type` and their tags don't overlap, so the first
/// variant that parses wins.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Inbound {
    Lobby(LobbyRequest),
    Game(GameAction),
}

/// Which room, if any, this connection is attached to.
enum Binding {
    Idle,
    Seated(RoomHandle),
    Watching(RoomHandle),
}

/// Fixed-window message counter.
struct RateLimiter {
    limit: u32,
    window: Duration,
    started: Instant,
    count: u32,
}

impl RateLimiter {
    fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            started: Instant::now(),
            count: 0,
        }
    }

    /// Counts one message; `false` once the window's budget is spent.
    fn allow(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.started) >= self.window {
            self.started = now;
            self.count = 0;
        }
        self.count += 1;
        self.count <= self.limit
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
) -> Result<(), PartyhallError> {
    let conn_id = conn.id();
    let player_id = state.next_player_id();
    tracing::debug!(%conn_id, %player_id, peer = %conn.peer_addr(), "handling new connection");

    let (outbound, mut events) = mpsc::unbounded_channel();
    let mut handler = ConnectionHandler {
        conn: &conn,
        state: &state,
        player_id,
        outbound,
        binding: Binding::Idle,
        limiter: RateLimiter::new(state.config.rate_limit, state.config.rate_window),
    };

    let result = match handler.send(&ServerMessage::Connected { player_id }).await {
        Ok(()) => handler.run(&mut events).await,
        Err(e) => Err(e),
    };
    handler.detach().await;
    tracing::info!(%conn_id, %player_id, "connection closed");
    result
}

struct ConnectionHandler<'a> {
    conn: &'a WebSocketConnection,
    state: &'a ServerState,
    player_id: PlayerId,
    outbound: ClientSender,
    binding: Binding,
    limiter: RateLimiter,
}

impl ConnectionHandler<'_> {
    async fn run(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<Outbound>,
    ) -> Result<(), PartyhallError> {
        loop {
            tokio::select! {
                frame = self.conn.recv() => match frame? {
                    Some(data) => self.on_frame(&data).await?,
                    None => return Ok(()),
                },
                Some(event) = events.recv() => match event {
                    Outbound::Message(message) => self.forward(&message).await?,
                    Outbound::Close => {
                        // The seat now belongs to a newer connection.
                        tracing::debug!(player_id = %self.player_id, "connection superseded");
                        self.binding = Binding::Idle;
                        let _ = self.conn.close().await;
                        return Ok(());
                    }
                },
            }
        }
    }

    // -- inbound --------------------------------------------------------

    async fn on_frame(&mut self, data: &[u8]) -> Result<(), PartyhallError> {
        if !self.limiter.allow() {
            tracing::debug!(player_id = %self.player_id, "rate limited");
            return self.send_error("too many messages, slow down").await;
        }

        let inbound: Inbound = match self.state.codec.decode(data) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::debug!(player_id = %self.player_id, error = %e, "failed to decode message");
                return self.send_error("invalid message").await;
            }
        };

        match inbound {
            Inbound::Lobby(request) => self.on_lobby(request).await,
            Inbound::Game(action) => self.on_action(action).await,
        }
    }

    async fn on_lobby(&mut self, request: LobbyRequest) -> Result<(), PartyhallError> {
        match request {
            LobbyRequest::JoinRoom {
                room_id,
                player_name,
                game_type,
                config,
            } => self.join(room_id, player_name, game_type, &config).await,
            LobbyRequest::Spectate { room_id } => self.spectate(room_id).await,
            LobbyRequest::Reconnect {
                room_id,
                player_name,
            } => self.reconnect(room_id, player_name).await,
            LobbyRequest::LeaveRoom => self.leave().await,
            LobbyRequest::KickPlayer { player_index } => self.kick(player_index).await,
        }
    }

    async fn join(
        &mut self,
        room_id: RoomId,
        player_name: Option<String>,
        game_type: Option<GameType>,
        config: &GameConfig,
    ) -> Result<(), PartyhallError> {
        if !matches!(self.binding, Binding::Idle) {
            return self.send_error("you are already in a room").await;
        }

        // Lock only for lookup/creation, drop before talking to the room.
        let found = {
            let mut rooms = self.state.rooms.lock().await;
            match (rooms.get(room_id), game_type) {
                (Some(handle), _) => Ok(handle),
                (None, Some(game_type)) => rooms.create_at(room_id, game_type, config),
                (None, None) => Err(RoomError::NotFound(room_id)),
            }
        };
        let handle = match found {
            Ok(handle) => handle,
            Err(e) => return self.send_error(e.to_string()).await,
        };

        let name = display_name(player_name);
        match handle.join(self.client(), name.clone()).await {
            Ok(player_index) => {
                tracing::info!(player_id = %self.player_id, %room_id, player_index, name = %name, "joined room");
                self.binding = Binding::Seated(handle);
                Ok(())
            }
            Err(e) => self.send_error(e.to_string()).await,
        }
    }

    async fn spectate(&mut self, room_id: RoomId) -> Result<(), PartyhallError> {
        if !matches!(self.binding, Binding::Idle) {
            return self.send_error("you are already in a room").await;
        }
        let found = self.state.rooms.lock().await.get(room_id);
        let Some(handle) = found else {
            return self.send_error(RoomError::NotFound(room_id).to_string()).await;
        };
        match handle.spectate(self.client()).await {
            Ok(()) => {
                tracing::info!(player_id = %self.player_id, %room_id, "spectating");
                self.binding = Binding::Watching(handle);
                Ok(())
            }
            Err(e) => self.send_error(e.to_string()).await,
        }
    }

    async fn reconnect(&mut self, room_id: RoomId, name: String) -> Result<(), PartyhallError> {
        if !matches!(self.binding, Binding::Idle) {
            return self.send_error("you are already in a room").await;
        }
        let found = self.state.rooms.lock().await.get(room_id);
        let Some(handle) = found else {
            return self.send_error(RoomError::NotFound(room_id).to_string()).await;
        };
        match handle.reconnect(self.client(), name).await {
            Ok(player_index) => {
                tracing::info!(player_id = %self.player_id, %room_id, player_index, "reconnected");
                self.binding = Binding::Seated(handle);
                Ok(())
            }
            Err(e) => self.send_error(e.to_string()).await,
        }
    }

    async fn leave(&mut self) -> Result<(), PartyhallError> {
        match std::mem::replace(&mut self.binding, Binding::Idle) {
            Binding::Seated(handle) => {
                if let Err(e) = handle.leave(self.player_id).await {
                    tracing::debug!(player_id = %self.player_id, error = %e, "leave failed");
                }
                self.send(&ServerMessage::RoomLeft).await?;
                evict_if_empty(self.state, &handle).await;
                Ok(())
            }
            Binding::Watching(handle) => {
                let _ = handle.unspectate(self.player_id).await;
                self.send(&ServerMessage::RoomLeft).await
            }
            Binding::Idle => self.send_error("you are not in a room").await,
        }
    }

    async fn kick(&mut self, player_index: usize) -> Result<(), PartyhallError> {
        let Some(handle) = self.seated_room() else {
            return self.send_error("you are not in a room").await;
        };
        match handle.kick(self.player_id, player_index).await {
            Ok(()) => Ok(()),
            Err(e) => self.reject(e).await,
        }
    }

    async fn on_action(&mut self, action: GameAction) -> Result<(), PartyhallError> {
        let Some(handle) = self.seated_room() else {
            let message = match self.binding {
                Binding::Watching(_) => "spectators cannot play",
                _ => "you are not in a room",
            };
            return self.send_error(message).await;
        };
        match handle.action(self.player_id, action).await {
            Ok(()) => Ok(()),
            Err(e) => self.reject(e).await,
        }
    }

    // -- outbound -------------------------------------------------------

    /// Relays a room event to the socket, dropping the binding when the
    /// event ends this connection's membership.
    async fn forward(&mut self, message: &ServerMessage) -> Result<(), PartyhallError> {
        if matches!(
            message,
            ServerMessage::Kicked { .. } | ServerMessage::RoomDissolved { .. }
        ) {
            self.binding = Binding::Idle;
        }
        self.send(message).await
    }

    async fn send(&self, message: &ServerMessage) -> Result<(), PartyhallError> {
        let bytes = self.state.codec.encode(message)?;
        self.conn.send(&bytes).await?;
        Ok(())
    }

    async fn send_error(&self, message: impl Into<String>) -> Result<(), PartyhallError> {
        self.send(&ServerMessage::Error {
            message: message.into(),
        })
        .await
    }

    /// Reports a failed room request; a room that has stopped is forgotten.
    async fn reject(&mut self, error: RoomError) -> Result<(), PartyhallError> {
        if matches!(error, RoomError::Unavailable(_)) {
            self.binding = Binding::Idle;
        }
        self.send_error(error.to_string()).await
    }

    // -- helpers --------------------------------------------------------

    fn client(&self) -> ClientHandle {
        ClientHandle::new(self.player_id, self.outbound.clone())
    }

    fn seated_room(&self) -> Option<RoomHandle> {
        match &self.binding {
            Binding::Seated(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Releases the binding when the socket goes away.
    async fn detach(&mut self) {
        match std::mem::replace(&mut self.binding, Binding::Idle) {
            Binding::Seated(handle) => {
                if handle.disconnect(self.player_id).await.is_ok() {
                    evict_if_empty(self.state, &handle).await;
                }
            }
            Binding::Watching(handle) => {
                let _ = handle.unspectate(self.player_id).await;
            }
            Binding::Idle => {}
        }
    }
}

/// Evicts a room nobody is left in.
async fn evict_if_empty(state: &ServerState, handle: &RoomHandle) {
    match handle.info().await {
        Ok(info) if info.is_empty() => {
            state.rooms.lock().await.evict(handle.room_id());
        }
        _ => {}
    }
}

fn display_name(requested: Option<String>) -> String {
    requested
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_NAME.to_string())
}
