//! Room actor: an isolated Tokio task that owns one game.
//!
//! Each room runs in its own task. Commands arrive over an mpsc channel
//! and the room's timers are polled in the same `select!`, so a timer
//! callback and a message handler never run at the same time, and a
//! cancelled timer can never fire late.

use partyhall_protocol::{GameType, PlayerId, RoomId};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::config::RoomSettings;
use crate::error::RoomError;
use crate::game::GameRoom;
use crate::games::{BluffCard, BoardCapture, HiddenCount, NumberDuel, SpeedMatch};
use crate::message::GameAction;
use crate::random::Randomness;
use crate::session::{ClientHandle, DissolveHook, RoomSession};

/// Commands sent to a room actor through its channel.
///
/// Variants carrying a `oneshot::Sender` are requests: the caller waits
/// for the room's answer on it.
pub(crate) enum RoomCommand {
    /// Take a seat.
    Join {
        client: ClientHandle,
        name: String,
        reply: oneshot::Sender<Result<usize, RoomError>>,
    },

    /// Watch without a seat.
    Spectate {
        client: ClientHandle,
        reply: oneshot::Sender<()>,
    },

    /// Reclaim a held seat by name.
    Reconnect {
        client: ClientHandle,
        name: String,
        reply: oneshot::Sender<Result<usize, RoomError>>,
    },

    /// Give up a seat for good.
    Leave {
        player: PlayerId,
        reply: oneshot::Sender<()>,
    },

    /// A seated player's connection dropped.
    Disconnect { player: PlayerId },

    /// A spectator left or dropped.
    Unspectate { player: PlayerId },

    /// A game action from a seated player.
    Action { sender: PlayerId, action: GameAction },

    Kick {
        requester: PlayerId,
        target: usize,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    Info { reply: oneshot::Sender<RoomInfo> },

    /// Stop the room without notifying anyone.
    Shutdown,
}

/// A snapshot of room metadata (not the game state itself).
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub game_type: GameType,
    /// Current phase name, as sent in `state_change`.
    pub state: &'static str,
    pub player_count: usize,
    pub spectator_count: usize,
    pub max_players: usize,
    pub created_at: Instant,
}

impl RoomInfo {
    /// No players and no spectators.
    pub fn is_empty(&self) -> bool {
        self.player_count == 0 && self.spectator_count == 0
    }
}

/// Handle to a running room actor. Used to send commands to it.
///
/// Cheap to clone: it's an `mpsc::Sender` wrapper. Every call fails with
/// [`RoomError::Unavailable`] once the actor has stopped.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    game_type: GameType,
    sender: mpsc::Sender<RoomCommand>,
}

impl std::fmt::Debug for RoomCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RoomCommand::Join { .. } => "Join",
            RoomCommand::Spectate { .. } => "Spectate",
            RoomCommand::Reconnect { .. } => "Reconnect",
            RoomCommand::Leave { .. } => "Leave",
            RoomCommand::Disconnect { .. } => "Disconnect",
            RoomCommand::Unspectate { .. } => "Unspectate",
            RoomCommand::Action { .. } => "Action",
            RoomCommand::Kick { .. } => "Kick",
            RoomCommand::Info { .. } => "Info",
            RoomCommand::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn game_type(&self) -> GameType {
        self.game_type
    }

    /// `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn send(&self, command: RoomCommand) -> Result<(), RoomError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(command(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    /// Seats a player. Returns their seat index.
    pub async fn join(&self, client: ClientHandle, name: String) -> Result<usize, RoomError> {
        self.request(|reply| RoomCommand::Join {
            client,
            name,
            reply,
        })
        .await?
    }

    /// Adds a spectator; the room answers them with a snapshot.
    pub async fn spectate(&self, client: ClientHandle) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Spectate { client, reply })
            .await
    }

    /// Hands the held seat named `name` to a new connection.
    pub async fn reconnect(&self, client: ClientHandle, name: String) -> Result<usize, RoomError> {
        self.request(|reply| RoomCommand::Reconnect {
            client,
            name,
            reply,
        })
        .await?
    }

    /// Removes a player immediately. Resolves once the room has applied it.
    pub async fn leave(&self, player: PlayerId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Leave { player, reply })
            .await
    }

    /// Reports a dropped connection (fire-and-forget).
    pub async fn disconnect(&self, player: PlayerId) -> Result<(), RoomError> {
        self.send(RoomCommand::Disconnect { player }).await
    }

    pub async fn unspectate(&self, player: PlayerId) -> Result<(), RoomError> {
        self.send(RoomCommand::Unspectate { player }).await
    }

    /// Delivers a game action (fire-and-forget). Rejections reach the
    /// player as `error` messages.
    pub async fn action(&self, sender: PlayerId, action: GameAction) -> Result<(), RoomError> {
        self.send(RoomCommand::Action { sender, action }).await
    }

    pub async fn kick(&self, requester: PlayerId, target: usize) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Kick {
            requester,
            target,
            reply,
        })
        .await?
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::Info { reply }).await
    }

    /// Tells the room to stop without waiting on its queue. A room whose
    /// queue is full gets the command from a background task once there
    /// is room.
    pub fn shutdown(&self) -> Result<(), RoomError> {
        match self.sender.try_send(RoomCommand::Shutdown) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(command)) => {
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    let _ = sender.send(command).await;
                });
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(RoomError::Unavailable(self.room_id)),
        }
    }

    /// A handle over a queue nobody reads, for rooms that never answer.
    #[cfg(test)]
    pub(crate) fn stalled(
        room_id: RoomId,
        game_type: GameType,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<RoomCommand>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = Self {
            room_id,
            game_type,
            sender,
        };
        (handle, receiver)
    }

    /// Queues a command without waiting, for filling a stalled queue.
    #[cfg(test)]
    pub(crate) fn try_unspectate(&self, player: PlayerId) -> bool {
        self.sender
            .try_send(RoomCommand::Unspectate { player })
            .is_ok()
    }
}

/// The internal actor state. Runs inside a Tokio task.
struct RoomActor<G: GameRoom> {
    game: G,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl<G: GameRoom> RoomActor<G> {
    /// Runs until the room dissolves, is shut down, or every handle is
    /// dropped.
    async fn run(mut self) {
        let room_id = self.game.session().room_id();
        let game_type = self.game.session().game_type();
        tracing::info!(%room_id, %game_type, "room actor started");

        loop {
            tokio::select! {
                command = self.receiver.recv() => {
                    let Some(command) = command else {
                        tracing::debug!(%room_id, "all room handles dropped");
                        break;
                    };
                    if !self.handle(command) {
                        break;
                    }
                }
                key = self.game.session_mut().timers_mut().wait_next() => {
                    self.game.fire_timer(key);
                }
            }
            if self.game.session().is_dissolved() {
                break;
            }
        }

        tracing::info!(%room_id, "room actor stopped");
    }

    /// Applies one command. Returns `false` to stop the actor.
    fn handle(&mut self, command: RoomCommand) -> bool {
        match command {
            RoomCommand::Join {
                client,
                name,
                reply,
            } => {
                let _ = reply.send(self.game.add_player(client, name));
            }
            RoomCommand::Spectate { client, reply } => {
                self.game.add_spectator(client);
                let _ = reply.send(());
            }
            RoomCommand::Reconnect {
                client,
                name,
                reply,
            } => {
                let _ = reply.send(self.game.reconnect_player(client, &name));
            }
            RoomCommand::Leave { player, reply } => {
                self.game.leave(player);
                let _ = reply.send(());
            }
            RoomCommand::Disconnect { player } => self.game.handle_disconnect(player),
            RoomCommand::Unspectate { player } => self.game.remove_spectator(player),
            RoomCommand::Action { sender, action } => {
                tracing::trace!(%sender, action = action.name(), "game action");
                self.game.handle_message(sender, action);
            }
            RoomCommand::Kick {
                requester,
                target,
                reply,
            } => {
                let _ = reply.send(self.game.kick_player(requester, target));
            }
            RoomCommand::Info { reply } => {
                let _ = reply.send(self.game.info());
            }
            RoomCommand::Shutdown => {
                tracing::info!(room_id = %self.game.session().room_id(), "room shutting down");
                self.game.session_mut().shutdown();
                return false;
            }
        }
        true
    }
}

fn spawn_actor<G: GameRoom>(
    room_id: RoomId,
    settings: RoomSettings,
    rng: Box<dyn Randomness>,
    on_dissolve: Option<DissolveHook>,
    receiver: mpsc::Receiver<RoomCommand>,
) {
    let mut session = RoomSession::<G::Seat>::new(room_id, settings, rng);
    if let Some(hook) = on_dissolve {
        session.set_dissolve_hook(hook);
    }
    let actor = RoomActor {
        game: G::create(session),
        receiver,
    };
    tokio::spawn(actor.run());
}

/// Spawns a room actor for `settings.game_type` and returns a handle to it.
///
/// `on_dissolve` runs inside the actor when the room dissolves itself.
/// `channel_size` bounds the command queue; senders wait when it is full.
pub fn spawn_room(
    room_id: RoomId,
    settings: RoomSettings,
    rng: Box<dyn Randomness>,
    on_dissolve: Option<DissolveHook>,
    channel_size: usize,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size.max(1));
    let game_type = settings.game_type;
    let spawn = match game_type {
        GameType::NumberDuel => spawn_actor::<NumberDuel>,
        GameType::BluffCard => spawn_actor::<BluffCard>,
        GameType::HiddenCount => spawn_actor::<HiddenCount>,
        GameType::SpeedMatch => spawn_actor::<SpeedMatch>,
        GameType::BoardCapture => spawn_actor::<BoardCapture>,
    };
    spawn(room_id, settings, rng, on_dissolve, rx);
    RoomHandle {
        room_id,
        game_type,
        sender: tx,
    }
}
