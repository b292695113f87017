//! Room registry: creates, tracks, and evicts rooms.

use std::collections::HashMap;
use std::time::Duration;

use partyhall_protocol::{GameConfig, GameType, RoomId};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::actor::{RoomHandle, spawn_room};
use crate::config::{RegistryConfig, RoomSettings};
use crate::error::RoomError;
use crate::random::{Randomness, ThreadRandomness};
use crate::session::DissolveHook;

/// Every running room, keyed by its four-digit id.
///
/// This is the entry point for room operations from the connection
/// layer. The registry itself is not shared; the server keeps it behind
/// a lock and only ever calls these narrow operations on it.
///
/// Rooms that dissolve themselves report their id on the channel
/// returned by [`RoomRegistry::new`]; the owner feeds those back into
/// [`RoomRegistry::evict`].
pub struct RoomRegistry {
    rooms: HashMap<RoomId, RoomHandle>,
    config: RegistryConfig,
    dissolved: mpsc::UnboundedSender<RoomId>,
    rng: Box<dyn Randomness>,
}

impl std::fmt::Debug for RoomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomRegistry")
            .field("rooms", &self.rooms.len())
            .field("config", &self.config)
            .finish()
    }
}

impl RoomRegistry {
    /// Creates an empty registry and the receiver for dissolution notices.
    pub fn new(config: RegistryConfig) -> (Self, mpsc::UnboundedReceiver<RoomId>) {
        Self::with_randomness(config, Box::new(ThreadRandomness::new()))
    }

    /// Like [`RoomRegistry::new`] with a chosen source for room ids and
    /// every room's dice and shuffles.
    pub fn with_randomness(
        config: RegistryConfig,
        rng: Box<dyn Randomness>,
    ) -> (Self, mpsc::UnboundedReceiver<RoomId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Self {
            rooms: HashMap::new(),
            config,
            dissolved: tx,
            rng,
        };
        (registry, rx)
    }

    /// Creates a room of the named game under a random free id.
    ///
    /// # Errors
    /// [`RoomError::InvalidGameType`] for an unknown name,
    /// [`RoomError::NoFreeRoomId`] when every id is taken.
    pub fn create(&mut self, game_type: &str, config: &GameConfig) -> Result<RoomHandle, RoomError> {
        let game_type: GameType = game_type
            .parse()
            .map_err(|_| RoomError::InvalidGameType(game_type.to_string()))?;
        let room_id = self.free_id()?;
        self.create_at(room_id, game_type, config)
    }

    /// Creates a room under a chosen id.
    ///
    /// # Errors
    /// [`RoomError::AlreadyExists`] if a live room holds that id.
    pub fn create_at(
        &mut self,
        room_id: RoomId,
        game_type: GameType,
        config: &GameConfig,
    ) -> Result<RoomHandle, RoomError> {
        if self.get(room_id).is_some() {
            return Err(RoomError::AlreadyExists(room_id));
        }
        let settings =
            RoomSettings::resolve(game_type, config).with_timing(self.config.timing.clone());
        let seed = self.rng.below(usize::MAX) as u64;
        let dissolved = self.dissolved.clone();
        let on_dissolve: DissolveHook = Box::new(move |id: RoomId| {
            let _ = dissolved.send(id);
        });
        let handle = spawn_room(
            room_id,
            settings,
            Box::new(ThreadRandomness::seeded(seed)),
            Some(on_dissolve),
            self.config.command_buffer,
        );
        self.rooms.insert(room_id, handle.clone());
        tracing::info!(%room_id, %game_type, rooms = self.rooms.len(), "room created");
        Ok(handle)
    }

    /// Looks up a live room. A room whose actor has stopped is treated as
    /// absent.
    pub fn get(&self, room_id: RoomId) -> Option<RoomHandle> {
        self.rooms
            .get(&room_id)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    /// Removes a room and stops its actor. Evicting an absent id is a
    /// no-op; returns whether anything was removed.
    pub fn evict(&mut self, room_id: RoomId) -> bool {
        let Some(handle) = self.rooms.remove(&room_id) else {
            return false;
        };
        // A dissolved room has already stopped; the command just fails.
        let _ = handle.shutdown();
        tracing::info!(%room_id, rooms = self.rooms.len(), "room evicted");
        true
    }

    /// Takes what a sweep needs from the registry. The rooms are queried
    /// through [`Sweep::stale_rooms`] with no lock on the registry held;
    /// the owner then hands the result to [`RoomRegistry::evict_all`].
    pub fn begin_sweep(&self) -> Sweep {
        Sweep {
            handles: self.rooms.values().cloned().collect(),
            idle_grace: self.config.idle_grace,
            info_timeout: self.config.info_timeout,
        }
    }

    /// Evicts each id still registered. Returns those actually removed.
    pub fn evict_all(&mut self, stale: &[RoomId]) -> Vec<RoomId> {
        let evicted: Vec<RoomId> = stale
            .iter()
            .copied()
            .filter(|room_id| self.evict(*room_id))
            .collect();
        if !evicted.is_empty() {
            tracing::debug!(evicted = evicted.len(), rooms = self.rooms.len(), "room sweep");
        }
        evicted
    }

    /// Evicts every room that has stopped, plus every room older than the
    /// idle grace period with no players and no spectators. Returns the
    /// evicted ids.
    ///
    /// This holds `&mut self` across the queries; a registry shared
    /// behind a lock should use [`RoomRegistry::begin_sweep`] instead.
    pub async fn sweep(&mut self) -> Vec<RoomId> {
        let stale = self.begin_sweep().stale_rooms().await;
        self.evict_all(&stale)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().copied().collect()
    }

    /// A random id no live room holds.
    fn free_id(&mut self) -> Result<RoomId, RoomError> {
        let span = usize::from(RoomId::MAX - RoomId::MIN) + 1;
        let start = self.rng.below(span);
        (0..span)
            .map(|offset| u32::from(RoomId::MIN) + ((start + offset) % span) as u32)
            .filter_map(|value| RoomId::new(value).ok())
            .find(|id| self.get(*id).is_none())
            .ok_or(RoomError::NoFreeRoomId)
    }
}

/// The rooms one sweep looks at, detached from the registry.
#[derive(Debug)]
pub struct Sweep {
    handles: Vec<RoomHandle>,
    idle_grace: Duration,
    info_timeout: Duration,
}

impl Sweep {
    /// Asks every room for its info at once. Rooms that have stopped, and
    /// empty rooms past the idle grace, are stale. A room that does not
    /// answer within the info timeout is busy and is left alone.
    pub async fn stale_rooms(self) -> Vec<RoomId> {
        let Sweep {
            handles,
            idle_grace,
            info_timeout,
        } = self;
        let mut queries = JoinSet::new();
        for handle in handles {
            queries.spawn(async move {
                let answer = tokio::time::timeout(info_timeout, handle.info()).await;
                (handle.room_id(), answer)
            });
        }

        let mut stale = Vec::new();
        while let Some(joined) = queries.join_next().await {
            let Ok((room_id, answer)) = joined else {
                continue;
            };
            match answer {
                Ok(Ok(info)) if info.is_empty() && info.created_at.elapsed() >= idle_grace => {
                    stale.push(room_id);
                }
                Ok(Ok(_)) => {}
                Ok(Err(_)) => stale.push(room_id),
                Err(_) => tracing::warn!(%room_id, ?info_timeout, "room did not answer the sweep"),
            }
        }
        stale.sort_unstable();
        stale
    }
}
