//! `PartyhallServer` builder, accept loop, and maintenance task.
//!
//! This is the entry point for running a Partyhall server. It ties the
//! layers together: transport → protocol → room registry → room actors.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use partyhall_protocol::{JsonCodec, PlayerId, RoomId};
use partyhall_room::{RegistryConfig, RoomRegistry, Timing};
use partyhall_transport::{Transport, WebSocketTransport};
use tokio::sync::{Mutex, mpsc};
use tokio::time::MissedTickBehavior;

use crate::PartyhallError;
use crate::handler::handle_connection;

/// Server-wide settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    /// How often the registry is swept for stopped and idle rooms.
    pub sweep_interval: Duration,
    /// Inbound messages one connection may send per `rate_window`.
    pub rate_limit: u32,
    pub rate_window: Duration,
    /// Settings handed to the room registry.
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            sweep_interval: Duration::from_secs(60),
            rate_limit: 10,
            rate_window: Duration::from_secs(1),
            registry: RegistryConfig::default(),
        }
    }
}

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The registry
/// sits behind a `Mutex`; rooms themselves are actors and need no lock.
pub(crate) struct ServerState {
    pub(crate) rooms: Mutex<RoomRegistry>,
    pub(crate) codec: JsonCodec,
    pub(crate) config: ServerConfig,
    next_player: AtomicU64,
}

impl ServerState {
    /// Hands out the ephemeral identity for a new connection.
    pub(crate) fn next_player_id(&self) -> PlayerId {
        PlayerId(self.next_player.fetch_add(1, Ordering::Relaxed))
    }
}

/// Builder for configuring and starting a Partyhall server.
///
/// # Example
///
/// ```rust,no_run
/// use partyhall::prelude::*;
///
/// # async fn start() -> Result<(), PartyhallError> {
/// let server = PartyhallServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct PartyhallServerBuilder {
    config: ServerConfig,
}

impl PartyhallServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Starts from an existing configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets how often idle rooms are swept.
    pub fn sweep_interval(mut self, every: Duration) -> Self {
        self.config.sweep_interval = every;
        self
    }

    /// Caps inbound messages per connection: at most `max` per `window`.
    pub fn rate_limit(mut self, max: u32, window: Duration) -> Self {
        self.config.rate_limit = max;
        self.config.rate_window = window;
        self
    }

    /// Sets the registry configuration (idle grace, channel sizes, timing).
    pub fn registry_config(mut self, registry: RegistryConfig) -> Self {
        self.config.registry = registry;
        self
    }

    /// Replaces the delay table every new room runs with.
    pub fn timing(mut self, timing: Timing) -> Self {
        self.config.registry.timing = timing;
        self
    }

    /// Binds the listener and builds the server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<PartyhallServer, PartyhallError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let (registry, dissolved) = RoomRegistry::new(self.config.registry.clone());

        let state = Arc::new(ServerState {
            rooms: Mutex::new(registry),
            codec: JsonCodec,
            config: self.config,
            next_player: AtomicU64::new(1),
        });

        Ok(PartyhallServer {
            transport,
            state,
            dissolved,
        })
    }
}

impl Default for PartyhallServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Partyhall server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct PartyhallServer {
    transport: WebSocketTransport,
    state: Arc<ServerState>,
    dissolved: mpsc::UnboundedReceiver<RoomId>,
}

impl PartyhallServer {
    /// Creates a new builder.
    pub fn builder() -> PartyhallServerBuilder {
        PartyhallServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, PartyhallError> {
        Ok(self.transport.local_addr()?)
    }

    /// Runs the server accept loop.
    ///
    /// Spawns the maintenance task, then accepts incoming connections and
    /// spawns a handler task for each. Runs until the process is
    /// terminated.
    pub async fn run(mut self) -> Result<(), PartyhallError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Partyhall server running");

        tokio::spawn(maintain(
            Arc::clone(&self.state),
            self.dissolved,
            self.state.config.sweep_interval,
        ));

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Evicts rooms as they dissolve and sweeps the registry periodically
/// for rooms that stopped or sat empty past the idle grace.
async fn maintain(
    state: Arc<ServerState>,
    mut dissolved: mpsc::UnboundedReceiver<RoomId>,
    every: Duration,
) {
    let mut sweep = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = sweep.tick() => {
                let evicted = sweep_rooms(&state).await;
                if !evicted.is_empty() {
                    tracing::info!(evicted = evicted.len(), "swept idle rooms");
                }
            }
            Some(room_id) = dissolved.recv() => {
                state.rooms.lock().await.evict(room_id);
            }
        }
    }
}

/// One sweep. The registry lock is held only to copy the room handles
/// and again to evict; the rooms are queried with it released.
async fn sweep_rooms(state: &ServerState) -> Vec<RoomId> {
    let sweep = state.rooms.lock().await.begin_sweep();
    let stale = sweep.stale_rooms().await;
    state.rooms.lock().await.evict_all(&stale)
}
