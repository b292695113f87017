use std::io;
use std::net::SocketAddr;

use tokio_tungstenite::tungstenite;

/// Why a socket operation failed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listener, or reading back its address.
    #[error("listener error: {0}")]
    Listen(#[source] io::Error),

    #[error("could not accept a TCP connection: {0}")]
    Accept(#[source] io::Error),

    /// The TCP connection came in but never became a WebSocket.
    #[error("WebSocket handshake with {peer} failed: {source}")]
    Handshake {
        peer: SocketAddr,
        #[source]
        source: tungstenite::Error,
    },

    #[error("could not send a frame: {0}")]
    Send(#[source] tungstenite::Error),

    #[error("could not read a frame: {0}")]
    Receive(#[source] tungstenite::Error),
}
