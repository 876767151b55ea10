use tokio::sync::mpsc;

use super::messages::OutboundMessage;
use crate::error::Result;

/// Something that happened on the channel
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One raw text frame, in arrival order
    Frame(String),
    /// The peer closed the channel or the socket failed
    Closed { reason: Option<String> },
}

/// Persistent duplex connection to the voice endpoint
///
/// Implementations:
/// - `WebSocketTransport`: JSON text frames over a WebSocket
/// - test doubles driven from an in-memory channel
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Open the channel
    ///
    /// Returns the receiver on which every inbound frame is delivered,
    /// followed by at most one `Closed` event. Never retries on failure.
    async fn connect(&mut self) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Send one message
    ///
    /// Fails with a transmission error when not connected.
    async fn send(&mut self, message: &OutboundMessage) -> Result<()>;

    /// Close the channel. Safe to call when already closed.
    async fn close(&mut self) -> Result<()>;

    /// Whether the channel is currently open
    fn is_connected(&self) -> bool;

    /// Transport name for logging
    fn name(&self) -> &str;
}
