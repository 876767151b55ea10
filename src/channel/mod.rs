pub mod messages;
pub mod transport;
pub mod websocket;

pub use messages::{InboundEvent, OutboundMessage};
pub use transport::{Transport, TransportEvent};
pub use websocket::WebSocketTransport;
