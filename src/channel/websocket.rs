use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::messages::OutboundMessage;
use super::transport::{Transport, TransportEvent};
use crate::error::{Result, VoiceError};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Inbound frames buffered between the reader task and the session
const INBOUND_BUFFER: usize = 64;

/// WebSocket connection to the voice endpoint
pub struct WebSocketTransport {
    url: String,
    connect_timeout: Duration,
    writer: Option<WsSink>,
    reader_task: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
            writer: None,
            reader_task: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        if self.writer.is_some() {
            // Start from a clean channel; the old reader must not outlive it
            self.close().await?;
        }

        info!("Connecting to voice endpoint at {}", self.url);

        let (stream, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
                .await
                .map_err(|_| {
                    VoiceError::Connection(format!(
                        "Timed out after {:?} connecting to {}",
                        self.connect_timeout, self.url
                    ))
                })?
                .map_err(|e| {
                    VoiceError::Connection(format!("Failed to connect to {}: {}", self.url, e))
                })?;

        info!("Connected to voice endpoint");

        let (writer, mut reader) = stream.split();
        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        // Each connection gets its own flag so a stale reader cannot clear it
        let connected = Arc::new(AtomicBool::new(true));
        self.connected = Arc::clone(&connected);

        let reader_task = tokio::spawn(async move {
            let mut reason = None;

            while let Some(message) = reader.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if tx.send(TransportEvent::Frame(text)).await.is_err() {
                            // Session dropped the receiver; nobody is listening
                            connected.store(false, Ordering::SeqCst);
                            return;
                        }
                    }
                    Ok(Message::Binary(bytes)) => {
                        debug!("Ignoring binary frame ({} bytes)", bytes.len());
                    }
                    Ok(Message::Close(frame)) => {
                        reason = frame.map(|f| f.reason.to_string());
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        reason = Some(e.to_string());
                        break;
                    }
                }
            }

            connected.store(false, Ordering::SeqCst);
            info!(
                "Voice channel closed by peer ({})",
                reason.as_deref().unwrap_or("no reason")
            );
            let _ = tx.send(TransportEvent::Closed { reason }).await;
        });

        self.writer = Some(writer);
        self.reader_task = Some(reader_task);

        Ok(rx)
    }

    async fn send(&mut self, message: &OutboundMessage) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(VoiceError::Transmission(format!(
                "Cannot send {}: channel is not connected",
                message.tag()
            )));
        }

        let writer = self.writer.as_mut().ok_or_else(|| {
            VoiceError::Transmission(format!(
                "Cannot send {}: channel is not connected",
                message.tag()
            ))
        })?;

        let payload = serde_json::to_string(message).map_err(|e| {
            VoiceError::Transmission(format!("Failed to encode {}: {}", message.tag(), e))
        })?;
        let bytes = payload.len();

        writer.send(Message::Text(payload)).await.map_err(|e| {
            VoiceError::Transmission(format!("Failed to send {}: {}", message.tag(), e))
        })?;

        debug!("Sent {} ({} bytes)", message.tag(), bytes);

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut writer) = self.writer.take() {
            info!("Closing voice channel");
            if let Err(e) = writer.send(Message::Close(None)).await {
                debug!("Close frame not delivered: {}", e);
            }
            if let Err(e) = writer.close().await {
                warn!("Failed to close voice channel cleanly: {}", e);
            }
        }

        if let Some(task) = self.reader_task.take() {
            task.abort();
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_before_connect_is_transmission_error() {
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:9/chat", Duration::from_secs(1));

        let err = transport
            .send(&OutboundMessage::StopRecording)
            .await
            .unwrap_err();

        assert!(matches!(err, VoiceError::Transmission(_)));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        // Nothing listens on the discard port
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:9/chat", Duration::from_secs(2));

        let err = transport.connect().await.unwrap_err();

        assert!(matches!(err, VoiceError::Connection(_)));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_old_reader_cannot_clear_reconnected_flag() -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let server = tokio::spawn(async move {
            for _ in 0..2 {
                let (stream, _) = listener.accept().await?;
                let mut ws = tokio_tungstenite::accept_async(stream).await?;
                tokio::spawn(async move { while let Some(Ok(_)) = ws.next().await {} });
            }
            anyhow::Ok(())
        });

        let mut transport = WebSocketTransport::new(format!("ws://{}", addr), Duration::from_secs(5));
        let _first = transport.connect().await?;
        let old_flag = Arc::clone(&transport.connected);

        let _second = transport.connect().await?;
        assert!(!Arc::ptr_eq(&old_flag, &transport.connected));

        // The first reader finishing late only touches its own flag
        old_flag.store(false, Ordering::SeqCst);
        assert!(transport.is_connected());
        transport.send(&OutboundMessage::StopRecording).await?;

        transport.close().await?;
        assert!(!transport.is_connected());
        server.await??;

        Ok(())
    }

    #[tokio::test]
    async fn test_close_when_never_connected_is_ok() {
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:9/chat", Duration::from_secs(1));
        assert!(transport.close().await.is_ok());
    }
}
