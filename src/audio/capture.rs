use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::backend::{CaptureBackend, CaptureConstraints, ClipFormat};
use super::clip::{Clip, UtteranceBuffer};
use crate::error::{Result, VoiceError};

/// Records one clip per utterance from a capture backend
pub struct AudioCapture {
    backend: Box<dyn CaptureBackend>,
    constraints: CaptureConstraints,
    /// Upper bound on waiting for trailing fragments after stop
    drain_timeout: Duration,
    active: Option<ActiveCapture>,
}

struct ActiveCapture {
    format: ClipFormat,
    /// None once the backend has closed its fragment stream
    fragments: Option<mpsc::Receiver<Vec<u8>>>,
    buffer: UtteranceBuffer,
}

impl AudioCapture {
    pub fn new(
        backend: Box<dyn CaptureBackend>,
        constraints: CaptureConstraints,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            constraints,
            drain_timeout,
            active: None,
        }
    }

    pub fn constraints(&self) -> &CaptureConstraints {
        &self.constraints
    }

    pub fn is_capturing(&self) -> bool {
        self.active.is_some()
    }

    /// Format of the clip being recorded
    pub fn format(&self) -> Option<ClipFormat> {
        self.active.as_ref().map(|a| a.format)
    }

    /// Bytes buffered so far in the current cycle
    pub fn buffered_bytes(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.buffer.byte_len())
    }

    /// Start a recording cycle
    ///
    /// On failure the backend is stopped before the error is returned, so
    /// a half-opened device is never left behind.
    pub async fn start(&mut self) -> Result<ClipFormat> {
        if let Some(active) = &self.active {
            warn!("Capture already active");
            return Ok(active.format);
        }

        let format = self
            .constraints
            .negotiate(self.backend.as_ref())
            .map_err(VoiceError::capture)?;

        info!(
            "Starting capture on {} ({}Hz, {} channels, {})",
            self.backend.name(),
            self.constraints.sample_rate,
            self.constraints.channels,
            format
        );

        match self.backend.start(&self.constraints, format).await {
            Ok(fragments) => {
                self.active = Some(ActiveCapture {
                    format,
                    fragments: Some(fragments),
                    buffer: UtteranceBuffer::new(),
                });
                Ok(format)
            }
            Err(e) => {
                if let Err(stop_err) = self.backend.stop().await {
                    warn!("Failed to release {} after start error: {:#}", self.backend.name(), stop_err);
                }
                Err(VoiceError::capture(e.context("Failed to start audio capture")))
            }
        }
    }

    /// Wait for the next fragment of the current cycle
    ///
    /// Pending forever when idle or once the fragment stream has ended, so it
    /// can sit in a `select!` next to other event sources. Cancel-safe.
    pub async fn next_fragment(&mut self) -> Vec<u8> {
        if let Some(active) = self.active.as_mut() {
            if let Some(fragments) = active.fragments.as_mut() {
                match fragments.recv().await {
                    Some(fragment) => return fragment,
                    None => {
                        debug!("Capture fragment stream ended");
                        active.fragments = None;
                    }
                }
            }
        }

        std::future::pending().await
    }

    /// Buffer a fragment returned by `next_fragment`
    pub fn absorb(&mut self, fragment: Vec<u8>) {
        match self.active.as_mut() {
            Some(active) => active.buffer.push(fragment),
            None => debug!("Dropping {} byte fragment received after capture stopped", fragment.len()),
        }
    }

    /// Finish the recording cycle
    ///
    /// The backend is always stopped, even when stopping reports an error.
    /// Remaining fragments are drained and concatenated in arrival order.
    /// Returns `None` when no cycle is active.
    pub async fn stop(&mut self) -> Option<Clip> {
        let Some(mut active) = self.active.take() else {
            debug!("Capture not active; nothing to stop");
            return None;
        };

        if let Err(e) = self.backend.stop().await {
            warn!("Capture backend {} failed to stop cleanly: {:#}", self.backend.name(), e);
        }

        if let Some(mut fragments) = active.fragments.take() {
            let buffer = &mut active.buffer;
            let drain = async {
                while let Some(fragment) = fragments.recv().await {
                    buffer.push(fragment);
                }
            };

            if tokio::time::timeout(self.drain_timeout, drain).await.is_err() {
                warn!(
                    "Timed out after {:?} waiting for trailing fragments from {}",
                    self.drain_timeout,
                    self.backend.name()
                );
            }
        }

        let clip = active.buffer.finish(active.format);

        info!(
            "Capture stopped: {} bytes in {} fragments ({})",
            clip.len(),
            clip.fragment_count,
            clip.format
        );

        Some(clip)
    }
}
