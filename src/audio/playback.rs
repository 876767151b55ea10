use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::decode::decode_audio;
use super::sink::AudioSink;

/// Identifies one reply clip handed to the playback unit
pub type ClipId = u64;

/// Reply audio as received from the server
#[derive(Debug, Clone, PartialEq)]
pub struct AudioReply {
    pub bytes: Vec<u8>,
    /// Format tag or mime type, if the server sent one
    pub format: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    Finished,
    Failed(String),
}

/// Completion report from a playback task
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackEvent {
    pub clip: ClipId,
    pub outcome: PlaybackOutcome,
}

struct ActiveClip {
    id: ClipId,
    task: JoinHandle<()>,
}

/// Plays reply clips one at a time
///
/// Starting a clip retires the current one first: its task is aborted, which
/// drops the sink's play future and releases the output. A retired clip's
/// completion report is ignored by `settle`.
pub struct PlaybackUnit {
    sink: Arc<dyn AudioSink>,
    current: Option<ActiveClip>,
    next_clip: ClipId,
    events_tx: mpsc::UnboundedSender<PlaybackEvent>,
    events_rx: mpsc::UnboundedReceiver<PlaybackEvent>,
}

impl PlaybackUnit {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            sink,
            current: None,
            next_clip: 1,
            events_tx,
            events_rx,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_clip(&self) -> Option<ClipId> {
        self.current.as_ref().map(|c| c.id)
    }

    /// Start playing `reply`, interrupting whatever is playing
    pub fn play(&mut self, reply: AudioReply) -> ClipId {
        self.stop();

        let id = self.next_clip;
        self.next_clip += 1;

        let sink = Arc::clone(&self.sink);
        let events = self.events_tx.clone();

        info!(
            "Playing reply clip {} ({} bytes) on {}",
            id,
            reply.bytes.len(),
            sink.name()
        );

        let task = tokio::spawn(async move {
            let outcome = match play_reply(sink.as_ref(), reply).await {
                Ok(()) => PlaybackOutcome::Finished,
                Err(e) => PlaybackOutcome::Failed(format!("{:#}", e)),
            };
            let _ = events.send(PlaybackEvent { clip: id, outcome });
        });

        self.current = Some(ActiveClip { id, task });
        id
    }

    /// Interrupt the current clip; returns whether anything was playing
    pub fn stop(&mut self) -> bool {
        match self.current.take() {
            Some(active) => {
                active.task.abort();
                debug!("Interrupted reply clip {}", active.id);
                true
            }
            None => false,
        }
    }

    /// Wait for the next completion report. Cancel-safe.
    pub async fn next_event(&mut self) -> PlaybackEvent {
        match self.events_rx.recv().await {
            Some(event) => event,
            // The unit holds a sender, so the channel never closes
            None => std::future::pending().await,
        }
    }

    /// Apply a completion report
    ///
    /// Returns the outcome when it belongs to the current clip, which is then
    /// no longer playing; reports for retired clips yield `None`.
    pub fn settle(&mut self, event: PlaybackEvent) -> Option<PlaybackOutcome> {
        match &self.current {
            Some(active) if active.id == event.clip => {
                self.current = None;
                Some(event.outcome)
            }
            _ => {
                debug!("Ignoring report for retired reply clip {}", event.clip);
                None
            }
        }
    }
}

impl Drop for PlaybackUnit {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn play_reply(sink: &dyn AudioSink, reply: AudioReply) -> anyhow::Result<()> {
    let audio = tokio::task::spawn_blocking(move || {
        decode_audio(&reply.bytes, reply.format.as_deref())
    })
    .await??;

    sink.play(audio).await
}
