use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::session::VoiceSession;
use super::state::SessionSnapshot;
use crate::error::{Result, VoiceError};

enum Command {
    Connect(oneshot::Sender<Result<()>>),
    Disconnect(oneshot::Sender<()>),
    StartRecording(oneshot::Sender<Result<()>>),
    StopRecording(oneshot::Sender<Result<()>>),
    SendText(String, oneshot::Sender<Result<()>>),
    StopPlayback(oneshot::Sender<()>),
    Shutdown,
}

/// Cloneable handle to a session running on its control task
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub async fn connect(&self) -> Result<()> {
        self.request(Command::Connect).await?
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.request(Command::Disconnect).await
    }

    pub async fn start_recording(&self) -> Result<()> {
        self.request(Command::StartRecording).await?
    }

    pub async fn stop_recording(&self) -> Result<()> {
        self.request(Command::StopRecording).await?
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.request(|reply| Command::SendText(text, reply)).await?
    }

    pub async fn stop_playback(&self) -> Result<()> {
        self.request(Command::StopPlayback).await
    }

    /// Latest published view-state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Watch view-state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Disconnect and stop the control task
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| VoiceError::SessionClosed)?;
        rx.await.map_err(|_| VoiceError::SessionClosed)
    }
}

/// Run `session` on its own task
///
/// The task ends when every handle is dropped or `shutdown` is called; the
/// session is disconnected on the way out.
pub fn spawn(session: VoiceSession) -> (SessionHandle, JoinHandle<()>) {
    let (commands, rx) = mpsc::channel(32);
    let snapshots = session.subscribe();

    let task = tokio::spawn(run(session, rx));

    (SessionHandle { commands, snapshots }, task)
}

async fn run(mut session: VoiceSession, mut commands: mpsc::Receiver<Command>) {
    info!("Session driver started for {}", session.session_id());

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("All session handles dropped");
                    break;
                };
                if !execute(&mut session, command).await {
                    break;
                }
            }
            event = session.next_event() => {
                session.handle_event(event).await;
            }
        }
    }

    session.disconnect().await;
    info!("Session driver stopped for {}", session.session_id());
}

/// Returns false when the driver should stop
async fn execute(session: &mut VoiceSession, command: Command) -> bool {
    match command {
        Command::Connect(reply) => {
            let _ = reply.send(session.connect().await);
        }
        Command::Disconnect(reply) => {
            session.disconnect().await;
            let _ = reply.send(());
        }
        Command::StartRecording(reply) => {
            let _ = reply.send(session.start_recording().await);
        }
        Command::StopRecording(reply) => {
            let _ = reply.send(session.stop_recording().await);
        }
        Command::SendText(text, reply) => {
            let _ = reply.send(session.send_text(&text).await);
        }
        Command::StopPlayback(reply) => {
            session.stop_playback();
            let _ = reply.send(());
        }
        Command::Shutdown => return false,
    }
    true
}
