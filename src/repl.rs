//! Line-oriented terminal binding for a session
//!
//! Slash commands drive the session; any other line is sent as text.
//! Transcript entries and errors are printed as the view-state changes.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::debug;

use crate::session::{Role, SessionHandle, SessionSnapshot};

const HELP: &str = "\
/connect     open the channel
/disconnect  close the session
/rec         start recording
/stop        stop recording and send the clip
/mute        stop the reply being played
/status      show the session phase
/help        show this help
/quit        disconnect and exit
anything else is sent as a text message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Connect,
    Disconnect,
    Record,
    Stop,
    Mute,
    Status,
    Help,
    Quit,
    Say(String),
    Unknown(String),
}

/// Parse one input line; blank lines yield `None`
pub fn parse_line(line: &str) -> Option<ReplCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let command = match line {
        "/connect" => ReplCommand::Connect,
        "/disconnect" => ReplCommand::Disconnect,
        "/rec" | "/record" => ReplCommand::Record,
        "/stop" => ReplCommand::Stop,
        "/mute" => ReplCommand::Mute,
        "/status" => ReplCommand::Status,
        "/help" => ReplCommand::Help,
        "/quit" | "/exit" => ReplCommand::Quit,
        other if other.starts_with('/') => ReplCommand::Unknown(other.to_string()),
        text => ReplCommand::Say(text.to_string()),
    };
    Some(command)
}

/// Run the REPL on stdin until `/quit` or end of input
pub async fn run(handle: SessionHandle) -> Result<()> {
    let printer = tokio::spawn(print_updates(handle.subscribe()));

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let Some(command) = parse_line(&line) else {
            continue;
        };
        debug!("REPL command: {:?}", command);

        let result = match command {
            ReplCommand::Connect => handle.connect().await,
            ReplCommand::Disconnect => handle.disconnect().await,
            ReplCommand::Record => handle.start_recording().await,
            ReplCommand::Stop => handle.stop_recording().await,
            ReplCommand::Mute => handle.stop_playback().await,
            ReplCommand::Say(text) => handle.send_text(text).await,
            ReplCommand::Status => {
                let snapshot = handle.snapshot();
                println!(
                    "[{}] {} messages, {} clips sent{}",
                    snapshot.phase,
                    snapshot.messages.len(),
                    snapshot.stats.clips_sent,
                    if snapshot.playing { ", playing" } else { "" }
                );
                Ok(())
            }
            ReplCommand::Help => {
                println!("{}", HELP);
                Ok(())
            }
            ReplCommand::Unknown(other) => {
                println!("Unknown command {} (try /help)", other);
                Ok(())
            }
            ReplCommand::Quit => break,
        };

        if let Err(e) = result {
            println!("! {}", e);
        }
    }

    handle.shutdown().await;
    printer.abort();
    Ok(())
}

async fn print_updates(mut updates: watch::Receiver<SessionSnapshot>) {
    let mut printed = 0;
    let mut last_error = None;
    let mut last_interim = None;

    while updates.changed().await.is_ok() {
        let snapshot = updates.borrow_and_update().clone();

        for message in snapshot.messages.iter().skip(printed) {
            let who = match message.role {
                Role::User => "you",
                Role::Assistant => "assistant",
            };
            println!("{}> {}", who, message.content);
        }
        printed = snapshot.messages.len();

        if snapshot.interim_transcript.is_some() && snapshot.interim_transcript != last_interim {
            println!("  ... {}", snapshot.interim_transcript.as_deref().unwrap_or_default());
        }
        last_interim = snapshot.interim_transcript;

        if let Some(err) = &snapshot.last_error {
            if last_error.as_ref() != Some(&err.at) {
                println!("! {}", err.message);
                last_error = Some(err.at);
            }
        }
    }
}
