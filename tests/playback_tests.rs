// Playback unit tests
//
// Reply clips are decoded with symphonia and handed to a recording sink
// that tracks which clips started, finished or were cut off.

mod common;

use anyhow::Result;
use common::{eventually, wav_bytes, RecordingSink};
use std::sync::Arc;
use std::time::Duration;
use voicedesk::audio::{AudioReply, PlaybackEvent, PlaybackOutcome, PlaybackUnit, WavDumpSink};

fn reply(samples: usize) -> AudioReply {
    AudioReply {
        bytes: wav_bytes(samples),
        format: Some("wav".to_string()),
    }
}

#[tokio::test]
async fn test_clip_plays_to_completion() -> Result<()> {
    let sink = RecordingSink::instant();
    let mut playback = PlaybackUnit::new(Arc::new(sink.clone()));

    let clip = playback.play(reply(160));
    assert!(playback.is_playing());
    assert_eq!(playback.current_clip(), Some(clip));

    let event = playback.next_event().await;
    assert_eq!(event.clip, clip);
    assert_eq!(playback.settle(event), Some(PlaybackOutcome::Finished));
    assert!(!playback.is_playing());
    assert_eq!(sink.finished(), vec![160]);

    Ok(())
}

#[tokio::test]
async fn test_new_clip_interrupts_current() -> Result<()> {
    let sink = RecordingSink::gated();
    let mut playback = PlaybackUnit::new(Arc::new(sink.clone()));

    let first = playback.play(reply(100));
    assert!(eventually(|| sink.started() == vec![100]).await);

    let second = playback.play(reply(200));
    assert_ne!(first, second);
    assert_eq!(playback.current_clip(), Some(second));

    assert!(eventually(|| sink.started() == vec![100, 200]).await);
    assert!(eventually(|| sink.interrupted() == vec![100]).await);

    // The first clip never resumes or finishes
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sink.finished().is_empty());
    assert_eq!(sink.started(), vec![100, 200]);
    assert!(playback.is_playing());

    Ok(())
}

#[tokio::test]
async fn test_stop_interrupts() -> Result<()> {
    let sink = RecordingSink::gated();
    let mut playback = PlaybackUnit::new(Arc::new(sink.clone()));

    playback.play(reply(100));
    assert!(eventually(|| sink.started().len() == 1).await);

    assert!(playback.stop());
    assert!(!playback.is_playing());
    assert!(eventually(|| sink.interrupted() == vec![100]).await);

    assert!(!playback.stop(), "nothing left to stop");

    Ok(())
}

#[tokio::test]
async fn test_stale_report_is_ignored() -> Result<()> {
    let sink = RecordingSink::gated();
    let mut playback = PlaybackUnit::new(Arc::new(sink.clone()));

    let first = playback.play(reply(100));
    let second = playback.play(reply(200));

    let stale = PlaybackEvent {
        clip: first,
        outcome: PlaybackOutcome::Finished,
    };
    assert_eq!(playback.settle(stale), None);
    assert!(playback.is_playing());
    assert_eq!(playback.current_clip(), Some(second));

    Ok(())
}

#[tokio::test]
async fn test_undecodable_reply_fails() -> Result<()> {
    let sink = RecordingSink::instant();
    let mut playback = PlaybackUnit::new(Arc::new(sink.clone()));

    let clip = playback.play(AudioReply {
        bytes: b"definitely not audio".to_vec(),
        format: None,
    });

    let event = playback.next_event().await;
    assert_eq!(event.clip, clip);
    match playback.settle(event) {
        Some(PlaybackOutcome::Failed(message)) => assert!(!message.is_empty()),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(sink.started().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_wav_dump_sink_writes_replies() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let sink = WavDumpSink::new(dir.path().join("replies"))?;
    let mut playback = PlaybackUnit::new(Arc::new(sink));

    playback.play(reply(320));
    let event = playback.next_event().await;
    assert_eq!(playback.settle(event), Some(PlaybackOutcome::Finished));

    let written: Vec<_> = std::fs::read_dir(dir.path().join("replies"))?.collect();
    assert_eq!(written.len(), 1);

    Ok(())
}
