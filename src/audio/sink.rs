use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::convert::{encode_wav, f32_to_i16, AudioFrame};
use super::decode::DecodedAudio;

/// Where reply audio goes
///
/// Implementations:
/// - `WavDumpSink`: writes each reply to disk (headless use)
/// - `SpeakerSink`: default output device via cpal (`device-audio` feature)
#[async_trait::async_trait]
pub trait AudioSink: Send + Sync {
    /// Play `audio` from its first sample until it ends
    ///
    /// Dropping the returned future must stop output and release the device.
    async fn play(&self, audio: DecodedAudio) -> Result<()>;

    /// Sink name for logging
    fn name(&self) -> &str;
}

/// Which sink to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    WavDump,
    Speaker,
}

/// Build the configured sink
pub fn create_sink(kind: SinkKind, output_dir: &Path) -> Result<Arc<dyn AudioSink>> {
    match kind {
        SinkKind::WavDump => Ok(Arc::new(WavDumpSink::new(output_dir)?)),
        SinkKind::Speaker => {
            #[cfg(feature = "device-audio")]
            {
                Ok(Arc::new(SpeakerSink::new()))
            }

            #[cfg(not(feature = "device-audio"))]
            {
                anyhow::bail!("Speaker playback requires the `device-audio` feature")
            }
        }
    }
}

/// Writes every reply as `reply-NNN.wav` into a directory
pub struct WavDumpSink {
    output_dir: PathBuf,
    written: AtomicUsize,
}

impl WavDumpSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create reply directory: {}", output_dir.display()))?;

        Ok(Self {
            output_dir,
            written: AtomicUsize::new(0),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait::async_trait]
impl AudioSink for WavDumpSink {
    async fn play(&self, audio: DecodedAudio) -> Result<()> {
        let index = self.written.fetch_add(1, Ordering::SeqCst);
        let path = self.output_dir.join(format!("reply-{:03}.wav", index));

        let frame = AudioFrame {
            samples: audio.samples.iter().map(|&s| f32_to_i16(s)).collect(),
            sample_rate: audio.sample_rate,
            channels: audio.channels,
        };

        let target = path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let bytes = encode_wav(&frame)?;
            std::fs::write(&target, bytes)
                .with_context(|| format!("Failed to write reply audio: {}", target.display()))
        })
        .await
        .context("Reply writer panicked")??;

        info!(
            "Saved {:.1}s reply to {}",
            audio.duration_seconds(),
            path.display()
        );

        Ok(())
    }

    fn name(&self) -> &str {
        "wav dump"
    }
}

/// Extra wait after the last output buffer is queued
const DRAIN_MARGIN: Duration = Duration::from_millis(50);

/// One supported output layout: a channel count and its sample rate range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputRange {
    pub channels: u16,
    pub min_rate: u32,
    pub max_rate: u32,
}

/// Channel count and rate a reply is played at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPlan {
    pub channels: u16,
    pub sample_rate: u32,
}

/// Choose an output layout for a reply
///
/// Tries the reply's own channel count, then mono, then stereo. A layout
/// that covers the reply rate wins; otherwise the rate is clamped into the
/// first usable range and the reply gets resampled.
pub fn pick_output(reply_channels: u16, reply_rate: u32, ranges: &[OutputRange]) -> Option<OutputPlan> {
    let mut order = vec![reply_channels];
    for fallback in [1, 2] {
        if !order.contains(&fallback) {
            order.push(fallback);
        }
    }

    for &channels in &order {
        if let Some(range) = ranges
            .iter()
            .find(|r| r.channels == channels && r.min_rate <= reply_rate && reply_rate <= r.max_rate)
        {
            return Some(OutputPlan {
                channels: range.channels,
                sample_rate: reply_rate,
            });
        }
    }

    order.iter().find_map(|&channels| {
        ranges.iter().find(|r| r.channels == channels).map(|r| OutputPlan {
            channels,
            sample_rate: reply_rate.clamp(r.min_rate, r.max_rate),
        })
    })
}

/// How long one queued output buffer takes to play, plus a margin
pub fn drain_period(buffer_samples: usize, channels: u16, sample_rate: u32) -> Duration {
    if channels == 0 || sample_rate == 0 {
        return DRAIN_MARGIN;
    }
    let frames = buffer_samples / channels as usize;
    Duration::from_secs_f64(frames as f64 / sample_rate as f64) + DRAIN_MARGIN
}

#[cfg(feature = "device-audio")]
pub use speaker::SpeakerSink;

#[cfg(feature = "device-audio")]
mod speaker {
    // cpal streams are not Send: each reply plays on its own thread, which
    // exits (dropping the stream) when the audio ends or the future is dropped.

    use anyhow::{anyhow, Context, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleRate, StreamConfig};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio::sync::oneshot;
    use tracing::{debug, error};

    use super::{drain_period, pick_output, AudioSink, OutputRange};
    use crate::audio::convert::{remix_f32, resample_f32};
    use crate::audio::decode::DecodedAudio;

    const POLL_INTERVAL: Duration = Duration::from_millis(20);

    /// Default output device
    #[derive(Default)]
    pub struct SpeakerSink;

    impl SpeakerSink {
        pub fn new() -> Self {
            Self
        }
    }

    /// Stops the playback thread when the play future goes away
    struct StopOnDrop(Arc<AtomicBool>);

    impl Drop for StopOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl AudioSink for SpeakerSink {
        async fn play(&self, audio: DecodedAudio) -> Result<()> {
            let stop = Arc::new(AtomicBool::new(false));
            let _guard = StopOnDrop(Arc::clone(&stop));
            let (done_tx, done_rx) = oneshot::channel();

            std::thread::Builder::new()
                .name("speaker".to_string())
                .spawn(move || {
                    let _ = done_tx.send(play_blocking(audio, stop));
                })
                .context("Failed to spawn speaker thread")?;

            done_rx
                .await
                .map_err(|_| anyhow!("Speaker thread exited unexpectedly"))?
        }

        fn name(&self) -> &str {
            "speaker"
        }
    }

    fn play_blocking(audio: DecodedAudio, stop: Arc<AtomicBool>) -> Result<()> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No output device available"))?;

        let configs: Vec<_> = device
            .supported_output_configs()
            .context("Failed to query output device")?
            .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
            .collect();
        let ranges: Vec<OutputRange> = configs
            .iter()
            .map(|c| OutputRange {
                channels: c.channels(),
                min_rate: c.min_sample_rate().0,
                max_rate: c.max_sample_rate().0,
            })
            .collect();

        let plan = pick_output(audio.channels, audio.sample_rate, &ranges).ok_or_else(|| {
            anyhow!(
                "No mono or stereo f32 output config for {}Hz, {} channels",
                audio.sample_rate,
                audio.channels
            )
        })?;
        let supported = configs
            .into_iter()
            .find(|c| {
                c.channels() == plan.channels
                    && c.min_sample_rate().0 <= plan.sample_rate
                    && c.max_sample_rate().0 >= plan.sample_rate
            })
            .ok_or_else(|| anyhow!("Output config disappeared"))?;
        let config: StreamConfig = supported
            .with_sample_rate(SampleRate(plan.sample_rate))
            .config();

        let samples = if plan.sample_rate != audio.sample_rate {
            debug!(
                "Resampling reply {}Hz -> {}Hz for output",
                audio.sample_rate, plan.sample_rate
            );
            resample_f32(&audio.samples, audio.channels, audio.sample_rate, plan.sample_rate)?
        } else {
            audio.samples
        };
        let samples = remix_f32(&samples, audio.channels, plan.channels);

        let total = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let buffer_len = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(total == 0));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let buffer_len = Arc::clone(&buffer_len);
            let finished = Arc::clone(&finished);
            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        buffer_len.store(data.len(), Ordering::SeqCst);
                        let start = position.load(Ordering::SeqCst);
                        for (i, out) in data.iter_mut().enumerate() {
                            *out = samples.get(start + i).copied().unwrap_or(0.0);
                        }
                        let end = (start + data.len()).min(samples.len());
                        position.store(end, Ordering::SeqCst);
                        if end >= samples.len() {
                            finished.store(true, Ordering::SeqCst);
                        }
                    },
                    |err: cpal::StreamError| error!("Output stream error: {}", err),
                    None,
                )
                .context("Failed to build output stream")?
        };

        stream.play().context("Failed to start output stream")?;
        debug!(
            "Playing {} samples at {}Hz on {} channel(s)",
            total, plan.sample_rate, plan.channels
        );

        while !stop.load(Ordering::SeqCst) && !finished.load(Ordering::SeqCst) {
            std::thread::sleep(POLL_INTERVAL);
        }

        // The last callback only queued its buffer; let the device play it out
        let tail = drain_period(
            buffer_len.load(Ordering::SeqCst),
            plan.channels,
            plan.sample_rate,
        );
        let deadline = Instant::now() + tail;
        while !stop.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
        }

        if stop.load(Ordering::SeqCst) {
            debug!("Playback interrupted");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wav_dump_writes_numbered_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sink = WavDumpSink::new(dir.path().join("replies"))?;

        let audio = DecodedAudio {
            samples: vec![0.0, 0.25, -0.25, 0.0],
            sample_rate: 24000,
            channels: 1,
        };
        sink.play(audio.clone()).await?;
        sink.play(audio).await?;

        let first = sink.output_dir().join("reply-000.wav");
        let second = sink.output_dir().join("reply-001.wav");
        assert!(first.exists());
        assert!(second.exists());

        let reader = hound::WavReader::open(&first)?;
        assert_eq!(reader.spec().sample_rate, 24000);
        assert_eq!(reader.len(), 4);

        Ok(())
    }

    #[cfg(not(feature = "device-audio"))]
    #[test]
    fn test_speaker_requires_feature() {
        let dir = std::env::temp_dir();
        assert!(create_sink(SinkKind::Speaker, &dir).is_err());
    }

    const STEREO_ONLY: [OutputRange; 1] = [OutputRange {
        channels: 2,
        min_rate: 44100,
        max_rate: 48000,
    }];

    #[test]
    fn test_mono_reply_on_stereo_only_device() {
        let plan = pick_output(1, 48000, &STEREO_ONLY).expect("stereo fallback");
        assert_eq!(
            plan,
            OutputPlan {
                channels: 2,
                sample_rate: 48000
            }
        );
    }

    #[test]
    fn test_unsupported_rate_is_clamped_for_resampling() {
        // 24 kHz TTS reply on a 44.1-48 kHz device
        let plan = pick_output(1, 24000, &STEREO_ONLY).expect("clamped rate");
        assert_eq!(plan.channels, 2);
        assert_eq!(plan.sample_rate, 44100);
    }

    #[test]
    fn test_mono_preferred_over_stereo() {
        let ranges = [
            OutputRange {
                channels: 2,
                min_rate: 8000,
                max_rate: 96000,
            },
            OutputRange {
                channels: 1,
                min_rate: 8000,
                max_rate: 96000,
            },
        ];
        let plan = pick_output(6, 24000, &ranges).expect("mono");
        assert_eq!(plan.channels, 1);
        assert_eq!(plan.sample_rate, 24000);

        // A layout covering the rate beats one that would need resampling
        let ranges = [
            OutputRange {
                channels: 1,
                min_rate: 48000,
                max_rate: 48000,
            },
            OutputRange {
                channels: 2,
                min_rate: 8000,
                max_rate: 48000,
            },
        ];
        assert_eq!(pick_output(1, 24000, &ranges).map(|p| p.channels), Some(2));
    }

    #[test]
    fn test_no_usable_layout() {
        let surround = [OutputRange {
            channels: 6,
            min_rate: 48000,
            max_rate: 48000,
        }];
        assert!(pick_output(1, 24000, &surround).is_none());
        assert!(pick_output(1, 24000, &[]).is_none());
    }

    #[test]
    fn test_drain_period_covers_last_buffer() {
        // 1024 stereo samples at 48 kHz is 512 frames, about 10.7ms
        let wait = drain_period(1024, 2, 48000);
        assert!(wait >= Duration::from_micros(10_666) + DRAIN_MARGIN);
        assert!(wait < Duration::from_millis(12) + DRAIN_MARGIN);

        assert_eq!(drain_period(0, 2, 48000), DRAIN_MARGIN);
        assert_eq!(drain_period(1024, 0, 0), DRAIN_MARGIN);
    }

    #[test]
    fn test_sink_kind_deserializes_snake_case() {
        let kind: SinkKind = serde_json::from_str("\"wav_dump\"").unwrap();
        assert_eq!(kind, SinkKind::WavDump);
    }
}
