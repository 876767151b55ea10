use anyhow::{bail, Context, Result};
use hound::WavReader;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::{CaptureBackend, CaptureConstraints, ClipFormat};

/// Basic facts about a WAV recording
#[derive(Debug, Clone, PartialEq)]
pub struct WavInfo {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_count: u32,
}

/// Validate WAV bytes and read their header
pub fn inspect_wav(bytes: &[u8]) -> Result<WavInfo> {
    let reader = WavReader::new(Cursor::new(bytes)).context("Not a valid WAV file")?;
    let spec = reader.spec();
    let sample_count = reader.len();

    let duration_seconds = if spec.sample_rate == 0 || spec.channels == 0 {
        0.0
    } else {
        sample_count as f64 / (spec.sample_rate as f64 * spec.channels as f64)
    };

    Ok(WavInfo {
        duration_seconds,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        sample_count,
    })
}

/// Capture backend that replays a WAV file as a stream of fragments
///
/// Stands in for a microphone in tests and on machines without one. The
/// file is emitted verbatim, so the resulting clip is the file itself unless
/// the cycle is stopped early.
pub struct FileBackend {
    path: PathBuf,
    fragment_bytes: usize,
    stop_flag: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>, fragment_bytes: usize) -> Self {
        Self {
            path: path.into(),
            fragment_bytes: fragment_bytes.max(1),
            stop_flag: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FileBackend {
    async fn start(
        &mut self,
        constraints: &CaptureConstraints,
        format: ClipFormat,
    ) -> Result<mpsc::Receiver<Vec<u8>>> {
        if self.task.is_some() {
            bail!("Already capturing");
        }
        if format != ClipFormat::Wav {
            bail!("File backend only produces {}", ClipFormat::Wav);
        }

        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read audio file: {}", self.path.display()))?;
        let info = inspect_wav(&bytes)
            .with_context(|| format!("Failed to open audio file: {}", self.path.display()))?;

        info!(
            "Replaying {}: {:.1}s, {}Hz, {} channels",
            self.path.display(),
            info.duration_seconds,
            info.sample_rate,
            info.channels
        );

        if info.sample_rate != constraints.sample_rate || info.channels != constraints.channels {
            warn!(
                "Audio file is {}Hz/{}ch but {}Hz/{}ch was requested; sending as-is",
                info.sample_rate, info.channels, constraints.sample_rate, constraints.channels
            );
        }

        let (tx, rx) = mpsc::channel(32);
        let stop_flag = Arc::new(AtomicBool::new(false));
        self.stop_flag = Arc::clone(&stop_flag);
        let fragment_bytes = self.fragment_bytes;

        self.task = Some(tokio::spawn(async move {
            for fragment in bytes.chunks(fragment_bytes) {
                if stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                if tx.send(fragment.to_vec()).await.is_err() {
                    break;
                }
            }
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.stop_flag.store(true, Ordering::SeqCst);
        // The replay task exits on its own and closes the fragment stream
        self.task.take();
        Ok(())
    }

    fn supports(&self, format: ClipFormat) -> bool {
        format == ClipFormat::Wav
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "wav file"
    }
}
