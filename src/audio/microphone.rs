// Microphone capture via cpal
//
// cpal streams are not Send, so each recording cycle owns a dedicated thread
// that opens the default input device, accumulates samples until told to
// stop, then conforms them to the requested rate/channels and emits the
// whole utterance as a single WAV fragment.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{CaptureBackend, CaptureConstraints, ClipFormat};
use super::convert::{conform, encode_wav, f32_to_i16, AudioFrame};

/// Default input device backend
pub struct MicrophoneBackend {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneBackend {
    pub fn new() -> Self {
        Self {
            stop_tx: None,
            thread: None,
        }
    }
}

impl Default for MicrophoneBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MicrophoneBackend {
    async fn start(
        &mut self,
        constraints: &CaptureConstraints,
        format: ClipFormat,
    ) -> Result<mpsc::Receiver<Vec<u8>>> {
        if self.stop_tx.is_some() {
            bail!("Already capturing");
        }
        if format != ClipFormat::Wav {
            bail!("Microphone backend only produces {}", ClipFormat::Wav);
        }

        if constraints.noise_suppression || constraints.echo_cancellation {
            debug!("Noise suppression and echo cancellation are not available through cpal; ignoring");
        }

        let (fragment_tx, fragment_rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let target = constraints.clone();

        let thread = std::thread::Builder::new()
            .name("microphone".to_string())
            .spawn(move || run_capture(target, fragment_tx, stop_rx, ready_tx))
            .context("Failed to spawn microphone thread")?;

        match ready_rx.await {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                self.thread = Some(thread);
                info!("Microphone capture started");
                Ok(fragment_rx)
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                bail!("Microphone thread exited before starting")
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            info!("Stopping microphone capture");
            // A closed channel means the thread already ended; both are fine
            let _ = stop_tx.send(());
        }
        // The thread finishes encoding and closes the fragment stream itself
        self.thread.take();
        Ok(())
    }

    fn supports(&self, format: ClipFormat) -> bool {
        format == ClipFormat::Wav
    }

    fn is_capturing(&self) -> bool {
        self.stop_tx.is_some()
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

fn run_capture(
    target: CaptureConstraints,
    fragments: mpsc::Sender<Vec<u8>>,
    stop_rx: std_mpsc::Receiver<()>,
    ready: oneshot::Sender<Result<()>>,
) {
    let samples = Arc::new(Mutex::new(Vec::<i16>::new()));

    let (stream, device_rate, device_channels) = match open_input(Arc::clone(&samples)) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(anyhow!("Failed to start input stream: {}", e)));
        return;
    }

    let _ = ready.send(Ok(()));

    // Blocks until stop() or until the backend is dropped
    let _ = stop_rx.recv();
    drop(stream);

    let captured = match samples.lock() {
        Ok(mut guard) => std::mem::take(&mut *guard),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    };

    let frame = match conform(
        AudioFrame {
            samples: captured,
            sample_rate: device_rate,
            channels: device_channels,
        },
        target.sample_rate,
        target.channels,
    ) {
        Ok(frame) => frame,
        Err(e) => {
            error!("Failed to convert microphone recording: {:#}", e);
            return;
        }
    };

    if frame.samples.is_empty() {
        warn!("Microphone produced no samples");
        return;
    }

    match encode_wav(&frame) {
        Ok(bytes) => {
            debug!(
                "Encoded {} samples ({}Hz, {}ch) into {} bytes",
                frame.samples.len(),
                frame.sample_rate,
                frame.channels,
                bytes.len()
            );
            if fragments.blocking_send(bytes).is_err() {
                warn!("Capture ended before the recording could be delivered");
            }
        }
        Err(e) => error!("Failed to encode microphone recording: {:#}", e),
    }
}

fn open_input(samples: Arc<Mutex<Vec<i16>>>) -> Result<(Stream, u32, u16)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    let supported = device
        .default_input_config()
        .context("Failed to query input device configuration")?;
    let sample_format = supported.sample_format();
    let config = supported.config();
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;

    debug!(
        "Input device {} ({}Hz, {} channels, {:?})",
        device.name().unwrap_or_default(),
        sample_rate,
        channels,
        sample_format
    );

    let on_error = |err: cpal::StreamError| error!("Input stream error: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buffer) = samples.lock() {
                    buffer.extend(data.iter().map(|&s| f32_to_i16(s)));
                }
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buffer) = samples.lock() {
                    buffer.extend_from_slice(data);
                }
            },
            on_error,
            None,
        ),
        other => bail!("Unsupported input sample format: {:?}", other),
    }
    .context("Failed to build input stream")?;

    Ok((stream, sample_rate, channels))
}
