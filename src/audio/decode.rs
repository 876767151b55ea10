use anyhow::{anyhow, Context, Result};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Decoded reply audio, interleaved f32 samples in [-1, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Decode a synthesized-speech reply (MP3, WAV, OGG, ...)
///
/// `format_hint` is the server's format tag or a file extension, if any.
pub fn decode_audio(bytes: &[u8], format_hint: Option<&str>) -> Result<DecodedAudio> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = format_hint.map(hint_extension) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Unrecognized reply audio format")?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("Reply audio has no playable track"))?;
    let track_id = track.id;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Unsupported reply audio codec")?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("Failed to read reply audio"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable reply packet: {}", e);
            }
            Err(e) => return Err(e).context("Failed to decode reply audio"),
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(anyhow!("Reply audio contained no samples"));
    }

    let audio = DecodedAudio {
        samples,
        sample_rate,
        channels,
    };

    debug!(
        "Decoded reply audio: {:.2}s, {}Hz, {} channels",
        audio.duration_seconds(),
        audio.sample_rate,
        audio.channels
    );

    Ok(audio)
}

/// Map wire tags and mime types to the extension symphonia's probe expects
fn hint_extension(format: &str) -> &str {
    match format {
        "audio/mpeg" | "mpeg" => "mp3",
        "audio/wav" | "audio/x-wav" | "wave" => "wav",
        "audio/ogg" => "ogg",
        other => other,
    }
}
