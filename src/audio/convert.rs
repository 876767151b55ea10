// PCM helpers shared by capture and playback
//
// Device audio rarely arrives in the shape the recognizer wants (16kHz mono),
// so captured frames are down-mixed and resampled before being wrapped in a
// WAV container. Replies get the reverse treatment to fit the output device.

use anyhow::{Context, Result};
use rubato::{FftFixedIn, Resampler};
use std::io::Cursor;

/// Input block size handed to the resampler
const RESAMPLE_CHUNK: usize = 1024;

/// Interleaved 16-bit PCM
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

/// Bring a frame to the target rate and channel count
pub fn conform(frame: AudioFrame, target_sample_rate: u32, target_channels: u16) -> Result<AudioFrame> {
    let mut processed = frame;

    if processed.channels != target_channels && target_channels == 1 {
        processed = to_mono(processed);
    }

    if processed.sample_rate != target_sample_rate {
        processed = resample(processed, target_sample_rate)?;
    }

    Ok(processed)
}

/// Resample a frame to `target_rate`, any ratio up or down
pub fn resample(frame: AudioFrame, target_rate: u32) -> Result<AudioFrame> {
    let samples: Vec<f32> = frame.samples.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
    let resampled = resample_f32(&samples, frame.channels, frame.sample_rate, target_rate)?;

    Ok(AudioFrame {
        samples: resampled.into_iter().map(f32_to_i16).collect(),
        sample_rate: if target_rate == 0 { frame.sample_rate } else { target_rate },
        channels: frame.channels,
    })
}

/// Resample interleaved f32 samples from `from_rate` to `to_rate`
///
/// The output holds `frames * to_rate / from_rate` frames, aligned with the
/// input (the resampler's delay is trimmed off).
pub fn resample_f32(samples: &[f32], channels: u16, from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let channels = channels.max(1) as usize;
    let frames = samples.len() / channels;
    let expected = (frames as u64 * to_rate as u64 / from_rate as u64) as usize;

    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (channel, &sample) in frame.iter().enumerate() {
            planar[channel].push(sample as f64);
        }
    }

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, RESAMPLE_CHUNK, 2, channels)
            .context("Failed to create resampler")?;
    let delay = resampler.output_delay();
    let wanted = delay + expected;

    let mut output = vec![Vec::with_capacity(wanted); channels];
    let mut position = 0;

    while position < frames {
        let end = (position + resampler.input_frames_next()).min(frames);
        let block: Vec<&[f64]> = planar.iter().map(|c| &c[position..end]).collect();

        let resampled = if end - position == resampler.input_frames_next() {
            resampler.process(&block[..], None)
        } else {
            resampler.process_partial(Some(&block[..]), None)
        }
        .context("Resampling failed")?;

        for (out, chunk) in output.iter_mut().zip(resampled) {
            out.extend(chunk);
        }
        position = end;
    }

    // Flush the samples still held inside the resampler
    while output[0].len() < wanted {
        let resampled = resampler
            .process_partial(None::<&[Vec<f64>]>, None)
            .context("Resampling failed")?;
        if resampled[0].is_empty() {
            break;
        }
        for (out, chunk) in output.iter_mut().zip(resampled) {
            out.extend(chunk);
        }
    }

    let mut interleaved = Vec::with_capacity(expected * channels);
    for index in delay..wanted {
        for channel in &output {
            let sample = channel.get(index).copied().unwrap_or(0.0);
            interleaved.push(sample as f32);
        }
    }

    Ok(interleaved)
}

/// Map interleaved f32 audio onto a different channel count
///
/// Mono is copied to every output channel; a mono output gets the average.
pub fn remix_f32(samples: &[f32], from_channels: u16, to_channels: u16) -> Vec<f32> {
    let from = from_channels.max(1) as usize;
    let to = to_channels.max(1) as usize;
    if from == to {
        return samples.to_vec();
    }

    let mut output = Vec::with_capacity(samples.len() / from * to);
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            output.push(frame.iter().sum::<f32>() / from as f32);
            continue;
        }
        for channel in 0..to {
            output.push(frame[channel % from]);
        }
    }
    output
}

/// Down-mix interleaved channels to mono by averaging
pub fn to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels <= 1 {
        return frame;
    }

    let channels = frame.channels as usize;
    let samples = frame
        .samples
        .chunks_exact(channels)
        .map(|chunk| {
            let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect();

    AudioFrame {
        samples,
        sample_rate: frame.sample_rate,
        channels: 1,
    }
}

/// Convert a normalized float sample to i16
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Wrap a frame in an in-memory WAV container
pub fn encode_wav(frame: &AudioFrame) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: frame.channels,
        sample_rate: frame.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;
        for &sample in &frame.samples {
            writer
                .write_sample(sample)
                .context("Failed to write sample to WAV")?;
        }
        writer.finalize().context("Failed to finalize WAV")?;
    }

    Ok(cursor.into_inner())
}
