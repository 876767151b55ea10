pub mod backend;
pub mod capture;
pub mod clip;
pub mod convert;
pub mod decode;
pub mod file;
pub mod playback;
pub mod sink;

#[cfg(feature = "device-audio")]
pub mod microphone;

pub use backend::{CaptureBackend, CaptureBackendFactory, CaptureConstraints, CaptureSource, ClipFormat};
pub use capture::AudioCapture;
pub use clip::{Clip, UtteranceBuffer};
pub use convert::AudioFrame;
pub use decode::{decode_audio, DecodedAudio};
pub use file::{inspect_wav, FileBackend, WavInfo};
pub use playback::{AudioReply, ClipId, PlaybackEvent, PlaybackOutcome, PlaybackUnit};
pub use sink::{create_sink, AudioSink, SinkKind, WavDumpSink};
