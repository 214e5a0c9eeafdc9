//! Media pipeline: playback, amplitude tap, speech capture, STT.

pub mod endpoint;
#[cfg(feature = "local-audio")]
pub mod local_audio;
pub mod playback;
pub mod speech_input;
pub mod stt;
pub mod tap;
pub mod wav;

pub use playback::{AudioBackend, AudioPlaybackUnit, Playback, PlaybackError};
pub use speech_input::{SpeechEvent, SpeechInputUnit, SpeechRecognizer};
pub use tap::AmplitudeTap;
