//! Speech input unit: single-shot, non-continuous transcription.
//!
//! A capture is started, fed 16 kHz mono PCM by a capture source, and then
//! either finalized (end of input, or the first completed utterance) or
//! stopped by the user. Each capture yields exactly one [`SpeechEvent`].
//! Only one capture is active at a time.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::endpoint::{Endpoint, FRAME_SAMPLES, UtteranceDetector};

/// Sample rate the capture source must deliver.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// A final, non-empty transcript.
    Transcript(String),
    /// Capture ended without a transcript.
    End,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpeechInputError {
    #[error("A capture is already active")]
    AlreadyActive,

    #[error("No capture is active")]
    NotActive,
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Transcribe one utterance. An empty string means nothing was recognized.
    async fn recognize(&self, pcm: &[i16]) -> anyhow::Result<String>;
}

struct Capture {
    buffer: Vec<i16>,
    detector: UtteranceDetector,
    events: oneshot::Sender<SpeechEvent>,
}

pub struct SpeechInputUnit {
    recognizer: Arc<dyn SpeechRecognizer>,
    capture: Mutex<Option<Capture>>,
}

impl SpeechInputUnit {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        Self {
            recognizer,
            capture: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.capture.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    /// Begin a capture. The receiver yields the capture's single outcome.
    pub fn start(&self) -> Result<oneshot::Receiver<SpeechEvent>, SpeechInputError> {
        let mut slot = self
            .capture
            .lock()
            .map_err(|_| SpeechInputError::AlreadyActive)?;
        if slot.is_some() {
            debug!("Capture already active, ignoring start");
            return Err(SpeechInputError::AlreadyActive);
        }
        let (tx, rx) = oneshot::channel();
        *slot = Some(Capture {
            buffer: Vec::new(),
            detector: UtteranceDetector::default(),
            events: tx,
        });
        info!(recognizer = self.recognizer.name(), "Speech capture started");
        Ok(rx)
    }

    /// Append captured audio. Ignored when no capture is active.
    ///
    /// Returns true when this audio completed the utterance, in which case
    /// the capture is finalized as if [`Self::end_of_input`] had been called.
    pub fn push_audio(&self, pcm: &[i16]) -> bool {
        let complete = match self.capture.lock() {
            Ok(mut slot) => match slot.as_mut() {
                Some(capture) => {
                    capture.buffer.extend_from_slice(pcm);
                    pcm.chunks(FRAME_SAMPLES).any(|frame| {
                        capture.detector.process(frame) == Some(Endpoint::UtteranceComplete)
                    })
                }
                None => false,
            },
            Err(_) => false,
        };
        if complete {
            debug!("Utterance complete");
            return self.end_of_input().is_ok();
        }
        false
    }

    fn take(&self) -> Option<Capture> {
        self.capture.lock().ok().and_then(|mut slot| slot.take())
    }

    /// The capture source has finished: recognize what was captured.
    pub fn end_of_input(&self) -> Result<(), SpeechInputError> {
        let capture = self.take().ok_or(SpeechInputError::NotActive)?;
        let recognizer = self.recognizer.clone();
        tokio::spawn(async move {
            let event = if capture.buffer.is_empty() {
                SpeechEvent::End
            } else {
                let secs = capture.buffer.len() as f32 / CAPTURE_SAMPLE_RATE as f32;
                debug!(secs, "Recognizing captured audio");
                match recognizer.recognize(&capture.buffer).await {
                    Ok(text) if !text.trim().is_empty() => SpeechEvent::Transcript(text.trim().to_string()),
                    Ok(_) => SpeechEvent::End,
                    Err(e) => {
                        warn!(error = %e, "Speech recognition failed");
                        SpeechEvent::Error(e.to_string())
                    }
                }
            };
            let _ = capture.events.send(event);
        });
        Ok(())
    }

    /// Abandon the active capture without recognizing it.
    pub fn stop(&self) {
        if let Some(capture) = self.take() {
            info!("Speech capture stopped");
            let _ = capture.events.send(SpeechEvent::End);
        }
    }
}
