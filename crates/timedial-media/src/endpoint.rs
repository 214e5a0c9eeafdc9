//! Utterance endpointing for single-shot capture.
//!
//! Energy gate over 20 ms frames of 16 kHz PCM: the utterance starts on the
//! first loud frame and is complete after a run of quiet frames.

/// Samples per 20 ms frame at 16 kHz.
pub const FRAME_SAMPLES: usize = 320;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    SpeechStarted,
    UtteranceComplete,
}

#[derive(Debug, Clone)]
pub struct UtteranceDetector {
    threshold: f64,
    hangover_frames: usize,
    in_speech: bool,
    quiet_run: usize,
}

impl Default for UtteranceDetector {
    /// ~300 ms of quiet ends an utterance.
    fn default() -> Self {
        Self::new(300.0, 15)
    }
}

impl UtteranceDetector {
    pub fn new(threshold: f64, hangover_frames: usize) -> Self {
        Self {
            threshold,
            hangover_frames,
            in_speech: false,
            quiet_run: 0,
        }
    }

    pub fn rms(frame: &[i16]) -> f64 {
        if frame.is_empty() {
            return 0.0;
        }
        let energy: f64 = frame.iter().map(|&s| f64::from(s).powi(2)).sum();
        (energy / frame.len() as f64).sqrt()
    }

    pub fn in_speech(&self) -> bool {
        self.in_speech
    }

    pub fn process(&mut self, frame: &[i16]) -> Option<Endpoint> {
        let loud = Self::rms(frame) > self.threshold;
        match (self.in_speech, loud) {
            (false, true) => {
                self.in_speech = true;
                self.quiet_run = 0;
                Some(Endpoint::SpeechStarted)
            }
            (true, true) => {
                self.quiet_run = 0;
                None
            }
            (true, false) => {
                self.quiet_run += 1;
                if self.quiet_run < self.hangover_frames {
                    return None;
                }
                self.reset();
                Some(Endpoint::UtteranceComplete)
            }
            (false, false) => None,
        }
    }

    pub fn reset(&mut self) {
        self.in_speech = false;
        self.quiet_run = 0;
    }
}
