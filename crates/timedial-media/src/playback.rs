//! Audio playback unit.
//!
//! Owns one lazily created, reusable output context. The context is built by
//! a backend factory on first [`AudioPlaybackUnit::init`] (the first user
//! gesture), resumed when suspended, and never torn down while the unit
//! lives. Leaving a room suspends it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::tap::AmplitudeTap;
use crate::wav;

/// Payloads smaller than this cannot hold a playable frame.
pub const MIN_AUDIO_BYTES: usize = 128;

/// Bitrate assumed when estimating the length of compressed audio.
const ASSUMED_BITRATE: u64 = 128_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// No context yet, or the context is suspended.
    #[error("Audio output is locked")]
    Locked,

    #[error("Malformed audio: {0}")]
    Malformed(String),

    #[error("Audio backend error: {0}")]
    Backend(String),
}

/// Decoded audio ready to play.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// The original encoded payload.
    pub encoded: Bytes,
    /// Mono samples for analysis. May be empty when the backend decodes lazily.
    pub samples: Arc<Vec<f32>>,
    pub sample_rate: u32,
    pub duration: Duration,
}

/// A started playback.
#[derive(Debug)]
pub struct Playback {
    pub id: u64,
    pub tap: Arc<AmplitudeTap>,
    /// Fires once when the audio has finished.
    pub finished: oneshot::Receiver<()>,
}

#[async_trait]
pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the context is unlocked and running.
    fn is_running(&self) -> bool;

    async fn resume(&self) -> Result<(), PlaybackError>;

    /// Pause output and discard queued audio. Completion receivers of
    /// discarded playbacks are dropped without firing.
    async fn suspend(&self) -> Result<(), PlaybackError>;

    async fn decode(&self, bytes: Bytes) -> Result<AudioBuffer, PlaybackError>;

    /// Start playing `buffer`, feeding `tap` while it plays. The returned
    /// receiver fires when playback ends.
    async fn play(
        &self,
        buffer: AudioBuffer,
        tap: Arc<AmplitudeTap>,
    ) -> Result<oneshot::Receiver<()>, PlaybackError>;
}

pub type BackendFactory =
    Box<dyn Fn() -> Result<Arc<dyn AudioBackend>, PlaybackError> + Send + Sync>;

pub struct AudioPlaybackUnit {
    factory: BackendFactory,
    backend: Mutex<Option<Arc<dyn AudioBackend>>>,
    next_id: AtomicU64,
    current_tap: Mutex<Option<Arc<AmplitudeTap>>>,
}

impl AudioPlaybackUnit {
    pub fn new(factory: BackendFactory) -> Self {
        Self {
            factory,
            backend: Mutex::new(None),
            next_id: AtomicU64::new(0),
            current_tap: Mutex::new(None),
        }
    }

    /// A unit backed by [`HeadlessBackend`].
    pub fn headless() -> Self {
        Self::new(Box::new(|| Ok(Arc::new(HeadlessBackend::new()) as Arc<dyn AudioBackend>)))
    }

    fn backend(&self) -> Option<Arc<dyn AudioBackend>> {
        self.backend.lock().ok().and_then(|b| b.clone())
    }

    /// Create the context if needed and resume it if suspended.
    pub async fn init(&self) -> Result<(), PlaybackError> {
        let backend = match self.backend() {
            Some(b) => b,
            None => {
                let created = (self.factory)()?;
                info!(backend = created.name(), "Audio context created");
                if let Ok(mut slot) = self.backend.lock() {
                    *slot = Some(created.clone());
                }
                created
            }
        };
        if !backend.is_running() {
            backend.resume().await?;
            debug!("Audio context resumed");
        }
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.backend().is_some_and(|b| b.is_running())
    }

    /// Decode a synthesized payload. Undersized payloads are rejected.
    pub async fn decode(&self, bytes: Bytes) -> Result<AudioBuffer, PlaybackError> {
        if bytes.len() < MIN_AUDIO_BYTES {
            return Err(PlaybackError::Malformed(format!(
                "payload too small ({} bytes)",
                bytes.len()
            )));
        }
        let backend = self.backend().ok_or(PlaybackError::Locked)?;
        backend.decode(bytes).await
    }

    /// Play a decoded buffer with a fresh amplitude tap.
    pub async fn play(&self, buffer: AudioBuffer) -> Result<Playback, PlaybackError> {
        let backend = self.backend().ok_or(PlaybackError::Locked)?;
        if !backend.is_running() {
            return Err(PlaybackError::Locked);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let tap = Arc::new(AmplitudeTap::new());
        let finished = backend.play(buffer, tap.clone()).await?;
        if let Ok(mut current) = self.current_tap.lock() {
            *current = Some(tap.clone());
        }
        debug!(playback = id, "Playback started");
        Ok(Playback { id, tap, finished })
    }

    /// Number of playbacks started (and taps created) so far.
    pub fn playbacks_started(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Tap of the most recent playback.
    pub fn current_tap(&self) -> Option<Arc<AmplitudeTap>> {
        self.current_tap.lock().ok().and_then(|t| t.clone())
    }

    /// Pause the context and drop whatever is still queued on it. The context
    /// stays alive for the next room.
    pub async fn suspend(&self) {
        if let Ok(mut current) = self.current_tap.lock() {
            if let Some(tap) = current.take() {
                tap.clear();
            }
        }
        if let Some(backend) = self.backend() {
            if let Err(e) = backend.suspend().await {
                warn!(error = %e, "Failed to suspend audio context");
            }
        }
    }
}

/// Output-less backend. Decodes WAV for real, estimates the length of other
/// formats, and "plays" in real time while feeding the tap.
pub struct HeadlessBackend {
    running: AtomicBool,
    tick: Duration,
    /// Bumped on suspend; playbacks started under an older epoch never complete.
    epoch: Arc<AtomicU64>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            tick: Duration::from_millis(50),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a payload without an output device.
pub fn decode_payload(bytes: Bytes) -> Result<AudioBuffer, PlaybackError> {
    if wav::is_wav(&bytes) {
        let pcm = wav::decode_wav(&bytes).map_err(|e| PlaybackError::Malformed(e.to_string()))?;
        return Ok(AudioBuffer {
            duration: Duration::from_secs_f64(pcm.duration_secs()),
            samples: Arc::new(pcm.to_mono()),
            sample_rate: pcm.sample_rate,
            encoded: bytes,
        });
    }
    let millis = bytes.len() as u64 * 8 * 1000 / ASSUMED_BITRATE;
    Ok(AudioBuffer {
        duration: Duration::from_millis(millis),
        samples: Arc::new(Vec::new()),
        sample_rate: 0,
        encoded: bytes,
    })
}

/// Feed `tap` from `samples` in real time for `duration`, then clear it.
pub(crate) async fn feed_tap(
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    duration: Duration,
    tick: Duration,
    tap: Arc<AmplitudeTap>,
) {
    let start = tokio::time::Instant::now();
    loop {
        let elapsed = start.elapsed();
        if elapsed >= duration {
            break;
        }
        if sample_rate > 0 && !samples.is_empty() {
            let pos = ((elapsed.as_secs_f64() * sample_rate as f64) as usize).min(samples.len());
            tap.feed(&samples[..pos]);
        }
        tokio::time::sleep(tick.min(duration - elapsed)).await;
    }
    tap.clear();
}

#[async_trait]
impl AudioBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn resume(&self) -> Result<(), PlaybackError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn suspend(&self) -> Result<(), PlaybackError> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn decode(&self, bytes: Bytes) -> Result<AudioBuffer, PlaybackError> {
        decode_payload(bytes)
    }

    async fn play(
        &self,
        buffer: AudioBuffer,
        tap: Arc<AmplitudeTap>,
    ) -> Result<oneshot::Receiver<()>, PlaybackError> {
        let (tx, rx) = oneshot::channel();
        let tick = self.tick;
        let epoch = self.epoch.clone();
        let started = epoch.load(Ordering::SeqCst);
        tokio::spawn(async move {
            feed_tap(buffer.samples, buffer.sample_rate, buffer.duration, tick, tap).await;
            if epoch.load(Ordering::SeqCst) == started {
                let _ = tx.send(());
            }
        });
        Ok(rx)
    }
}
