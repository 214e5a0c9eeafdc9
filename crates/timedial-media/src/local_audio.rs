//! Playback through the default output device.
//!
//! rodio's output stream is not `Send`, so it lives on a dedicated thread that
//! owns the sink and takes commands over a channel. Completion is reported by
//! the sink itself: a callback source queued behind each clip fires when the
//! device reaches it. Suspending replaces the sink, so nothing queued before
//! the suspend is ever heard.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rodio::source::EmptyCallback;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::playback::{feed_tap, AudioBackend, AudioBuffer, PlaybackError};
use crate::wav::PcmAudio;

enum Command {
    Play {
        bytes: Bytes,
        done: oneshot::Sender<()>,
    },
    /// Drop everything queued and wait paused.
    Stop,
    Resume,
}

/// A silent source that signals `done` when the sink reaches it.
fn completion_marker(done: oneshot::Sender<()>) -> EmptyCallback<f32> {
    let done = Mutex::new(Some(done));
    EmptyCallback::new(Box::new(move || {
        if let Some(done) = done.lock().ok().and_then(|mut d| d.take()) {
            let _ = done.send(());
        }
    }))
}

/// A new paused sink. The old one is dropped, which stops it along with its queue.
fn fresh_sink(handle: &OutputStreamHandle) -> Option<Sink> {
    match Sink::try_new(handle) {
        Ok(sink) => {
            sink.pause();
            Some(sink)
        }
        Err(e) => {
            warn!(error = %e, "Failed to replace output sink");
            None
        }
    }
}

pub struct RodioBackend {
    commands: mpsc::Sender<Command>,
    running: AtomicBool,
}

impl RodioBackend {
    /// Open the default output device.
    pub fn open() -> Result<Self, PlaybackError> {
        let (commands, inbox) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        std::thread::Builder::new()
            .name("timedial-audio".into())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let mut sink = match Sink::try_new(&handle) {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                while let Ok(command) = inbox.recv() {
                    match command {
                        Command::Play { bytes, done } => {
                            match Decoder::new(Cursor::new(bytes.to_vec())) {
                                Ok(source) => {
                                    sink.append(source.convert_samples::<f32>());
                                    sink.append(completion_marker(done));
                                }
                                Err(e) => {
                                    warn!(error = %e, "Output thread failed to decode audio");
                                    let _ = done.send(());
                                }
                            }
                        }
                        Command::Stop => {
                            if let Some(fresh) = fresh_sink(&handle) {
                                sink = fresh;
                            } else {
                                sink.stop();
                            }
                        }
                        Command::Resume => sink.play(),
                    }
                }
            })
            .map_err(|e| PlaybackError::Backend(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|e| PlaybackError::Backend(e.to_string()))?
            .map_err(PlaybackError::Backend)?;

        info!("Audio output device opened");
        Ok(Self {
            commands,
            running: AtomicBool::new(false),
        })
    }

    fn send(&self, command: Command) -> Result<(), PlaybackError> {
        self.commands
            .send(command)
            .map_err(|_| PlaybackError::Backend("audio output thread has exited".into()))
    }
}

#[async_trait]
impl AudioBackend for RodioBackend {
    fn name(&self) -> &str {
        "rodio"
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn resume(&self) -> Result<(), PlaybackError> {
        self.send(Command::Resume)?;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn suspend(&self) -> Result<(), PlaybackError> {
        self.send(Command::Stop)?;
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn decode(&self, bytes: Bytes) -> Result<AudioBuffer, PlaybackError> {
        let data = bytes.clone();
        let pcm = tokio::task::spawn_blocking(move || {
            let decoder = Decoder::new(Cursor::new(data.to_vec()))
                .map_err(|e| PlaybackError::Malformed(e.to_string()))?;
            let channels = decoder.channels();
            let sample_rate = decoder.sample_rate();
            let samples: Vec<f32> = decoder.convert_samples::<f32>().collect();
            Ok::<_, PlaybackError>(PcmAudio {
                samples,
                sample_rate,
                channels,
            })
        })
        .await
        .map_err(|e| PlaybackError::Backend(e.to_string()))??;

        if pcm.samples.is_empty() {
            return Err(PlaybackError::Malformed("no audio frames".into()));
        }

        Ok(AudioBuffer {
            duration: Duration::from_secs_f64(pcm.duration_secs()),
            samples: Arc::new(pcm.to_mono()),
            sample_rate: pcm.sample_rate,
            encoded: bytes,
        })
    }

    async fn play(
        &self,
        buffer: AudioBuffer,
        tap: Arc<crate::tap::AmplitudeTap>,
    ) -> Result<oneshot::Receiver<()>, PlaybackError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Command::Play {
            bytes: buffer.encoded.clone(),
            done: done_tx,
        })?;

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let feeder = tokio::spawn(feed_tap(
                buffer.samples,
                buffer.sample_rate,
                buffer.duration,
                Duration::from_millis(33),
                tap.clone(),
            ));
            let heard = done_rx.await.is_ok();
            feeder.abort();
            tap.clear();
            // A clip discarded by suspend never completes.
            if heard {
                let _ = tx.send(());
            }
        });
        Ok(rx)
    }
}
