//! Session controller.
//!
//! One actor task owns the session and serializes every command and every
//! collaborator completion. External work runs in spawned tasks that post
//! their results back tagged with the session generation; a result whose tag
//! no longer matches is dropped.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use timedial_core::config::Config;
use timedial_core::persona::Persona;
use timedial_core::state::{InteractionState, InvalidTransition};
use timedial_core::types::{history_window, Message};
use timedial_media::playback::{AudioBuffer, AudioPlaybackUnit};
use timedial_media::speech_input::{SpeechEvent, SpeechInputUnit};
use timedial_providers::{PortraitGenerator, Reply, ReplyFetcher, ReplyRequest};
use timedial_tts::SpeechSynthesizer;

use crate::events::{Outcome, SessionEvent, SessionSnapshot};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Session controller has stopped")]
    Closed,
}

/// Everything the controller talks to. The playback and input units are
/// shared across rooms and outlive any one session.
#[derive(Clone)]
pub struct Collaborators {
    pub replies: Arc<dyn ReplyFetcher>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub portraits: Option<Arc<dyn PortraitGenerator>>,
    pub playback: Arc<AudioPlaybackUnit>,
    pub input: Arc<SpeechInputUnit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Prior messages sent with each reply request.
    pub history_window: usize,
    /// Portrait attempts per persona for the controller's lifetime.
    pub portrait_attempts: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            history_window: 5,
            portrait_attempts: 2,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            history_window: config.history_window(),
            portrait_attempts: config.portrait_attempts(),
        }
    }
}

enum Command {
    Enter {
        persona: Persona,
        done: oneshot::Sender<()>,
    },
    Submit {
        text: String,
        reply: oneshot::Sender<Outcome>,
    },
    StartListening {
        reply: oneshot::Sender<Outcome>,
    },
    StopListening {
        done: oneshot::Sender<()>,
    },
    Leave {
        done: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

#[derive(Debug)]
enum Completion {
    Reply {
        generation: u64,
        reply: Reply,
    },
    Audio {
        generation: u64,
        result: Result<AudioBuffer, String>,
    },
    PlaybackEnded {
        generation: u64,
        playback_id: u64,
    },
    Speech {
        generation: u64,
        capture: u64,
        event: SpeechEvent,
    },
    Portrait {
        persona_id: String,
        image: Option<String>,
    },
}

/// Cloneable front door to a running controller.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(make(tx)).map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Enter a persona room. Returns once the transcript has been reset and
    /// the greeting requested; the greeting plays in the background.
    pub async fn enter_persona(&self, persona: Persona) -> Result<(), SessionError> {
        self.request(|done| Command::Enter { persona, done }).await
    }

    pub async fn submit(&self, text: impl Into<String>) -> Result<Outcome, SessionError> {
        let text = text.into();
        self.request(|reply| Command::Submit { text, reply }).await
    }

    pub async fn start_listening(&self) -> Result<Outcome, SessionError> {
        self.request(|reply| Command::StartListening { reply }).await
    }

    pub async fn stop_listening(&self) -> Result<(), SessionError> {
        self.request(|done| Command::StopListening { done }).await
    }

    pub async fn leave_room(&self) -> Result<(), SessionError> {
        self.request(|done| Command::Leave { done }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

struct Session {
    persona: Persona,
    transcript: Vec<Message>,
}

pub struct SessionController {
    collaborators: Collaborators,
    options: SessionOptions,
    state: InteractionState,
    session: Option<Session>,
    generation: u64,
    capture: u64,
    playback_id: Option<u64>,
    portrait_attempts: HashMap<String, u32>,
    portraits: HashMap<String, String>,
    events: broadcast::Sender<SessionEvent>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl SessionController {
    fn new(
        collaborators: Collaborators,
        options: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (completions, completions_rx) = mpsc::unbounded_channel();
        let controller = Self {
            collaborators,
            options,
            state: InteractionState::Idle,
            session: None,
            generation: 0,
            capture: 0,
            playback_id: None,
            portrait_attempts: HashMap::new(),
            portraits: HashMap::new(),
            events,
            completions,
        };
        (controller, completions_rx)
    }

    /// Start the controller actor.
    pub fn spawn(collaborators: Collaborators, options: SessionOptions) -> SessionHandle {
        let (controller, completions) = Self::new(collaborators, options);
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = SessionHandle {
            commands,
            events: controller.events.clone(),
            cancel: cancel.clone(),
        };

        tokio::spawn(async move {
            info!("Session controller started");
            controller.run(commands_rx, completions, cancel).await;
            info!("Session controller stopped");
        });

        handle
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(completion) = completions.recv() => self.handle_completion(completion).await,
            }
        }
        self.collaborators.input.stop();
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Enter { persona, done } => {
                self.enter(persona).await;
                let _ = done.send(());
            }
            Command::Submit { text, reply } => {
                let _ = reply.send(self.submit(&text));
            }
            Command::StartListening { reply } => {
                let _ = reply.send(self.start_listening());
            }
            Command::StopListening { done } => {
                self.stop_listening();
                let _ = done.send(());
            }
            Command::Leave { done } => {
                self.leave().await;
                let _ = done.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn transition(&mut self, to: InteractionState) -> Result<(), SessionError> {
        let from = self.state;
        self.state = from
            .transition_to(to)
            .inspect_err(|e| warn!(error = %e, "Rejected state transition"))?;
        debug!(%from, %to, "State changed");
        self.emit(SessionEvent::StateChanged { from, to });
        Ok(())
    }

    /// Reset to Idle regardless of the current state (room change).
    fn force_idle(&mut self) {
        self.playback_id = None;
        if self.state != InteractionState::Idle {
            let from = self.state;
            self.state = InteractionState::Idle;
            self.emit(SessionEvent::StateChanged {
                from,
                to: InteractionState::Idle,
            });
        }
    }

    async fn enter(&mut self, persona: Persona) {
        // Nothing from the previous room may keep playing or stay queued.
        self.collaborators.playback.suspend().await;
        if let Err(e) = self.collaborators.playback.init().await {
            warn!(error = %e, "Audio output unavailable");
        }
        self.collaborators.input.stop();
        self.generation += 1;
        self.force_idle();

        info!(persona = %persona.id, generation = self.generation, "Entered persona room");
        let greeting = Message::greeting(persona.greeting.clone());
        self.emit(SessionEvent::TranscriptReset {
            persona_id: persona.id.clone(),
            greeting: greeting.clone(),
        });

        self.request_portrait(&persona);
        let (text, voice_id) = (persona.greeting.clone(), persona.voice_id.clone());
        self.session = Some(Session {
            persona,
            transcript: vec![greeting],
        });

        if self.transition(InteractionState::Thinking).is_ok() {
            self.request_speech(text, voice_id);
        }
    }

    async fn leave(&mut self) {
        self.collaborators.playback.suspend().await;
        self.collaborators.input.stop();
        self.generation += 1;
        self.session = None;
        self.force_idle();
        info!(generation = self.generation, "Left persona room");
        self.emit(SessionEvent::RoomLeft);
    }

    fn submit(&mut self, text: &str) -> Outcome {
        if self.session.is_none() {
            return Outcome::NoPersona;
        }
        let text = text.trim();
        if text.is_empty() {
            return Outcome::EmptyText;
        }
        if !self.state.accepts_input() {
            debug!(state = %self.state, "Submission dropped while busy");
            return Outcome::Busy(self.state);
        }
        if self.transition(InteractionState::Thinking).is_err() {
            return Outcome::Busy(self.state);
        }
        self.request_reply(text.to_string());
        Outcome::Accepted
    }

    fn start_listening(&mut self) -> Outcome {
        if self.session.is_none() {
            return Outcome::NoPersona;
        }
        if !self.state.accepts_input() {
            return Outcome::Busy(self.state);
        }
        let events = match self.collaborators.input.start() {
            Ok(rx) => rx,
            Err(e) => return Outcome::InputUnavailable(e.to_string()),
        };
        if self.transition(InteractionState::Listening).is_err() {
            self.collaborators.input.stop();
            return Outcome::Busy(self.state);
        }

        self.capture += 1;
        let (generation, capture) = (self.generation, self.capture);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let event = events.await.unwrap_or(SpeechEvent::End);
            let _ = completions.send(Completion::Speech {
                generation,
                capture,
                event,
            });
        });
        Outcome::Accepted
    }

    fn stop_listening(&mut self) {
        if self.state == InteractionState::Listening {
            self.collaborators.input.stop();
            let _ = self.transition(InteractionState::Idle);
        }
    }

    /// Append the user message and fetch a reply. The state is already Thinking.
    fn request_reply(&mut self, text: String) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let history = history_window(&session.transcript, self.options.history_window);
        let message = Message::user(text.clone());
        session.transcript.push(message.clone());
        let request = ReplyRequest {
            user_text: text,
            instructions: session.persona.instructions.clone(),
            history,
        };
        self.emit(SessionEvent::MessageAppended(message));

        let replies = self.collaborators.replies.clone();
        let completions = self.completions.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let reply = AssertUnwindSafe(replies.fetch_reply(&request))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    error!(fetcher = replies.id(), "Reply fetcher panicked");
                    Reply::fallback()
                });
            let _ = completions.send(Completion::Reply { generation, reply });
        });
    }

    fn request_speech(&self, text: String, voice_id: String) {
        let speech = self.collaborators.speech.clone();
        let playback = self.collaborators.playback.clone();
        let completions = self.completions.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = AssertUnwindSafe(synthesize_audio(&*speech, &playback, &text, &voice_id))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    error!(synthesizer = speech.id(), "Speech synthesizer panicked");
                    Err("speech synthesis panicked".to_string())
                });
            let _ = completions.send(Completion::Audio { generation, result });
        });
    }

    fn request_portrait(&mut self, persona: &Persona) {
        let Some(generator) = self.collaborators.portraits.clone() else {
            return;
        };
        if self.portraits.contains_key(&persona.id) {
            return;
        }
        let attempts = self.portrait_attempts.entry(persona.id.clone()).or_insert(0);
        if *attempts >= self.options.portrait_attempts {
            debug!(persona = %persona.id, "Portrait attempts exhausted");
            return;
        }
        *attempts += 1;

        let persona_id = persona.id.clone();
        let name = persona.name.clone();
        let description = persona.description();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let image = AssertUnwindSafe(generator.generate_portrait(&name, &description))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    error!("Portrait generator panicked");
                    None
                });
            let _ = completions.send(Completion::Portrait { persona_id, image });
        });
    }

    fn voice_unavailable(&mut self, reason: String) {
        warn!(%reason, "Voice unavailable");
        self.emit(SessionEvent::VoiceUnavailable { reason });
        let _ = self.transition(InteractionState::Idle);
    }

    async fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Reply { generation, reply } => {
                if generation != self.generation || self.state != InteractionState::Thinking {
                    debug!(generation, "Discarding stale reply");
                    return;
                }
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                let message = Message::persona(reply.text.clone(), reply.sources);
                session.transcript.push(message.clone());
                let voice_id = session.persona.voice_id.clone();
                self.emit(SessionEvent::MessageAppended(message));
                if self.transition(InteractionState::Speaking).is_ok() {
                    self.request_speech(reply.text, voice_id);
                }
            }

            Completion::Audio { generation, result } => {
                if generation != self.generation
                    || !matches!(
                        self.state,
                        InteractionState::Thinking | InteractionState::Speaking
                    )
                {
                    debug!(generation, "Discarding stale audio");
                    return;
                }
                let buffer = match result {
                    Ok(buffer) => buffer,
                    Err(reason) => return self.voice_unavailable(reason),
                };
                let playback = match self.collaborators.playback.play(buffer).await {
                    Ok(playback) => playback,
                    Err(e) => return self.voice_unavailable(e.to_string()),
                };
                // Greeting audio moves Thinking -> Speaking only once it plays.
                if self.state == InteractionState::Thinking
                    && self.transition(InteractionState::Speaking).is_err()
                {
                    return;
                }

                let playback_id = playback.id;
                self.playback_id = Some(playback_id);
                self.emit(SessionEvent::PlaybackStarted {
                    playback_id,
                    tap: playback.tap.clone(),
                });
                let completions = self.completions.clone();
                tokio::spawn(async move {
                    let _ = playback.finished.await;
                    let _ = completions.send(Completion::PlaybackEnded {
                        generation,
                        playback_id,
                    });
                });
            }

            Completion::PlaybackEnded {
                generation,
                playback_id,
            } => {
                if generation != self.generation
                    || self.state != InteractionState::Speaking
                    || self.playback_id != Some(playback_id)
                {
                    debug!(playback_id, "Ignoring playback end");
                    return;
                }
                self.playback_id = None;
                self.emit(SessionEvent::PlaybackFinished { playback_id });
                let _ = self.transition(InteractionState::Idle);
            }

            Completion::Speech {
                generation,
                capture,
                event,
            } => {
                if generation != self.generation
                    || capture != self.capture
                    || self.state != InteractionState::Listening
                {
                    debug!(capture, "Discarding stale speech event");
                    return;
                }
                match event {
                    SpeechEvent::Transcript(text) => {
                        if self.transition(InteractionState::Thinking).is_ok() {
                            self.request_reply(text);
                        }
                    }
                    SpeechEvent::End => {
                        let _ = self.transition(InteractionState::Idle);
                    }
                    SpeechEvent::Error(e) => {
                        debug!(error = %e, "Speech recognition failed");
                        let _ = self.transition(InteractionState::Idle);
                    }
                }
            }

            Completion::Portrait { persona_id, image } => {
                let Some(image) = image else {
                    debug!(persona = %persona_id, "Portrait unavailable");
                    return;
                };
                info!(persona = %persona_id, "Portrait ready");
                self.portraits.insert(persona_id.clone(), image.clone());
                if self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.persona.id == persona_id)
                {
                    self.emit(SessionEvent::PortraitReady { persona_id, image });
                }
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let Some(session) = &self.session else {
            return SessionSnapshot {
                generation: self.generation,
                ..SessionSnapshot::default()
            };
        };
        SessionSnapshot {
            persona: Some(session.persona.clone()),
            state: self.state,
            transcript: session.transcript.clone(),
            generation: self.generation,
            portrait: self.portraits.get(&session.persona.id).cloned(),
        }
    }
}

async fn synthesize_audio(
    speech: &dyn SpeechSynthesizer,
    playback: &AudioPlaybackUnit,
    text: &str,
    voice_id: &str,
) -> Result<AudioBuffer, String> {
    let bytes = speech
        .synthesize(text, voice_id)
        .await
        .map_err(|e| e.to_string())?;
    playback.decode(bytes).await.map_err(|e| e.to_string())
}
