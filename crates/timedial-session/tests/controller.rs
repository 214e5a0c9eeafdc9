//! Session controller driven through its handle with in-memory collaborators.
//!
//! Run with: `cargo test -p timedial-session --test controller`

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{broadcast, oneshot, Semaphore};

use timedial_core::persona::{Persona, PersonaRoster};
use timedial_core::state::InteractionState;
use timedial_core::types::{Role, GREETING_MESSAGE_ID};
use timedial_media::playback::{
    decode_payload, AudioBackend, AudioBuffer, AudioPlaybackUnit, PlaybackError,
};
use timedial_media::speech_input::{SpeechInputUnit, SpeechRecognizer};
use timedial_media::tap::AmplitudeTap;
use timedial_providers::{PortraitGenerator, Reply, ReplyFetcher, ReplyRequest, FALLBACK_REPLY};
use timedial_session::{
    Collaborators, Outcome, SessionController, SessionEvent, SessionHandle, SessionOptions,
};
use timedial_tts::{SpeechSynthesizer, SynthesisError};

// --- collaborators ---

#[derive(Default)]
struct RecordingReplies {
    requests: Mutex<Vec<ReplyRequest>>,
}

#[async_trait]
impl ReplyFetcher for RecordingReplies {
    fn id(&self) -> &str {
        "recording"
    }

    async fn fetch_reply(&self, request: &ReplyRequest) -> Reply {
        self.requests.lock().unwrap().push(request.clone());
        Reply::text("Greetings, traveler.")
    }
}

struct GatedReplies {
    gate: Semaphore,
}

#[async_trait]
impl ReplyFetcher for GatedReplies {
    fn id(&self) -> &str {
        "gated"
    }

    async fn fetch_reply(&self, _request: &ReplyRequest) -> Reply {
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        Reply::text("too late")
    }
}

struct PanickingReplies;

#[async_trait]
impl ReplyFetcher for PanickingReplies {
    fn id(&self) -> &str {
        "panicking"
    }

    async fn fetch_reply(&self, _request: &ReplyRequest) -> Reply {
        panic!("provider exploded");
    }
}

enum VoiceMode {
    Audio,
    Silent,
    Failing,
}

struct Voice {
    mode: VoiceMode,
    voices: Mutex<Vec<String>>,
}

impl Voice {
    fn new(mode: VoiceMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            voices: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for Voice {
    fn id(&self) -> &str {
        "voice"
    }

    async fn synthesize(&self, _text: &str, voice_id: &str) -> Result<Bytes, SynthesisError> {
        self.voices.lock().unwrap().push(voice_id.to_string());
        match self.mode {
            VoiceMode::Audio => {
                let mut audio = b"ID3".to_vec();
                audio.resize(2048, 0);
                Ok(Bytes::from(audio))
            }
            VoiceMode::Silent => Ok(Bytes::new()),
            VoiceMode::Failing => Err(SynthesisError::InsufficientCredit { status: 429 }),
        }
    }
}

struct CountingPortraits {
    image: Option<String>,
    calls: AtomicUsize,
}

#[async_trait]
impl PortraitGenerator for CountingPortraits {
    async fn generate_portrait(&self, _name: &str, _description: &str) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.image.clone()
    }
}

#[derive(Clone, Copy)]
enum Hearing {
    Question,
    Nothing,
    Failing,
}

struct ScriptedRecognizer {
    hearing: Hearing,
    calls: AtomicUsize,
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn recognize(&self, _pcm: &[i16]) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.hearing {
            Hearing::Question => Ok("What is relativity?".into()),
            Hearing::Nothing => Ok("   ".into()),
            Hearing::Failing => Err(anyhow::anyhow!("microphone unplugged")),
        }
    }
}

/// Plays nothing; playback ends when the test says so. Suspending discards
/// queued playbacks. A locked backend never unlocks.
#[derive(Default)]
struct ManualBackend {
    running: AtomicBool,
    locked: AtomicBool,
    plays: AtomicUsize,
    suspends: AtomicUsize,
    pending: Mutex<Vec<oneshot::Sender<()>>>,
}

impl ManualBackend {
    fn finish_all(&self) {
        for done in self.pending.lock().unwrap().drain(..) {
            let _ = done.send(());
        }
    }
}

#[async_trait]
impl AudioBackend for ManualBackend {
    fn name(&self) -> &str {
        "manual"
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn resume(&self) -> Result<(), PlaybackError> {
        if !self.locked.load(Ordering::SeqCst) {
            self.running.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn suspend(&self) -> Result<(), PlaybackError> {
        self.suspends.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.pending.lock().unwrap().clear();
        Ok(())
    }

    async fn decode(&self, bytes: Bytes) -> Result<AudioBuffer, PlaybackError> {
        decode_payload(bytes)
    }

    async fn play(
        &self,
        _buffer: AudioBuffer,
        _tap: Arc<AmplitudeTap>,
    ) -> Result<oneshot::Receiver<()>, PlaybackError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().push(tx);
        Ok(rx)
    }
}

// --- harness ---

struct Harness {
    handle: SessionHandle,
    events: broadcast::Receiver<SessionEvent>,
    backend: Arc<ManualBackend>,
    playback: Arc<AudioPlaybackUnit>,
    input: Arc<SpeechInputUnit>,
    recognizer: Arc<ScriptedRecognizer>,
}

fn harness(
    replies: Arc<dyn ReplyFetcher>,
    speech: Arc<dyn SpeechSynthesizer>,
    portraits: Option<Arc<dyn PortraitGenerator>>,
) -> Harness {
    harness_hearing(replies, speech, portraits, Hearing::Question)
}

fn harness_hearing(
    replies: Arc<dyn ReplyFetcher>,
    speech: Arc<dyn SpeechSynthesizer>,
    portraits: Option<Arc<dyn PortraitGenerator>>,
    hearing: Hearing,
) -> Harness {
    let backend = Arc::new(ManualBackend::default());
    let factory_backend = backend.clone();
    let playback = Arc::new(AudioPlaybackUnit::new(Box::new(move || {
        Ok(factory_backend.clone() as Arc<dyn AudioBackend>)
    })));
    let recognizer = Arc::new(ScriptedRecognizer {
        hearing,
        calls: AtomicUsize::new(0),
    });
    let input = Arc::new(SpeechInputUnit::new(recognizer.clone()));

    let handle = SessionController::spawn(
        Collaborators {
            replies,
            speech,
            portraits,
            playback: playback.clone(),
            input: input.clone(),
        },
        SessionOptions::default(),
    );
    let events = handle.subscribe();

    Harness {
        handle,
        events,
        backend,
        playback,
        input,
        recognizer,
    }
}

fn persona(id: &str) -> Persona {
    PersonaRoster::builtin().find(id).cloned().unwrap()
}

async fn next_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event channel closed")
}

/// Collect state changes until `target` is reached.
async fn wait_for_state(
    events: &mut broadcast::Receiver<SessionEvent>,
    target: InteractionState,
) -> Vec<InteractionState> {
    let mut trail = Vec::new();
    loop {
        if let SessionEvent::StateChanged { to, .. } = next_event(events).await {
            trail.push(to);
            if to == target {
                return trail;
            }
        }
    }
}

/// State trail until Idle, plus whether the voice was reported unavailable.
/// Fails if anything starts playing.
async fn trail_without_playback(
    events: &mut broadcast::Receiver<SessionEvent>,
) -> (Vec<InteractionState>, bool) {
    let mut trail = Vec::new();
    let mut voice_unavailable = false;
    while trail.last() != Some(&InteractionState::Idle) {
        match next_event(events).await {
            SessionEvent::StateChanged { to, .. } => trail.push(to),
            SessionEvent::VoiceUnavailable { .. } => voice_unavailable = true,
            SessionEvent::PlaybackStarted { .. } => panic!("nothing should play"),
            _ => {}
        }
    }
    (trail, voice_unavailable)
}

async fn wait_for_playback(events: &mut broadcast::Receiver<SessionEvent>) -> u64 {
    loop {
        if let SessionEvent::PlaybackStarted { playback_id, .. } = next_event(events).await {
            return playback_id;
        }
    }
}

// --- tests ---

#[tokio::test]
async fn test_hello_scenario() {
    use InteractionState::*;

    let replies = Arc::new(RecordingReplies::default());
    let voice = Voice::new(VoiceMode::Audio);
    let mut h = harness(replies.clone(), voice.clone(), None);
    let einstein = persona("einstein");

    h.handle.enter_persona(einstein.clone()).await.unwrap();
    assert_eq!(wait_for_state(&mut h.events, Speaking).await, vec![Thinking, Speaking]);
    h.backend.finish_all();
    wait_for_state(&mut h.events, Idle).await;

    assert_eq!(h.handle.submit("Hello").await.unwrap(), Outcome::Accepted);
    assert_eq!(wait_for_state(&mut h.events, Speaking).await, vec![Thinking, Speaking]);
    wait_for_playback(&mut h.events).await;

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, Speaking);
    let texts: Vec<&str> = snapshot.transcript.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec![einstein.greeting.as_str(), "Hello", "Greetings, traveler."]);
    assert_eq!(snapshot.transcript[2].role, Role::Persona);

    h.backend.finish_all();
    assert_eq!(wait_for_state(&mut h.events, Idle).await, vec![Idle]);
    assert_eq!(h.backend.plays.load(Ordering::SeqCst), 2);
    assert_eq!(
        *voice.voices.lock().unwrap(),
        vec![einstein.voice_id.clone(), einstein.voice_id.clone()]
    );
    assert_eq!(replies.requests.lock().unwrap()[0].instructions, einstein.instructions);
}

#[tokio::test]
async fn test_submission_outside_idle_dropped() {
    let replies = Arc::new(RecordingReplies::default());
    let mut h = harness(replies.clone(), Voice::new(VoiceMode::Audio), None);

    assert_eq!(h.handle.submit("Hello").await.unwrap(), Outcome::NoPersona);

    h.handle.enter_persona(persona("cleopatra")).await.unwrap();
    wait_for_state(&mut h.events, InteractionState::Speaking).await;

    assert_eq!(
        h.handle.submit("Hello").await.unwrap(),
        Outcome::Busy(InteractionState::Speaking)
    );
    assert_eq!(h.handle.submit("   ").await.unwrap(), Outcome::EmptyText);
    assert!(replies.requests.lock().unwrap().is_empty());
    assert_eq!(h.handle.snapshot().await.unwrap().transcript.len(), 1);
}

#[tokio::test]
async fn test_entering_resets_transcript_to_greeting() {
    use InteractionState::*;

    let mut h = harness(
        Arc::new(RecordingReplies::default()),
        Voice::new(VoiceMode::Failing),
        None,
    );

    h.handle.enter_persona(persona("lovelace")).await.unwrap();
    assert_eq!(wait_for_state(&mut h.events, Idle).await, vec![Thinking, Idle]);
    h.handle.submit("Tell me about engines").await.unwrap();
    assert_eq!(
        wait_for_state(&mut h.events, Idle).await,
        vec![Thinking, Speaking, Idle]
    );
    assert_eq!(h.handle.snapshot().await.unwrap().transcript.len(), 3);

    let da_vinci = persona("da_vinci");
    h.handle.enter_persona(da_vinci.clone()).await.unwrap();
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.transcript.len(), 1);
    assert_eq!(snapshot.transcript[0].id, GREETING_MESSAGE_ID);
    assert_eq!(snapshot.transcript[0].text, da_vinci.greeting);
    assert_eq!(snapshot.persona.map(|p| p.id), Some("da_vinci".to_string()));
}

#[tokio::test]
async fn test_history_limited_to_five_prior_messages() {
    let replies = Arc::new(RecordingReplies::default());
    let mut h = harness(replies.clone(), Voice::new(VoiceMode::Failing), None);

    h.handle.enter_persona(persona("einstein")).await.unwrap();
    wait_for_state(&mut h.events, InteractionState::Idle).await;

    for i in 0..10 {
        let outcome = h.handle.submit(format!("question {i}")).await.unwrap();
        assert_eq!(outcome, Outcome::Accepted);
        wait_for_state(&mut h.events, InteractionState::Idle).await;
    }
    assert_eq!(h.handle.snapshot().await.unwrap().transcript.len(), 21);

    h.handle.submit("final question").await.unwrap();
    wait_for_state(&mut h.events, InteractionState::Idle).await;

    let requests = replies.requests.lock().unwrap();
    assert_eq!(requests.len(), 11);
    assert_eq!(requests[0].history.len(), 1);
    assert!(requests.iter().all(|r| r.history.len() <= 5));

    let last = requests.last().unwrap();
    assert_eq!(last.user_text, "final question");
    assert_eq!(last.history.len(), 5);
    assert!(last.history.iter().all(|turn| turn.text != "final question"));
    assert_eq!(last.history[4].role, Role::Persona);
    assert_eq!(last.history[3].text, "question 9");
    assert_eq!(last.history[0].text, "Greetings, traveler.");
}

#[tokio::test]
async fn test_silent_synthesis_skips_playback() {
    use InteractionState::*;

    let mut h = harness(
        Arc::new(RecordingReplies::default()),
        Voice::new(VoiceMode::Silent),
        None,
    );

    h.handle.enter_persona(persona("einstein")).await.unwrap();
    wait_for_state(&mut h.events, Idle).await;

    h.handle.submit("Hello").await.unwrap();
    let (trail, voice_unavailable) = trail_without_playback(&mut h.events).await;

    assert_eq!(trail, vec![Thinking, Speaking, Idle]);
    assert!(voice_unavailable);
    assert_eq!(h.backend.plays.load(Ordering::SeqCst), 0);
    assert_eq!(h.playback.playbacks_started(), 0);
    assert!(h.playback.current_tap().is_none());
}

#[tokio::test]
async fn test_reply_after_leaving_is_discarded() {
    let replies = Arc::new(GatedReplies {
        gate: Semaphore::new(0),
    });
    let mut h = harness(replies.clone(), Voice::new(VoiceMode::Failing), None);

    h.handle.enter_persona(persona("einstein")).await.unwrap();
    wait_for_state(&mut h.events, InteractionState::Idle).await;
    assert!(h.handle.submit("Hello").await.unwrap().is_accepted());

    h.handle.leave_room().await.unwrap();
    let mut events = h.handle.subscribe();
    h.handle.enter_persona(persona("einstein")).await.unwrap();
    wait_for_state(&mut events, InteractionState::Idle).await;

    replies.gate.add_permits(1);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, InteractionState::Idle);
    assert_eq!(snapshot.transcript.len(), 1);
    assert_eq!(snapshot.transcript[0].id, GREETING_MESSAGE_ID);
}

#[tokio::test]
async fn test_voice_transcript_is_submitted() {
    use InteractionState::*;

    let replies = Arc::new(RecordingReplies::default());
    let mut h = harness(replies.clone(), Voice::new(VoiceMode::Failing), None);

    h.handle.enter_persona(persona("einstein")).await.unwrap();
    wait_for_state(&mut h.events, Idle).await;

    assert_eq!(h.handle.start_listening().await.unwrap(), Outcome::Accepted);
    assert_eq!(
        h.handle.start_listening().await.unwrap(),
        Outcome::Busy(Listening)
    );
    h.input.push_audio(&[1200; 3200]);
    h.input.end_of_input().unwrap();

    assert_eq!(
        wait_for_state(&mut h.events, Idle).await,
        vec![Listening, Thinking, Speaking, Idle]
    );
    assert_eq!(replies.requests.lock().unwrap()[0].user_text, "What is relativity?");
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.transcript[1].text, "What is relativity?");
}

#[tokio::test]
async fn test_stop_listening_returns_to_idle() {
    let mut h = harness(
        Arc::new(RecordingReplies::default()),
        Voice::new(VoiceMode::Failing),
        None,
    );

    h.handle.enter_persona(persona("cleopatra")).await.unwrap();
    wait_for_state(&mut h.events, InteractionState::Idle).await;

    h.handle.start_listening().await.unwrap();
    h.input.push_audio(&[1200; 1600]);
    h.handle.stop_listening().await.unwrap();
    assert_eq!(h.handle.snapshot().await.unwrap().state, InteractionState::Idle);

    // The stopped capture's end must not cancel a fresh one.
    assert!(h.handle.start_listening().await.unwrap().is_accepted());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.handle.snapshot().await.unwrap().state, InteractionState::Listening);
    assert_eq!(h.recognizer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_portrait_attempts_capped_per_persona() {
    let portraits = Arc::new(CountingPortraits {
        image: None,
        calls: AtomicUsize::new(0),
    });
    let h = harness(
        Arc::new(RecordingReplies::default()),
        Voice::new(VoiceMode::Failing),
        Some(portraits.clone()),
    );

    for _ in 0..3 {
        h.handle.enter_persona(persona("einstein")).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(portraits.calls.load(Ordering::SeqCst), 2);
    assert!(h.handle.snapshot().await.unwrap().portrait.is_none());
}

#[tokio::test]
async fn test_portrait_not_regenerated_after_success() {
    let portraits = Arc::new(CountingPortraits {
        image: Some("data:image/png;base64,AAAA".into()),
        calls: AtomicUsize::new(0),
    });
    let mut h = harness(
        Arc::new(RecordingReplies::default()),
        Voice::new(VoiceMode::Failing),
        Some(portraits.clone()),
    );

    h.handle.enter_persona(persona("da_vinci")).await.unwrap();
    loop {
        if let SessionEvent::PortraitReady { persona_id, .. } = next_event(&mut h.events).await {
            assert_eq!(persona_id, "da_vinci");
            break;
        }
    }

    h.handle.enter_persona(persona("da_vinci")).await.unwrap();
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.portrait.as_deref(), Some("data:image/png;base64,AAAA"));
    assert_eq!(portraits.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panicking_fetcher_resolves_to_fallback() {
    let mut h = harness(Arc::new(PanickingReplies), Voice::new(VoiceMode::Failing), None);

    h.handle.enter_persona(persona("einstein")).await.unwrap();
    wait_for_state(&mut h.events, InteractionState::Idle).await;

    h.handle.submit("Hello").await.unwrap();
    wait_for_state(&mut h.events, InteractionState::Idle).await;

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.transcript.last().unwrap().text, FALLBACK_REPLY);
}

async fn listen_and_finish(h: &mut Harness) -> Vec<InteractionState> {
    h.handle.enter_persona(persona("einstein")).await.unwrap();
    wait_for_state(&mut h.events, InteractionState::Idle).await;

    assert!(h.handle.start_listening().await.unwrap().is_accepted());
    h.input.push_audio(&[1200; 3200]);
    h.input.end_of_input().unwrap();
    wait_for_state(&mut h.events, InteractionState::Idle).await
}

#[tokio::test]
async fn test_recognition_error_returns_to_idle() {
    let replies = Arc::new(RecordingReplies::default());
    let mut h = harness_hearing(
        replies.clone(),
        Voice::new(VoiceMode::Failing),
        None,
        Hearing::Failing,
    );

    let trail = listen_and_finish(&mut h).await;

    assert_eq!(trail, vec![InteractionState::Listening, InteractionState::Idle]);
    assert_eq!(h.recognizer.calls.load(Ordering::SeqCst), 1);
    assert!(replies.requests.lock().unwrap().is_empty());
    assert_eq!(h.handle.snapshot().await.unwrap().transcript.len(), 1);
}

#[tokio::test]
async fn test_empty_transcript_returns_to_idle() {
    let replies = Arc::new(RecordingReplies::default());
    let mut h = harness_hearing(
        replies.clone(),
        Voice::new(VoiceMode::Failing),
        None,
        Hearing::Nothing,
    );

    let trail = listen_and_finish(&mut h).await;

    assert_eq!(trail, vec![InteractionState::Listening, InteractionState::Idle]);
    assert_eq!(h.recognizer.calls.load(Ordering::SeqCst), 1);
    assert!(replies.requests.lock().unwrap().is_empty());
    assert_eq!(h.handle.snapshot().await.unwrap().transcript.len(), 1);
}

#[tokio::test]
async fn test_locked_output_skips_greeting_audio() {
    use InteractionState::*;

    let mut h = harness(
        Arc::new(RecordingReplies::default()),
        Voice::new(VoiceMode::Audio),
        None,
    );
    h.backend.locked.store(true, Ordering::SeqCst);

    h.handle.enter_persona(persona("einstein")).await.unwrap();
    let (trail, voice_unavailable) = trail_without_playback(&mut h.events).await;

    assert_eq!(trail, vec![Thinking, Idle]);
    assert!(voice_unavailable);
    assert_eq!(h.backend.plays.load(Ordering::SeqCst), 0);
    assert_eq!(h.playback.playbacks_started(), 0);
}

#[tokio::test]
async fn test_reply_while_output_suspended_reports_voice_unavailable() {
    use InteractionState::*;

    let mut h = harness(
        Arc::new(RecordingReplies::default()),
        Voice::new(VoiceMode::Audio),
        None,
    );

    h.handle.enter_persona(persona("einstein")).await.unwrap();
    wait_for_state(&mut h.events, Speaking).await;
    h.backend.finish_all();
    wait_for_state(&mut h.events, Idle).await;

    h.playback.suspend().await;
    h.handle.submit("Hello").await.unwrap();
    let (trail, voice_unavailable) = trail_without_playback(&mut h.events).await;

    assert_eq!(trail, vec![Thinking, Speaking, Idle]);
    assert!(voice_unavailable);
    assert_eq!(h.backend.plays.load(Ordering::SeqCst), 1);
    assert_eq!(h.handle.snapshot().await.unwrap().transcript.len(), 3);
}

#[tokio::test]
async fn test_reentering_discards_audio_from_previous_room() {
    use InteractionState::*;

    let mut h = harness(
        Arc::new(RecordingReplies::default()),
        Voice::new(VoiceMode::Audio),
        None,
    );

    h.handle.enter_persona(persona("einstein")).await.unwrap();
    wait_for_state(&mut h.events, Speaking).await;
    assert_eq!(h.backend.pending.lock().unwrap().len(), 1);

    h.handle.enter_persona(persona("cleopatra")).await.unwrap();
    assert_eq!(
        wait_for_state(&mut h.events, Speaking).await,
        vec![Idle, Thinking, Speaking]
    );
    assert_eq!(h.backend.suspends.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.plays.load(Ordering::SeqCst), 2);
    // Only the new greeting is still queued.
    assert_eq!(h.backend.pending.lock().unwrap().len(), 1);

    h.backend.finish_all();
    assert_eq!(wait_for_state(&mut h.events, Idle).await, vec![Idle]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, Idle);
    assert_eq!(snapshot.persona.map(|p| p.id), Some("cleopatra".to_string()));
}
