//! Interactive persona chat in the terminal.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dialoguer::{Input, Select};
use tokio::sync::broadcast;
use tracing::{debug, info};

use timedial_core::config::Config;
use timedial_core::persona::{Persona, PersonaRoster};
use timedial_core::state::InteractionState;
use timedial_core::types::Role;
use timedial_media::playback::AudioPlaybackUnit;
use timedial_media::speech_input::{CAPTURE_SAMPLE_RATE, SpeechInputUnit};
use timedial_media::stt::TranscribingRecognizer;
use timedial_media::wav;
use timedial_providers::gemini::GeminiClient;
use timedial_providers::proxy::ProxyClient;
use timedial_providers::PortraitGenerator;
use timedial_session::{
    Collaborators, Outcome, SessionController, SessionEvent, SessionHandle, SessionOptions,
};
use timedial_tts::elevenlabs::ElevenLabsSynthesizer;
use timedial_tts::proxy::ProxySynthesizer;

/// Longest we wait for a reply and its audio before prompting again.
const TURN_TIMEOUT: Duration = Duration::from_secs(120);

/// Chunk size when feeding a WAV file through speech input (100 ms).
const FEED_CHUNK: usize = 1600;

fn playback_unit() -> AudioPlaybackUnit {
    #[cfg(feature = "local-audio")]
    {
        use timedial_media::playback::AudioBackend;
        AudioPlaybackUnit::new(Box::new(|| {
            timedial_media::local_audio::RodioBackend::open()
                .map(|b| Arc::new(b) as Arc<dyn AudioBackend>)
        }))
    }
    #[cfg(not(feature = "local-audio"))]
    {
        AudioPlaybackUnit::headless()
    }
}

/// Wire collaborators: through a gateway when a backend URL is known,
/// otherwise straight to the providers.
pub fn collaborators(config: &Config, backend: Option<String>) -> (Collaborators, Arc<SpeechInputUnit>) {
    let input = Arc::new(SpeechInputUnit::new(Arc::new(TranscribingRecognizer::new(
        config.transcription(),
    ))));
    let playback = Arc::new(playback_unit());

    let collaborators = match backend.or_else(|| config.backend_url()) {
        Some(url) => {
            info!(backend = %url, "Using backend proxy");
            let proxy = Arc::new(ProxyClient::new(&url));
            Collaborators {
                replies: proxy.clone(),
                speech: Arc::new(ProxySynthesizer::new(&url)),
                portraits: Some(proxy as Arc<dyn PortraitGenerator>),
                playback,
                input: input.clone(),
            }
        }
        None => {
            let gemini = Arc::new(GeminiClient::new(&config.google()));
            Collaborators {
                replies: gemini.clone(),
                speech: Arc::new(ElevenLabsSynthesizer::new(&config.speech())),
                portraits: Some(gemini as Arc<dyn PortraitGenerator>),
                playback,
                input: input.clone(),
            }
        }
    };
    (collaborators, input)
}

fn choose_persona(roster: &PersonaRoster) -> anyhow::Result<Persona> {
    let personas: Vec<&Persona> = roster.iter().collect();
    let labels: Vec<String> = personas
        .iter()
        .map(|p| format!("{} ({})", p.name, p.description()))
        .collect();
    let index = Select::new()
        .with_prompt("Who would you like to meet?")
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(personas[index].clone())
}

async fn prompt_line() -> anyhow::Result<String> {
    let line = tokio::task::spawn_blocking(|| {
        Input::<String>::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()
    })
    .await??;
    Ok(line)
}

/// Print what the persona says and does.
fn spawn_printer(mut events: broadcast::Receiver<SessionEvent>, name: String) {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Printer lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match event {
                SessionEvent::TranscriptReset { greeting, .. } => println!("\n{name}: {}", greeting.text),
                SessionEvent::MessageAppended(m) if m.role == Role::Persona => {
                    println!("\n{name}: {}", m.text);
                    for source in &m.sources {
                        println!("  [{}] {}", source.title, source.url);
                    }
                }
                SessionEvent::VoiceUnavailable { reason } => println!("  (voice unavailable: {reason})"),
                SessionEvent::PortraitReady { .. } => println!("  (portrait ready)"),
                SessionEvent::StateChanged { from, to } => debug!(%from, %to, "Session state"),
                SessionEvent::RoomLeft => break,
                _ => {}
            }
        }
    });
}

async fn wait_until_idle(events: &mut broadcast::Receiver<SessionEvent>) {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::StateChanged {
                    to: InteractionState::Idle,
                    ..
                }) => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    };
    if tokio::time::timeout(TURN_TIMEOUT, wait).await.is_err() {
        println!("  (no answer across the dial)");
    }
}

async fn enter(handle: &SessionHandle, persona: &Persona) -> anyhow::Result<()> {
    let mut events = handle.subscribe();
    spawn_printer(handle.subscribe(), persona.name.clone());
    handle.enter_persona(persona.clone()).await?;
    wait_until_idle(&mut events).await;
    Ok(())
}

/// Feed a WAV recording through speech input as if it were spoken.
async fn listen(handle: &SessionHandle, input: &SpeechInputUnit, path: &Path) -> anyhow::Result<()> {
    let pcm = wav::read_wav_file(path)
        .with_context(|| format!("Failed to read {}", path.display()))?
        .to_mono_i16(CAPTURE_SAMPLE_RATE);

    let mut events = handle.subscribe();
    match handle.start_listening().await? {
        Outcome::Accepted => {}
        other => {
            println!("  (cannot listen now: {other:?})");
            return Ok(());
        }
    }
    println!("  (listening to {})", path.display());

    let mut finalized = false;
    for chunk in pcm.chunks(FEED_CHUNK) {
        if input.push_audio(chunk) {
            finalized = true;
            break;
        }
    }
    if !finalized {
        let _ = input.end_of_input();
    }
    wait_until_idle(&mut events).await;
    Ok(())
}

pub async fn run(config: Config, persona_id: Option<String>, backend: Option<String>) -> anyhow::Result<()> {
    let roster = config.roster();
    let mut persona = match persona_id {
        Some(id) => roster
            .find(&id)
            .cloned()
            .with_context(|| format!("Unknown persona '{id}'"))?,
        None => choose_persona(&roster)?,
    };

    let (collaborators, input) = collaborators(&config, backend);
    let handle = SessionController::spawn(collaborators, SessionOptions::from_config(&config));

    println!("Dialing {}... (/listen <file.wav>, /back, /quit)", persona.name);
    enter(&handle, &persona).await?;

    loop {
        let line = prompt_line().await?;
        let line = line.trim();

        if line == "/quit" {
            break;
        }
        if line == "/back" {
            handle.leave_room().await?;
            persona = choose_persona(&roster)?;
            enter(&handle, &persona).await?;
            continue;
        }
        if let Some(path) = line.strip_prefix("/listen") {
            let path = path.trim();
            if path.is_empty() {
                println!("  (usage: /listen <file.wav>)");
            } else if let Err(e) = listen(&handle, &input, Path::new(path)).await {
                println!("  ({e:#})");
            }
            continue;
        }

        let mut events = handle.subscribe();
        match handle.submit(line).await? {
            Outcome::Accepted => wait_until_idle(&mut events).await,
            Outcome::Busy(state) => println!("  ({} is {state}, message dropped)", persona.name),
            Outcome::EmptyText | Outcome::NoPersona | Outcome::InputUnavailable(_) => {}
        }
    }

    handle.leave_room().await?;
    handle.shutdown();
    Ok(())
}
