//! ElevenLabs synthesizer tests against a local fake API.
//!
//! Run with: `cargo test -p timedial-tts --test elevenlabs`

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use timedial_core::config::SpeechConfig;
use timedial_tts::elevenlabs::ElevenLabsSynthesizer;
use timedial_tts::{SpeechSynthesizer, SynthesisError};

const AUDIO: &[u8] = b"ID3-fake-mpeg-payload";

struct FakeElevenLabs {
    voices: Value,
    tts_calls: AtomicUsize,
    voice_list_calls: AtomicUsize,
    requested: Mutex<Vec<(String, String)>>,
}

impl FakeElevenLabs {
    fn new(voices: Value) -> Self {
        Self {
            voices,
            tts_calls: AtomicUsize::new(0),
            voice_list_calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }
}

async fn tts(
    State(fake): State<Arc<FakeElevenLabs>>,
    Path(voice): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    fake.tts_calls.fetch_add(1, Ordering::SeqCst);
    let text = body["text"].as_str().unwrap_or_default().to_string();
    fake.requested.lock().unwrap().push((voice.clone(), text));

    match voice.as_str() {
        "broke" => StatusCode::TOO_MANY_REQUESTS.into_response(),
        "overloaded" => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"detail": {"message": "Model overloaded"}})),
        )
            .into_response(),
        v if v.starts_with("missing") => (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": {"message": "voice_not_found"}})),
        )
            .into_response(),
        _ => (StatusCode::OK, AUDIO.to_vec()).into_response(),
    }
}

async fn voices(State(fake): State<Arc<FakeElevenLabs>>) -> Json<Value> {
    fake.voice_list_calls.fetch_add(1, Ordering::SeqCst);
    Json(fake.voices.clone())
}

async fn start_fake(voice_list: Value) -> (Arc<FakeElevenLabs>, ElevenLabsSynthesizer) {
    let fake = Arc::new(FakeElevenLabs::new(voice_list));
    let app = Router::new()
        .route("/v1/text-to-speech/{voice}", post(tts))
        .route("/v1/voices", get(voices))
        .with_state(fake.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let synth = ElevenLabsSynthesizer::new(&SpeechConfig {
        api_key: Some("test-key".into()),
        base_url: Some(format!("http://{addr}")),
        ..SpeechConfig::default()
    });
    (fake, synth)
}

fn account_voices() -> Value {
    json!({"voices": [
        {"voice_id": "adam-id", "name": "Adam"},
        {"voice_id": "rachel-id", "name": "Rachel"}
    ]})
}

#[tokio::test]
async fn test_known_voice_single_request() {
    let (fake, synth) = start_fake(account_voices()).await;
    let audio = synth.synthesize("Greetings, traveler.", "ozS9N1i8sNqA3YvH014P").await.unwrap();
    assert_eq!(&audio[..], AUDIO);
    assert_eq!(fake.tts_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fake.voice_list_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_text_is_sanitized_before_sending() {
    let (fake, synth) = start_fake(account_voices()).await;
    synth.synthesize("  **Eureka** [2] ", "v1").await.unwrap();
    let requested = fake.requested.lock().unwrap().clone();
    assert_eq!(requested[0].1, "Eureka");
}

#[tokio::test]
async fn test_missing_voice_retries_exactly_once_with_rachel() {
    let (fake, synth) = start_fake(account_voices()).await;
    let audio = synth.synthesize("Hello", "missing-voice").await.unwrap();
    assert_eq!(&audio[..], AUDIO);
    assert_eq!(fake.tts_calls.load(Ordering::SeqCst), 2);

    let requested = fake.requested.lock().unwrap().clone();
    assert_eq!(requested[1].0, "rachel-id");
}

#[tokio::test]
async fn test_voice_list_fetched_once_per_synthesizer() {
    let (fake, synth) = start_fake(account_voices()).await;
    synth.synthesize("One", "missing-a").await.unwrap();
    synth.synthesize("Two", "missing-b").await.unwrap();
    assert_eq!(fake.voice_list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fake.tts_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_falls_back_to_first_voice_without_rachel() {
    let (fake, synth) = start_fake(json!({"voices": [
        {"voice_id": "bella-id", "name": "Bella"},
        {"voice_id": "josh-id", "name": "Josh"}
    ]}))
    .await;
    synth.synthesize("Hello", "missing-voice").await.unwrap();
    let requested = fake.requested.lock().unwrap().clone();
    assert_eq!(requested[1].0, "bella-id");
}

#[tokio::test]
async fn test_empty_voice_list_is_terminal() {
    let (fake, synth) = start_fake(json!({"voices": []})).await;
    let err = synth.synthesize("Hello", "missing-voice").await.unwrap_err();
    assert_eq!(err, SynthesisError::NoVoicesAvailable);
    assert_eq!(fake.tts_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fallback_voice_also_missing_is_terminal() {
    let (fake, synth) = start_fake(json!({"voices": [
        {"voice_id": "missing-too", "name": "Rachel"}
    ]}))
    .await;
    let err = synth.synthesize("Hello", "missing-voice").await.unwrap_err();
    assert!(matches!(err, SynthesisError::Provider { status: 404, .. }));
    assert_eq!(fake.tts_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rate_limited_maps_to_credit_error() {
    let (_fake, synth) = start_fake(account_voices()).await;
    let err = synth.synthesize("Hello", "broke").await.unwrap_err();
    assert_eq!(err, SynthesisError::InsufficientCredit { status: 429 });
    assert_eq!(err.to_string(), "Insufficient credit or invalid key");
}

#[tokio::test]
async fn test_other_status_uses_provider_message() {
    let (fake, synth) = start_fake(account_voices()).await;
    let err = synth.synthesize("Hello", "overloaded").await.unwrap_err();
    assert_eq!(err.to_string(), "Model overloaded");
    assert_eq!(fake.tts_calls.load(Ordering::SeqCst), 1);
}
