//! `timedial doctor`: check configuration, credentials and the backend.

use std::path::Path;
use std::time::Duration;

use timedial_core::config::Config;
use timedial_core::protocol::HealthResponse;

fn mark(ok: bool) -> &'static str {
    if ok { "ok" } else { "missing" }
}

async fn check_backend(url: &str) -> Result<HealthResponse, String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| e.to_string())?;
    let resp = client
        .get(format!("{}/health", url.trim_end_matches('/')))
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        return Err(format!("status {}", resp.status()));
    }
    resp.json().await.map_err(|e| e.to_string())
}

pub async fn run(config: &Config, config_path: &Path) -> anyhow::Result<()> {
    println!("TimeDial v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "Config: {} ({})",
        config_path.display(),
        if config_path.exists() { "found" } else { "defaults" }
    );

    let roster = config.roster();
    println!("Personas: {}", roster.len());
    println!("Google key: {}", mark(config.google().resolve_api_key().is_some()));
    println!("ElevenLabs key: {}", mark(config.speech().resolve_api_key().is_some()));
    let transcription = config.transcription();
    println!(
        "Transcription ({}): {}",
        transcription.provider,
        mark(transcription.resolve_api_key().is_some())
    );

    let static_dir = config.static_dir();
    println!(
        "Front-end: {} ({})",
        static_dir.display(),
        if static_dir.is_dir() { "found" } else { "not built" }
    );

    if let Some(url) = config.backend_url() {
        match check_backend(&url).await {
            Ok(health) => println!("Backend {url}: {} (v{})", health.status, health.version),
            Err(e) => println!("Backend {url}: unreachable ({e})"),
        }
    }

    let (warnings, errors) = config.validate();
    for w in &warnings {
        println!("warning: {w}");
    }
    for e in &errors {
        println!("error: {e}");
    }
    if !errors.is_empty() {
        anyhow::bail!("{} configuration error(s)", errors.len());
    }
    println!("No problems found.");
    Ok(())
}
