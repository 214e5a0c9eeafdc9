//! `/api/*` route handlers.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{debug, info};

use timedial_core::persona::PersonaRoster;
use timedial_core::protocol::{
    ChatRequest, ChatResponse, PortraitRequest, PortraitResponse, SpeechRequest,
};
use timedial_core::types::HistoryTurn;
use timedial_providers::ReplyRequest;

use crate::error::ApiError;
use crate::state::GatewayState;

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/api/personas", get(personas))
        .route("/api/chat", post(chat))
        .route("/api/speech", post(speech))
        .route("/api/portrait", post(portrait))
}

async fn personas(State(state): State<Arc<GatewayState>>) -> Json<PersonaRoster> {
    Json(state.roster.clone())
}

async fn chat(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    debug!(history = body.history.len(), "Chat request");

    let request = ReplyRequest {
        user_text: body.prompt,
        instructions: body.system_instruction,
        history: body.history.iter().map(HistoryTurn::from).collect(),
    };
    let reply = state.replies.fetch_reply(&request).await;

    Ok(Json(ChatResponse {
        text: reply.text,
        sources: reply.sources,
    }))
}

async fn speech(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let audio = state.speech.synthesize(&body.text, &body.voice_id).await?;
    info!(voice = %body.voice_id, bytes = audio.len(), "Speech synthesized");
    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}

async fn portrait(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<PortraitRequest>, JsonRejection>,
) -> Result<Json<PortraitResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let image = state
        .portraits
        .generate_portrait(&body.name, &body.description)
        .await;
    Ok(Json(PortraitResponse { image }))
}
