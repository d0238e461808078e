//! Axum Handlers for the REST API
//!
//! The HTTP boundary over the conversation machinery: create/reset a
//! conversation, poll for agent messages, deliver user replies (text or
//! audio), and drive interactive story turns. Uses `utoipa` doc comments
//! to generate OpenAPI documentation.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use storytime_core::EngineError;
use tracing::{error, warn};

use crate::{
    models::{
        ErrorResponse, InteractiveStoryPayload, InteractiveTurnResponse, MessagePayload,
        StartPayload, StartResponse, StateResponse, TranscriptionResponse,
    },
    runner,
    state::AppState,
    store::{OutboundMessage, StoreError},
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) | StoreError::Stale(_) => Self::NotFound(err.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::MissingTheme | EngineError::ChoiceRequired => {
                Self::BadRequest(err.to_string())
            }
            EngineError::Capability(inner) => Self::InternalServerError(inner.into()),
        }
    }
}

/// Create a conversation (or soft-reset an existing one) and schedule its
/// agent turn.
#[utoipa::path(
    post,
    path = "/start",
    request_body = StartPayload,
    responses(
        (status = 200, description = "Conversation created", body = StartResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn start(
    State(state): State<AppState>,
    Json(payload): Json<StartPayload>,
) -> Result<Json<StartResponse>, ApiError> {
    let (conversation_id, epoch) = state.store.create(payload.conversation_id).await;
    runner::spawn_turn(state.clone(), conversation_id.clone(), epoch);
    Ok(Json(StartResponse { conversation_id }))
}

/// Pop the oldest pending message for the user; `null` when nothing is
/// waiting. Audio messages come back with synthesized speech attached
/// when the speech capability cooperates.
#[utoipa::path(
    get,
    path = "/state/{conversation_id}",
    responses(
        (status = 200, description = "Oldest pending message, or null", body = StateResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse)
    ),
    params(("conversation_id" = String, Path, description = "Conversation ID"))
)]
pub async fn get_state(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Option<StateResponse>>, ApiError> {
    let message = state.store.pop_to_user(&conversation_id).await?;
    let response = match message {
        None => None,
        Some(OutboundMessage::Output { payload }) => Some(StateResponse::Output { payload }),
        Some(OutboundMessage::Audio { text }) => {
            let audio_b64 = match state.speech.synthesize(&text).await {
                Ok(bytes) => Some(BASE64.encode(bytes)),
                Err(err) => {
                    warn!(
                        capability = err.capability,
                        "speech synthesis failed, returning text only: {}", err.message
                    );
                    None
                }
            };
            Some(StateResponse::Audio { text, audio_b64 })
        }
    };
    Ok(Json(response))
}

/// Deliver a text reply from the user into the conversation.
#[utoipa::path(
    post,
    path = "/message/{conversation_id}",
    request_body = MessagePayload,
    responses(
        (status = 204, description = "Message queued for the agent"),
        (status = 404, description = "Conversation not found", body = ErrorResponse)
    ),
    params(("conversation_id" = String, Path, description = "Conversation ID"))
)]
pub async fn post_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(payload): Json<MessagePayload>,
) -> Result<StatusCode, ApiError> {
    state.store.post_to_agent(&conversation_id, payload.text).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Transcribe an uploaded audio recording and deliver the transcript to
/// the conversation.
#[utoipa::path(
    post,
    path = "/message/audio/{conversation_id}",
    responses(
        (status = 200, description = "Transcription queued for the agent", body = TranscriptionResponse),
        (status = 400, description = "No audio part in the upload", body = ErrorResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse),
        (status = 500, description = "Transcription failed", body = ErrorResponse)
    ),
    params(("conversation_id" = String, Path, description = "Conversation ID"))
)]
pub async fn post_audio_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<TranscriptionResponse>, ApiError> {
    // 404 before reading the body: unknown conversations shouldn't cost a
    // transcription call.
    state.store.snapshot(&conversation_id).await?;

    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
        .ok_or_else(|| ApiError::BadRequest("missing audio part".to_string()))?;
    let filename = field.file_name().unwrap_or("recording.wav").to_string();
    let audio = field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
        .to_vec();

    let transcription = state
        .speech
        .transcribe(audio, &filename)
        .await
        .map_err(|e| ApiError::InternalServerError(e.into()))?;
    state
        .store
        .post_to_agent(&conversation_id, transcription.clone())
        .await?;
    Ok(Json(TranscriptionResponse { transcription }))
}

/// Run one interactive story turn for the conversation and append the new
/// scene to its history.
#[utoipa::path(
    post,
    path = "/interactive_story/{conversation_id}",
    request_body = InteractiveStoryPayload,
    responses(
        (status = 200, description = "The next story turn", body = InteractiveTurnResponse),
        (status = 400, description = "Missing theme or choice", body = ErrorResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse),
        (status = 500, description = "Story generation failed", body = ErrorResponse)
    ),
    params(("conversation_id" = String, Path, description = "Conversation ID"))
)]
pub async fn interactive_story(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(payload): Json<InteractiveStoryPayload>,
) -> Result<Json<InteractiveTurnResponse>, ApiError> {
    let conversation = state.store.snapshot(&conversation_id).await?;
    let knowledge = conversation.knowledge.unwrap_or_default();

    let engine = state.story_engine();
    let illustrated = engine
        .illustrated_step(
            &conversation.story_history,
            &knowledge,
            payload.choice.as_deref(),
        )
        .await?;

    // Epoch-checked append: a turn computed against a replaced
    // conversation is dropped, not spliced into the fresh one.
    state
        .store
        .mutate_if_current(&conversation_id, conversation.epoch, |stored| {
            stored.story_history.push(illustrated.turn.scene_text.clone());
        })
        .await?;

    Ok(Json(illustrated.into()))
}
