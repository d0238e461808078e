//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        DecisionsDto, ErrorResponse, InteractiveStoryPayload, InteractiveTurnResponse,
        MessagePayload, StartPayload, StartResponse, StateResponse, TranscriptionResponse,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::start,
        handlers::get_state,
        handlers::post_message,
        handlers::post_audio_message,
        handlers::interactive_story,
    ),
    components(
        schemas(
            StartPayload,
            StartResponse,
            StateResponse,
            MessagePayload,
            TranscriptionResponse,
            InteractiveStoryPayload,
            InteractiveTurnResponse,
            DecisionsDto,
            ErrorResponse
        )
    ),
    tags(
        (name = "storytime API", description = "Conversation management for the storytime parent assistant")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: AppState) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/start", post(handlers::start))
        .route("/state/{conversation_id}", get(handlers::get_state))
        .route("/message/{conversation_id}", post(handlers::post_message))
        .route(
            "/message/audio/{conversation_id}",
            post(handlers::post_audio_message),
        )
        .route(
            "/interactive_story/{conversation_id}",
            post(handlers::interactive_story),
        )
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Merge the stateful routes with the stateless Swagger UI.
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
