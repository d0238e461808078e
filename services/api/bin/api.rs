//! Main Entrypoint for the storytime API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the conversation store and capability clients.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use storytime_api::{
    config::{CapabilityMode, Config},
    router::create_router,
    state::AppState,
    store::ConversationStore,
};
use storytime_core::{
    knowledge_service::{MockKnowledgeService, OpenAiKnowledgeService},
    media::{
        MockImageService, MockSpeechService, MockVideoService, OpenAiImageService,
        OpenAiSpeechService, RunwayVideoService, VideoService,
    },
    moderation::{MockModerationService, OpenAiModerationService},
    planning::{MockPlanningService, OpenAiPlanningService},
    retry::RetryPolicy,
    story_service::{MockStoryService, OpenAiStoryService},
    storyboard::{MockStoryboardService, OpenAiStoryboardService},
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

fn build_state(config: Config) -> AppState {
    let store = Arc::new(ConversationStore::new(config.channel_poll_interval));

    match config.capability_mode {
        CapabilityMode::OpenAi => {
            info!("Using OpenAI-backed capabilities.");
            let api_key = config.openai_api_key.clone().unwrap_or_default();
            let openai = OpenAIConfig::new().with_api_key(api_key);
            let video: Option<Arc<dyn VideoService>> = config
                .runway_api_key
                .clone()
                .map(|key| Arc::new(RunwayVideoService::new(key)) as Arc<dyn VideoService>);
            AppState {
                store,
                knowledge: Arc::new(OpenAiKnowledgeService::new(
                    openai.clone(),
                    config.chat_model.clone(),
                )),
                story: Arc::new(OpenAiStoryService::new(
                    openai.clone(),
                    config.chat_model.clone(),
                )),
                storyboard: Arc::new(OpenAiStoryboardService::new(
                    openai.clone(),
                    config.chat_model.clone(),
                )),
                images: Arc::new(OpenAiImageService::new(
                    openai.clone(),
                    config.image_model.clone(),
                    config.media_dir.join("images"),
                )),
                speech: Arc::new(OpenAiSpeechService::new(
                    openai.clone(),
                    config.tts_model.clone(),
                    config.transcription_model.clone(),
                )),
                video,
                moderation: Arc::new(OpenAiModerationService::new(
                    openai.clone(),
                    config.chat_model.clone(),
                )),
                planning: Arc::new(OpenAiPlanningService::new(
                    openai,
                    config.chat_model.clone(),
                )),
                retry: RetryPolicy::default(),
                config: Arc::new(config),
            }
        }
        CapabilityMode::Mock => {
            info!("Using mock capabilities; no external calls will be made.");
            AppState {
                store,
                knowledge: Arc::new(MockKnowledgeService),
                story: Arc::new(MockStoryService),
                storyboard: Arc::new(MockStoryboardService),
                images: Arc::new(MockImageService),
                speech: Arc::new(MockSpeechService),
                video: Some(Arc::new(MockVideoService)),
                moderation: Arc::new(MockModerationService),
                planning: Arc::new(MockPlanningService),
                retry: RetryPolicy::default(),
                config: Arc::new(config),
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let bind_address = config.bind_address;
    let capability_mode = config.capability_mode.clone();
    let app_state = build_state(config);

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        capabilities = ?capability_mode,
        bind_address = %bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
