//! The agent turn runner.
//!
//! One orchestration pass per `/start`: onboard if the profile is missing,
//! ask what the user wants, then satisfy the request with the generation
//! capabilities. Every capability call is independently fallible: losing a
//! non-critical step (storyboard, images, audio, video, lesson, event)
//! only blanks that step's contribution, while losing the story itself
//! ends the turn with a spoken apology.

use crate::onboarding::{OnboardingError, run_onboarding};
use crate::state::AppState;
use crate::store::{OutboundMessage, StoreError};
use serde_json::Value;
use std::path::Path;
use storytime_core::{CapabilityError, FinalOutput, Knowledge, retry};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Channel(#[from] StoreError),
    #[error(transparent)]
    Onboarding(#[from] OnboardingError),
    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

/// What the user asked the assistant to do this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnRequest {
    /// Start an interactive story: one engine turn now, continuations via
    /// the interactive-story endpoint.
    InteractiveStory,
    /// Everything else: the full evening-plan pipeline.
    EveningPlan,
}

impl TurnRequest {
    fn classify(text: &str) -> Self {
        if text.to_lowercase().contains("interactive") {
            TurnRequest::InteractiveStory
        } else {
            TurnRequest::EveningPlan
        }
    }
}

/// Schedules the turn task for a conversation. The task holds only the id
/// and its spawn-time epoch; if the conversation is replaced mid-turn,
/// every later write goes stale and the task winds down quietly.
pub fn spawn_turn(state: AppState, id: String, epoch: u64) -> JoinHandle<()> {
    let span = tracing::info_span!("agent_turn", conversation_id = %id, epoch);
    tokio::spawn(
        async move {
            match run_turn(&state, &id, epoch).await {
                Ok(()) => info!("turn finished"),
                Err(TurnError::Channel(StoreError::Stale(_)))
                | Err(TurnError::Onboarding(OnboardingError::Channel(StoreError::Stale(_)))) => {
                    info!("conversation replaced; orphaned turn abandoned");
                }
                Err(err) => {
                    error!(error = ?err, "turn failed");
                    let _ = state
                        .store
                        .post_to_user(
                            &id,
                            epoch,
                            OutboundMessage::Audio {
                                text: "I'm sorry, something went wrong on my side. \
                                       Please try again in a moment."
                                    .to_string(),
                            },
                        )
                        .await;
                }
            }
        }
        .instrument(span),
    )
}

async fn run_turn(state: &AppState, id: &str, epoch: u64) -> Result<(), TurnError> {
    let knowledge = match state.store.snapshot(id).await?.knowledge {
        Some(knowledge) => knowledge,
        None => run_onboarding(state, id, epoch).await?,
    };

    state
        .store
        .post_to_user(
            id,
            epoch,
            OutboundMessage::Audio {
                text: "What would you like for this evening? I can tell a story, \
                       start an interactive one, or put together a little plan."
                    .to_string(),
            },
        )
        .await?;
    let request = state.store.await_from_agent(id, epoch).await?;

    let verdict =
        retry::with_backoff(&state.retry, || state.moderation.review(&request)).await?;
    if !verdict.allowed {
        info!(reason = %verdict.reason, "request rejected by moderation");
        state
            .store
            .post_to_user(
                id,
                epoch,
                OutboundMessage::Audio {
                    text: "That doesn't sound like something for a children's evening. \
                           Could we pick a friendlier idea?"
                        .to_string(),
                },
            )
            .await?;
        return Ok(());
    }

    match TurnRequest::classify(&request) {
        TurnRequest::InteractiveStory => {
            run_interactive_start(state, id, epoch, knowledge, &request).await
        }
        TurnRequest::EveningPlan => {
            run_evening_plan(state, id, epoch, knowledge, &request).await
        }
    }
}

/// Logs and swallows the failure of a non-critical pipeline step.
fn degrade<T>(step: &'static str, result: Result<T, CapabilityError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(step, capability = err.capability, "step degraded: {}", err.message);
            None
        }
    }
}

/// Performs exactly one interactive story turn; the follow-up turns come
/// in over the interactive-story endpoint.
async fn run_interactive_start(
    state: &AppState,
    id: &str,
    epoch: u64,
    mut knowledge: Knowledge,
    request: &str,
) -> Result<(), TurnError> {
    // The request text doubles as the theme when onboarding never got one.
    if knowledge.theme.is_none() {
        knowledge.theme = Some(request.to_string());
        let theme = knowledge.theme.clone();
        state
            .store
            .mutate_if_current(id, epoch, |conversation| {
                if let Some(stored) = conversation.knowledge.as_mut() {
                    stored.theme = theme;
                } else {
                    conversation.knowledge = Some(Knowledge {
                        theme,
                        ..Knowledge::default()
                    });
                }
            })
            .await?;
    }

    let engine = state.story_engine();
    let illustrated = engine
        .illustrated_step(&[], &knowledge, None)
        .await
        .map_err(|err| match err {
            storytime_core::EngineError::Capability(inner) => TurnError::Capability(inner),
            // Unreachable here: a theme was just ensured and history is
            // empty, but losing the turn beats panicking.
            other => TurnError::Capability(CapabilityError::new("story", other)),
        })?;

    state
        .store
        .mutate_if_current(id, epoch, |conversation| {
            conversation.story_history.push(illustrated.turn.scene_text.clone());
        })
        .await?;

    let final_output = FinalOutput {
        knowledge: Some(knowledge),
        interactive_story_start: Some(illustrated),
        plan_for_evening: Some(
            "An interactive story has begun; pick an option to continue it.".to_string(),
        ),
        ..FinalOutput::default()
    };
    publish_output(state, id, epoch, final_output).await?;
    Ok(())
}

/// The full story pipeline plus lesson, event and plan assembly.
async fn run_evening_plan(
    state: &AppState,
    id: &str,
    epoch: u64,
    knowledge: Knowledge,
    request: &str,
) -> Result<(), TurnError> {
    // The story is the critical step: nothing downstream works without it.
    let story = retry::with_backoff(&state.retry, || {
        state.story.generate_story(request, &knowledge)
    })
    .await?;

    let storyboard = degrade(
        "storyboard",
        retry::with_backoff(&state.retry, || state.storyboard.storyboard(&story)).await,
    );

    let story_image_paths = match &storyboard {
        Some(board) => degrade(
            "images",
            retry::with_backoff(&state.retry, || state.images.render_storyboard(board)).await,
        )
        .unwrap_or_default(),
        None => Vec::new(),
    };

    let audio_paths = match &storyboard {
        Some(board) => {
            let narrations: Vec<String> =
                board.scenes.iter().map(|s| s.narration.clone()).collect();
            degrade("audio", narrate(state, &narrations).await).unwrap_or_default()
        }
        None => degrade("audio", narrate(state, std::slice::from_ref(&story)).await)
            .unwrap_or_default(),
    };

    let video_urls = match (&state.video, story_image_paths.first()) {
        (Some(video), Some(hero)) => {
            degrade("video", video.animate(Path::new(hero)).await).unwrap_or_default()
        }
        _ => Vec::new(),
    };

    let lesson = degrade(
        "lesson",
        retry::with_backoff(&state.retry, || {
            state.planning.lesson_plan(&knowledge, request)
        })
        .await,
    );

    let child_age = knowledge.child.as_ref().and_then(|c| c.age);
    let city = knowledge.address.as_ref().and_then(|a| a.city.clone());
    let event = match (child_age, city) {
        (Some(age), Some(city)) => degrade(
            "event",
            retry::with_backoff(&state.retry, || state.planning.find_event(age, &city)).await,
        )
        .flatten(),
        _ => None,
    };

    let mut plan_lines = vec!["Tonight: read the story together.".to_string()];
    if lesson.is_some() {
        plan_lines.push("Then try the mini-lesson.".to_string());
    }
    if let Some(event) = &event {
        plan_lines.push(format!("Tomorrow, consider going to {}.", event.name));
    }

    let final_output = FinalOutput {
        story: Some(story),
        story_image_paths,
        audio_paths,
        video_urls,
        lesson,
        plan_for_evening: Some(plan_lines.join(" ")),
        knowledge: Some(knowledge),
        event,
        interactive_story_start: None,
    };
    publish_output(state, id, epoch, final_output).await?;
    Ok(())
}

/// Synthesizes one audio file per text, writing them under the media dir.
async fn narrate(state: &AppState, texts: &[String]) -> Result<Vec<String>, CapabilityError> {
    let batch_dir = state.config.media_dir.join("audio").join(Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&batch_dir)
        .await
        .map_err(|e| CapabilityError::new("speech", e))?;

    let mut paths = Vec::with_capacity(texts.len());
    for (i, text) in texts.iter().enumerate() {
        let bytes = retry::with_backoff(&state.retry, || state.speech.synthesize(text)).await?;
        let path = batch_dir.join(format!("audio_{i}.mp3"));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| CapabilityError::new("speech", e))?;
        paths.push(path.display().to_string());
    }
    Ok(paths)
}

/// Publishes the turn result: an `Output` message on the channel plus a
/// merge into the conversation's output accumulator. Only keys this turn
/// actually produced are written; empty and null fields never clobber
/// values an earlier producer left behind.
async fn publish_output(
    state: &AppState,
    id: &str,
    epoch: u64,
    final_output: FinalOutput,
) -> Result<(), StoreError> {
    let payload = serde_json::to_value(&final_output).unwrap_or_default();

    state
        .store
        .mutate_if_current(id, epoch, |conversation| {
            if let Value::Object(map) = payload.clone() {
                for (key, value) in map {
                    let empty = value.is_null()
                        || matches!(&value, Value::Array(items) if items.is_empty());
                    if !empty {
                        conversation.outputs.insert(key, value);
                    }
                }
            }
        })
        .await?;

    state
        .store
        .post_to_user(id, epoch, OutboundMessage::Output { payload })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CapabilityMode, Config};
    use crate::store::ConversationStore;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use storytime_core::Storyboard;
    use storytime_core::knowledge_service::MockKnowledgeService;
    use storytime_core::media::{ImageService, MockImageService, MockSpeechService, MockVideoService};
    use storytime_core::moderation::MockModerationService;
    use storytime_core::planning::MockPlanningService;
    use storytime_core::retry::RetryPolicy;
    use storytime_core::story_service::MockStoryService;
    use storytime_core::storyboard::MockStoryboardService;

    struct FailingImageService;

    #[async_trait]
    impl ImageService for FailingImageService {
        async fn render_storyboard(
            &self,
            _storyboard: &Storyboard,
        ) -> Result<Vec<String>, CapabilityError> {
            Err(CapabilityError::new("image", "quota exhausted"))
        }
    }

    fn test_config() -> Config {
        Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            capability_mode: CapabilityMode::Mock,
            openai_api_key: None,
            runway_api_key: None,
            chat_model: "test".to_string(),
            image_model: "test".to_string(),
            tts_model: "test".to_string(),
            transcription_model: "test".to_string(),
            media_dir: std::env::temp_dir().join("storytime-tests"),
            onboarding_preset: true,
            onboarding_question_cap: 20,
            channel_poll_interval: Duration::from_millis(5),
            illustrate_story: true,
            log_level: tracing::Level::INFO,
        }
    }

    fn mock_state(images: Arc<dyn ImageService>) -> AppState {
        let config = test_config();
        AppState {
            store: Arc::new(ConversationStore::new(config.channel_poll_interval)),
            knowledge: Arc::new(MockKnowledgeService),
            story: Arc::new(MockStoryService),
            storyboard: Arc::new(MockStoryboardService),
            images,
            speech: Arc::new(MockSpeechService),
            video: Some(Arc::new(MockVideoService)),
            moderation: Arc::new(MockModerationService),
            planning: Arc::new(MockPlanningService),
            retry: RetryPolicy {
                max_attempts: 2,
                ..RetryPolicy::default()
            },
            config: Arc::new(config),
        }
    }

    /// Waits for the next user-bound message, answering nothing.
    async fn next_message(state: &AppState, id: &str) -> OutboundMessage {
        loop {
            if let Some(message) = state.store.pop_to_user(id).await.unwrap() {
                return message;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Runs a full turn against preset knowledge and returns the final
    /// `Output` payload.
    async fn run_with_request(state: &AppState, request: &str) -> (String, Value) {
        let (id, epoch) = state.store.create(None).await;
        let handle = spawn_turn(state.clone(), id.clone(), epoch);

        // Greeting (the preset skips onboarding), then the request goes in.
        match next_message(state, &id).await {
            OutboundMessage::Audio { .. } => {}
            other => panic!("expected a greeting, got {other:?}"),
        }
        state.store.post_to_agent(&id, request.to_string()).await.unwrap();

        let payload = loop {
            match next_message(state, &id).await {
                OutboundMessage::Output { payload } => break payload,
                OutboundMessage::Audio { .. } => {}
            }
        };
        handle.await.unwrap();
        (id, payload)
    }

    #[test]
    fn requests_mentioning_interactive_start_the_story_loop() {
        assert_eq!(
            TurnRequest::classify("An INTERACTIVE story about dragons, please"),
            TurnRequest::InteractiveStory
        );
        assert_eq!(
            TurnRequest::classify("a bedtime story about dragons"),
            TurnRequest::EveningPlan
        );
    }

    #[tokio::test(start_paused = true)]
    async fn full_turn_assembles_story_plan_and_media() {
        let state = mock_state(Arc::new(MockImageService));
        let (id, payload) = run_with_request(&state, "a story about the sea").await;

        assert!(payload["story"].as_str().unwrap().contains("the sea"));
        assert!(!payload["story_image_paths"].as_array().unwrap().is_empty());
        assert!(!payload["video_urls"].as_array().unwrap().is_empty());
        assert!(payload["lesson"].is_string());
        assert!(payload["event"].is_object());

        let conversation = state.store.snapshot(&id).await.unwrap();
        assert!(conversation.outputs.contains_key("story"));
        assert!(conversation.outputs.contains_key("knowledge"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_images_degrade_without_losing_the_story() {
        let state = mock_state(Arc::new(FailingImageService));
        let (id, payload) = run_with_request(&state, "a story about the moon").await;

        assert!(payload["story"].as_str().unwrap().contains("the moon"));
        assert!(payload["story_image_paths"].as_array().unwrap().is_empty());
        // No hero image means no video either; the turn still completed.
        assert!(payload["video_urls"].as_array().unwrap().is_empty());

        let conversation = state.store.snapshot(&id).await.unwrap();
        assert!(conversation.outputs.contains_key("story"));
        assert!(!conversation.outputs.contains_key("story_image_paths"));
    }

    #[tokio::test(start_paused = true)]
    async fn interactive_requests_run_exactly_one_engine_turn() {
        let state = mock_state(Arc::new(MockImageService));
        let (id, payload) =
            run_with_request(&state, "an interactive story about space pirates").await;

        let start = &payload["interactive_story_start"];
        assert!(start["scene_text"].as_str().unwrap().starts_with("Scene 1"));
        assert!(start["decisions"].is_object());

        let conversation = state.store.snapshot(&id).await.unwrap();
        assert_eq!(conversation.story_history.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn moderated_requests_get_a_refusal_and_no_output() {
        let state = mock_state(Arc::new(MockImageService));
        let (id, epoch) = state.store.create(None).await;
        let handle = spawn_turn(state.clone(), id.clone(), epoch);

        match next_message(&state, &id).await {
            OutboundMessage::Audio { .. } => {}
            other => panic!("expected a greeting, got {other:?}"),
        }
        state
            .store
            .post_to_agent(&id, "a violent story".to_string())
            .await
            .unwrap();

        match next_message(&state, &id).await {
            OutboundMessage::Audio { text } => assert!(text.contains("friendlier")),
            other => panic!("expected a refusal, got {other:?}"),
        }
        handle.await.unwrap();

        let conversation = state.store.snapshot(&id).await.unwrap();
        assert!(!conversation.outputs.contains_key("story"));
    }
}
