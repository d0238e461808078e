//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the conversation
//! store and all capability clients behind trait objects.

use crate::config::Config;
use crate::store::ConversationStore;
use std::sync::Arc;
use storytime_core::{
    interactive::InteractiveStoryEngine,
    knowledge_service::KnowledgeService,
    media::{ImageService, SpeechService, VideoService},
    moderation::ModerationService,
    planning::PlanningService,
    retry::RetryPolicy,
    story_service::StoryService,
    storyboard::StoryboardService,
};

/// The shared application state, created once at startup and passed to all
/// handlers and turn tasks.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ConversationStore>,
    pub knowledge: Arc<dyn KnowledgeService>,
    pub story: Arc<dyn StoryService>,
    pub storyboard: Arc<dyn StoryboardService>,
    pub images: Arc<dyn ImageService>,
    pub speech: Arc<dyn SpeechService>,
    /// Optional: video generation is skipped entirely when unconfigured.
    pub video: Option<Arc<dyn VideoService>>,
    pub moderation: Arc<dyn ModerationService>,
    pub planning: Arc<dyn PlanningService>,
    pub retry: RetryPolicy,
    pub config: Arc<Config>,
}

impl AppState {
    /// Builds the interactive story engine for this state, with
    /// illustration wired in when configured.
    pub fn story_engine(&self) -> InteractiveStoryEngine {
        let engine = InteractiveStoryEngine::new(self.story.clone());
        if self.config.illustrate_story {
            engine.with_illustration(self.storyboard.clone(), self.images.clone())
        } else {
            engine
        }
    }
}
