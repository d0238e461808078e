//! Storyboarding: breaking a story into illustratable scenes.

use crate::error::CapabilityError;
use crate::llm::chat_json;
use crate::story::{Storyboard, StoryboardScene};
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;

/// Upper bound on scenes per storyboard; more would drown the reader in
/// pictures and the image budget in requests.
pub const MAX_SCENES: usize = 7;

#[async_trait]
pub trait StoryboardService: Send + Sync {
    async fn storyboard(&self, story: &str) -> Result<Storyboard, CapabilityError>;
}

pub struct OpenAiStoryboardService {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiStoryboardService {
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl StoryboardService for OpenAiStoryboardService {
    async fn storyboard(&self, story: &str) -> Result<Storyboard, CapabilityError> {
        let system = format!(
            "You design illustrated children's storybooks. Given a story, \
             describe the main character visually, then pick up to {MAX_SCENES} key \
             moments (including the setup and the final scene). For each, give a \
             short page title, the narration for that page, and a whimsical, \
             colorful image prompt. Reply as JSON: \
             {{\"main_character_description\": string, \"scenes\": \
             [{{\"title\": string, \"narration\": string, \"image_prompt\": string}}]}}."
        );
        let mut storyboard: Storyboard = chat_json(
            &self.client,
            &self.model,
            "storyboard",
            &system,
            format!("The story is as follows:\n{story}"),
        )
        .await?;
        storyboard.scenes.truncate(MAX_SCENES);
        Ok(storyboard)
    }
}

/// Deterministic storyboard: one scene per paragraph, capped.
pub struct MockStoryboardService;

#[async_trait]
impl StoryboardService for MockStoryboardService {
    async fn storyboard(&self, story: &str) -> Result<Storyboard, CapabilityError> {
        let scenes: Vec<StoryboardScene> = story
            .split("\n\n")
            .filter(|p| !p.trim().is_empty())
            .take(MAX_SCENES)
            .enumerate()
            .map(|(i, paragraph)| StoryboardScene {
                title: format!("Page {}", i + 1),
                narration: paragraph.trim().to_string(),
                image_prompt: format!("Children's book illustration of: {}", paragraph.trim()),
            })
            .collect();
        Ok(Storyboard {
            main_character_description: "A small, friendly hero with bright eyes".to_string(),
            scenes,
        })
    }
}
