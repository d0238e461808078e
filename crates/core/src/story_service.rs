//! Story generation: complete short stories and interactive continuations.

use crate::error::CapabilityError;
use crate::knowledge::Knowledge;
use crate::llm::{chat_json, chat_text};
use crate::story::{StoryDecisions, StoryTurn};
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;

#[async_trait]
pub trait StoryService: Send + Sync {
    /// Produces the next scene of an interactive story, plus two choices,
    /// or a closing scene with no choices when the story should end.
    async fn continue_story(
        &self,
        history: &[String],
        chosen_path: &str,
    ) -> Result<StoryTurn, CapabilityError>;

    /// Writes a complete short story around a theme, personalized with the
    /// family profile.
    async fn generate_story(
        &self,
        theme: &str,
        knowledge: &Knowledge,
    ) -> Result<String, CapabilityError>;
}

pub struct OpenAiStoryService {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiStoryService {
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

fn profile_summary(knowledge: &Knowledge) -> String {
    let mut parts = Vec::new();
    if let Some(child) = &knowledge.child {
        if let Some(name) = &child.name {
            parts.push(format!("the child is called {name}"));
        }
        if let Some(age) = child.age {
            parts.push(format!("aged {age}"));
        }
        if !child.likes.is_empty() {
            parts.push(format!("and loves {}", child.likes.join(", ")));
        }
    }
    if parts.is_empty() {
        "a young child".to_string()
    } else {
        parts.join(", ")
    }
}

#[async_trait]
impl StoryService for OpenAiStoryService {
    async fn continue_story(
        &self,
        history: &[String],
        chosen_path: &str,
    ) -> Result<StoryTurn, CapabilityError> {
        let system = "You are an interactive storyteller for children. Given the \
            story so far and the chosen path (or an initial topic), write the next \
            short scene of one to two paragraphs, then two distinct options for how \
            the story could continue. Keep the tone light and age-appropriate. \
            When the story has reached a natural ending, return the closing scene \
            with null decisions. Reply as JSON: {\"scene_text\": string, \
            \"decisions\": {\"option1\": string, \"option2\": string} | null}.";
        let user = if history.is_empty() {
            format!("Topic of the story: {chosen_path}")
        } else {
            format!(
                "Story so far:\n{}\n\nChosen path: {chosen_path}",
                history.join("\n\n")
            )
        };
        chat_json(&self.client, &self.model, "story", system, user).await
    }

    async fn generate_story(
        &self,
        theme: &str,
        knowledge: &Knowledge,
    ) -> Result<String, CapabilityError> {
        let system = "You write warm bedtime stories for children, a few hundred \
            words long, with a gentle arc and a reassuring ending.";
        let user = format!(
            "Write a short story about: {theme}. For context, {}.",
            profile_summary(knowledge)
        );
        chat_text(&self.client, &self.model, "story", system, user).await
    }
}

/// Deterministic storyteller: every story runs exactly three scenes.
pub struct MockStoryService;

#[async_trait]
impl StoryService for MockStoryService {
    async fn continue_story(
        &self,
        history: &[String],
        chosen_path: &str,
    ) -> Result<StoryTurn, CapabilityError> {
        let scene_number = history.len() + 1;
        let scene_text = format!("Scene {scene_number}: following \"{chosen_path}\".");
        let decisions = if scene_number >= 3 {
            None
        } else {
            Some(StoryDecisions {
                option1: format!("Explore the cave (scene {scene_number})"),
                option2: format!("Head for the hills (scene {scene_number})"),
            })
        };
        Ok(StoryTurn {
            scene_text,
            decisions,
        })
    }

    async fn generate_story(
        &self,
        theme: &str,
        knowledge: &Knowledge,
    ) -> Result<String, CapabilityError> {
        let hero = knowledge
            .child
            .as_ref()
            .and_then(|c| c.name.clone())
            .unwrap_or_else(|| "a curious child".to_string());
        Ok(format!(
            "Once upon a time, {hero} set off on an adventure about {theme}. \
             After a long day of wonders, everyone slept soundly. The end."
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_story_ends_on_the_third_scene() {
        let service = MockStoryService;
        let mut history = Vec::new();

        let first = service.continue_story(&history, "a dragon").await.unwrap();
        assert!(!first.is_terminal());
        history.push(first.scene_text);

        let second = service
            .continue_story(&history, "Explore the cave (scene 1)")
            .await
            .unwrap();
        assert!(!second.is_terminal());
        history.push(second.scene_text);

        let third = service
            .continue_story(&history, "Explore the cave (scene 2)")
            .await
            .unwrap();
        assert!(third.is_terminal());
    }

    #[tokio::test]
    async fn mock_full_story_mentions_the_child_and_theme() {
        let story = MockStoryService
            .generate_story("pirate ships", &Knowledge::preset())
            .await
            .unwrap();
        assert!(story.contains("Mila"));
        assert!(story.contains("pirate ships"));
    }

    #[test]
    fn profile_summary_handles_an_empty_profile() {
        assert_eq!(profile_summary(&Knowledge::default()), "a young child");
    }
}
