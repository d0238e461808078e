//! Story, storyboard and final-output data structures.

use crate::knowledge::Knowledge;
use serde::{Deserialize, Serialize};

/// The two continuation choices offered after a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryDecisions {
    pub option1: String,
    pub option2: String,
}

/// One unit of interactive-story output.
///
/// `decisions` being absent is the sole signal that the story has ended;
/// callers must not request another turn after seeing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryTurn {
    pub scene_text: String,
    pub decisions: Option<StoryDecisions>,
}

impl StoryTurn {
    pub fn is_terminal(&self) -> bool {
        self.decisions.is_none()
    }
}

/// A `StoryTurn` with illustrations attached by the media sub-step.
///
/// `image_paths` is empty when illustration was disabled or failed; the
/// text turn is always intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IllustratedTurn {
    #[serde(flatten)]
    pub turn: StoryTurn,
    #[serde(default)]
    pub image_paths: Vec<String>,
}

/// One illustratable moment of a story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryboardScene {
    pub title: String,
    pub narration: String,
    pub image_prompt: String,
}

/// A story broken down for illustration: a reusable description of the
/// main character plus up to seven key scenes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storyboard {
    pub main_character_description: String,
    pub scenes: Vec<StoryboardScene>,
}

/// A local event suggestion for the child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventModel {
    pub name: String,
    pub description: String,
    pub justification: String,
    #[serde(default)]
    pub estimated_cost: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub booking_url: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Pass/fail result of a moderation check over user-supplied text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub allowed: bool,
    pub reason: String,
}

/// The flat result record a full evening-plan turn assembles from its
/// capability calls. Optional fields belong to degradable steps: a failed
/// image or video call leaves its field empty without invalidating the
/// rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalOutput {
    pub story: Option<String>,
    #[serde(default)]
    pub story_image_paths: Vec<String>,
    #[serde(default)]
    pub audio_paths: Vec<String>,
    #[serde(default)]
    pub video_urls: Vec<String>,
    pub lesson: Option<String>,
    pub plan_for_evening: Option<String>,
    pub knowledge: Option<Knowledge>,
    pub event: Option<EventModel>,
    pub interactive_story_start: Option<IllustratedTurn>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_without_decisions_is_terminal() {
        let terminal = StoryTurn {
            scene_text: "The end.".to_string(),
            decisions: None,
        };
        assert!(terminal.is_terminal());

        let open = StoryTurn {
            scene_text: "A fork in the road.".to_string(),
            decisions: Some(StoryDecisions {
                option1: "Go left".to_string(),
                option2: "Go right".to_string(),
            }),
        };
        assert!(!open.is_terminal());
    }

    #[test]
    fn illustrated_turn_flattens_the_inner_turn() {
        let illustrated = IllustratedTurn {
            turn: StoryTurn {
                scene_text: "Scene".to_string(),
                decisions: None,
            },
            image_paths: vec!["img_0.png".to_string()],
        };
        let json = serde_json::to_value(&illustrated).unwrap();
        assert_eq!(json["scene_text"], "Scene");
        assert_eq!(json["image_paths"][0], "img_0.png");
    }

    #[test]
    fn event_model_optional_fields_default_to_none() {
        let json = r#"{"name": "Museum night", "description": "d", "justification": "j"}"#;
        let event: EventModel = serde_json::from_str(json).unwrap();
        assert!(event.estimated_cost.is_none());
        assert!(event.booking_url.is_none());
    }
}
