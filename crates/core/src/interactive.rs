//! The interactive story engine.
//!
//! A restartable step function: all story state lives with the caller, so
//! an engine instance can serve any number of conversations concurrently.
//! Each call produces one `StoryTurn`; the caller appends the scene to its
//! history before the next call, and must stop once a turn arrives with no
//! decisions.

use crate::error::EngineError;
use crate::knowledge::Knowledge;
use crate::media::ImageService;
use crate::story::{IllustratedTurn, StoryTurn};
use crate::story_service::StoryService;
use crate::storyboard::StoryboardService;
use std::sync::Arc;
use tracing::warn;

struct Illustrator {
    storyboard: Arc<dyn StoryboardService>,
    images: Arc<dyn ImageService>,
}

pub struct InteractiveStoryEngine {
    story: Arc<dyn StoryService>,
    illustrator: Option<Illustrator>,
}

impl InteractiveStoryEngine {
    pub fn new(story: Arc<dyn StoryService>) -> Self {
        Self {
            story,
            illustrator: None,
        }
    }

    /// Enables the illustration sub-step: each scene gets a storyboard and
    /// generated images attached.
    pub fn with_illustration(
        mut self,
        storyboard: Arc<dyn StoryboardService>,
        images: Arc<dyn ImageService>,
    ) -> Self {
        self.illustrator = Some(Illustrator { storyboard, images });
        self
    }

    /// Produces the next turn of a story.
    ///
    /// The path handed to the story capability is, in order of preference:
    /// the caller's `chosen_path` verbatim; for a first turn without one,
    /// the profile's theme (`MissingTheme` if absent). A continuation turn
    /// without a choice is refused with `ChoiceRequired`.
    pub async fn step(
        &self,
        history: &[String],
        knowledge: &Knowledge,
        chosen_path: Option<&str>,
    ) -> Result<StoryTurn, EngineError> {
        let path = match chosen_path {
            Some(path) => path.to_string(),
            None if history.is_empty() => knowledge
                .theme
                .clone()
                .ok_or(EngineError::MissingTheme)?,
            None => return Err(EngineError::ChoiceRequired),
        };
        Ok(self.story.continue_story(history, &path).await?)
    }

    /// Like [`step`](Self::step), but additionally storyboards the new
    /// scene (not the full history) and renders images for it. A failure
    /// anywhere in the illustration sub-step degrades to a text-only turn;
    /// the scene itself is never lost.
    pub async fn illustrated_step(
        &self,
        history: &[String],
        knowledge: &Knowledge,
        chosen_path: Option<&str>,
    ) -> Result<IllustratedTurn, EngineError> {
        let turn = self.step(history, knowledge, chosen_path).await?;

        let image_paths = match &self.illustrator {
            Some(illustrator) => match Self::illustrate(illustrator, &turn.scene_text).await {
                Ok(paths) => paths,
                Err(err) => {
                    warn!(capability = err.capability, "illustration degraded to text-only: {}", err.message);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        Ok(IllustratedTurn { turn, image_paths })
    }

    async fn illustrate(
        illustrator: &Illustrator,
        scene_text: &str,
    ) -> Result<Vec<String>, crate::error::CapabilityError> {
        let storyboard = illustrator.storyboard.storyboard(scene_text).await?;
        illustrator.images.render_storyboard(&storyboard).await
    }
}
