//! storytime-core
//!
//! Domain types and capability clients for the storytime assistant: the
//! family profile collected during onboarding, story/storyboard/output
//! records, the interactive story engine, and one trait per external
//! generation capability with an OpenAI-backed client and a deterministic
//! mock each.

pub mod error;
pub mod interactive;
pub mod knowledge;
pub mod knowledge_service;
mod llm;
pub mod media;
pub mod moderation;
pub mod planning;
pub mod retry;
pub mod story;
pub mod story_service;
pub mod storyboard;

pub use error::{CapabilityError, EngineError};
pub use knowledge::{Address, Knowledge, MissingField, PersonEntry};
pub use story::{
    EventModel, FinalOutput, IllustratedTurn, ModerationVerdict, StoryDecisions, StoryTurn,
    Storyboard, StoryboardScene,
};
