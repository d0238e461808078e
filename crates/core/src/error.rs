//! Error taxonomy shared across the storytime workspace.

use std::fmt;

/// A failed call to an external generation or analysis service.
///
/// Capability failures are retryable by the caller; the retry helper in
/// [`crate::retry`] wraps them with bounded exponential backoff and turns
/// the final attempt's error into a terminal one.
#[derive(Debug)]
pub struct CapabilityError {
    /// Name of the capability that failed, e.g. `"story"` or `"image"`.
    pub capability: &'static str,
    /// Short human-readable reason, safe to log but not exposed verbatim
    /// over HTTP.
    pub message: String,
}

impl CapabilityError {
    pub fn new(capability: &'static str, err: impl fmt::Display) -> Self {
        Self {
            capability,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} capability failed: {}", self.capability, self.message)
    }
}

impl std::error::Error for CapabilityError {}

/// Errors produced by the interactive story engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The first turn of a story was requested without a theme to start from.
    #[error("a story theme is required to start an interactive story")]
    MissingTheme,
    /// A continuation turn was requested without the user's chosen path.
    #[error("a choice is required to continue an interactive story")]
    ChoiceRequired,
    #[error(transparent)]
    Capability(#[from] CapabilityError),
}
