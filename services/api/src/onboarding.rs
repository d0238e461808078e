//! The onboarding question/answer loop.
//!
//! Fills in the family profile before any generation starts: one opening
//! prompt, one free-text description, then single questions until the
//! profile has no load-bearing gaps. The conversation's message channels
//! are the only link to the user, so the flow suspends between question
//! and answer while unrelated conversations keep running.

use crate::state::AppState;
use crate::store::{OutboundMessage, StoreError};
use storytime_core::{CapabilityError, Knowledge, retry};
use tracing::{info, instrument};

#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    /// The question loop hit its configured cap without completing the
    /// profile. Recoverable: restarting the conversation restarts
    /// onboarding.
    #[error("onboarding did not complete within {asked} questions")]
    Incomplete { asked: u32 },
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error(transparent)]
    Channel(#[from] StoreError),
}

/// Runs onboarding for one conversation and records the resulting profile
/// in it (both as `knowledge` and under `outputs["knowledge"]`).
///
/// The loop asks whatever the question capability proposes; when the
/// capability has nothing left but a load-bearing field is still empty, a
/// fixed fallback question for that field keeps the loop going. The
/// configured question cap bounds the loop against a capability that
/// never runs out of questions.
#[instrument(skip(state), fields(conversation_id = %id))]
pub async fn run_onboarding(
    state: &AppState,
    id: &str,
    epoch: u64,
) -> Result<Knowledge, OnboardingError> {
    if state.config.onboarding_preset {
        info!("onboarding bypassed by preset configuration");
        let knowledge = Knowledge::preset();
        record_knowledge(state, id, epoch, &knowledge).await?;
        return Ok(knowledge);
    }

    state
        .store
        .post_to_user(
            id,
            epoch,
            OutboundMessage::Audio {
                text: "Hi! Tell me a little about yourself and your child.".to_string(),
            },
        )
        .await?;
    let description = state.store.await_from_agent(id, epoch).await?;

    let mut knowledge = retry::with_backoff(&state.retry, || {
        state.knowledge.initial_knowledge(&description)
    })
    .await?;

    let cap = state.config.onboarding_question_cap;
    let mut asked = 0u32;
    loop {
        let proposed = retry::with_backoff(&state.retry, || {
            state.knowledge.follow_up_question(&knowledge)
        })
        .await?;

        // The capability saying "done" is not enough: any still-missing
        // load-bearing field gets one more question.
        let question = match proposed {
            Some(question) => question,
            None => match knowledge.missing_fields().first() {
                Some(field) => field.fallback_question().to_string(),
                None => break,
            },
        };

        if asked >= cap {
            return Err(OnboardingError::Incomplete { asked });
        }

        state
            .store
            .post_to_user(id, epoch, OutboundMessage::Audio { text: question.clone() })
            .await?;
        let answer = state.store.await_from_agent(id, epoch).await?;

        knowledge = retry::with_backoff(&state.retry, || {
            state.knowledge.apply_answer(&knowledge, &question, &answer)
        })
        .await?;
        asked += 1;
    }

    info!(questions = asked, "onboarding complete");
    record_knowledge(state, id, epoch, &knowledge).await?;
    Ok(knowledge)
}

async fn record_knowledge(
    state: &AppState,
    id: &str,
    epoch: u64,
    knowledge: &Knowledge,
) -> Result<(), StoreError> {
    let as_json = serde_json::to_value(knowledge).unwrap_or_default();
    state
        .store
        .mutate_if_current(id, epoch, |conversation| {
            conversation.knowledge = Some(knowledge.clone());
            conversation.outputs.insert("knowledge".to_string(), as_json);
        })
        .await
}
