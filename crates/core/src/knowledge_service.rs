//! Knowledge extraction, follow-up questions and knowledge updates.
//!
//! Three operations behind one trait because they share the same state:
//! build an initial profile from a free-text description, propose the next
//! onboarding question (or none), and fold an answer back into the
//! profile.

use crate::error::CapabilityError;
use crate::knowledge::{Address, Knowledge, MissingField, PersonEntry};
use crate::llm::chat_json;
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;
use serde::Deserialize;

#[async_trait]
pub trait KnowledgeService: Send + Sync {
    /// Derives an initial profile from a family's free-text description.
    async fn initial_knowledge(&self, description: &str) -> Result<Knowledge, CapabilityError>;

    /// Proposes the next single question to ask, or `None` when the
    /// service considers the profile complete.
    async fn follow_up_question(
        &self,
        knowledge: &Knowledge,
    ) -> Result<Option<String>, CapabilityError>;

    /// Folds a question/answer pair into the profile.
    async fn apply_answer(
        &self,
        knowledge: &Knowledge,
        question: &str,
        answer: &str,
    ) -> Result<Knowledge, CapabilityError>;
}

/// LLM-backed implementation using one JSON-mode chat call per operation.
pub struct OpenAiKnowledgeService {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiKnowledgeService {
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[derive(Deserialize)]
struct FollowUpReply {
    follow_up: Option<String>,
}

const PROFILE_SHAPE: &str = r#"Reply with a JSON object shaped as:
{"address": {"country": string|null, "city": string|null} | null,
 "parent": {"name": string|null, "age": number|null, "likes": [string], "dislikes": [string]} | null,
 "child": {"name": string|null, "age": number|null, "likes": [string], "dislikes": [string]} | null,
 "theme": string|null}
Leave unknown fields null rather than guessing. There is a single child."#;

#[async_trait]
impl KnowledgeService for OpenAiKnowledgeService {
    async fn initial_knowledge(&self, description: &str) -> Result<Knowledge, CapabilityError> {
        let system = format!(
            "You build a family profile for a children's story assistant \
             from a free-text description of a parent and child. {PROFILE_SHAPE}"
        );
        chat_json(
            &self.client,
            &self.model,
            "knowledge",
            &system,
            format!("Description: {description}"),
        )
        .await
    }

    async fn follow_up_question(
        &self,
        knowledge: &Knowledge,
    ) -> Result<Option<String>, CapabilityError> {
        let system = "You are onboarding a family for a children's story assistant. \
            Given the current profile, ask the single most useful next question. \
            Ask one thing at a time and keep personal details separate from interests. \
            For the address, only city and country are wanted. \
            Reply as JSON: {\"follow_up\": string | null}; null when nothing is missing.";
        let state = serde_json::to_string(knowledge)
            .map_err(|e| CapabilityError::new("knowledge", e))?;
        let reply: FollowUpReply = chat_json(
            &self.client,
            &self.model,
            "knowledge",
            system,
            format!("Current profile: {state}"),
        )
        .await?;
        Ok(reply.follow_up.filter(|q| !q.trim().is_empty()))
    }

    async fn apply_answer(
        &self,
        knowledge: &Knowledge,
        question: &str,
        answer: &str,
    ) -> Result<Knowledge, CapabilityError> {
        let system = format!(
            "Update a family profile with the answer to one onboarding \
             question. Keep every already-known field. {PROFILE_SHAPE}"
        );
        let state = serde_json::to_string(knowledge)
            .map_err(|e| CapabilityError::new("knowledge", e))?;
        chat_json(
            &self.client,
            &self.model,
            "knowledge",
            &system,
            format!("Current profile: {state}\nQuestion: {question}\nAnswer: {answer}"),
        )
        .await
    }
}

/// Deterministic implementation for offline development and tests.
///
/// Questions come straight from [`Knowledge::missing_fields`] and answers
/// are written into the first missing field, so a driver that answers every
/// question always reaches a complete profile.
pub struct MockKnowledgeService;

fn split_list(answer: &str) -> Vec<String> {
    let items: Vec<String> = answer
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        vec!["nothing in particular".to_string()]
    } else {
        items
    }
}

#[async_trait]
impl KnowledgeService for MockKnowledgeService {
    async fn initial_knowledge(&self, _description: &str) -> Result<Knowledge, CapabilityError> {
        Ok(Knowledge::default())
    }

    async fn follow_up_question(
        &self,
        knowledge: &Knowledge,
    ) -> Result<Option<String>, CapabilityError> {
        Ok(knowledge
            .missing_fields()
            .first()
            .map(|field| field.fallback_question().to_string()))
    }

    async fn apply_answer(
        &self,
        knowledge: &Knowledge,
        _question: &str,
        answer: &str,
    ) -> Result<Knowledge, CapabilityError> {
        let mut updated = knowledge.clone();
        let Some(field) = knowledge.missing_fields().first().copied() else {
            return Ok(updated);
        };
        let age = answer.trim().parse::<u8>().unwrap_or(8);
        match field {
            MissingField::Address => {
                let mut parts = answer.splitn(2, ',');
                let city = parts.next().unwrap_or(answer).trim().to_string();
                let country = parts.next().unwrap_or(answer).trim().to_string();
                updated.address = Some(Address {
                    city: Some(city),
                    country: Some(country),
                });
            }
            MissingField::Parent => {
                updated.parent = Some(PersonEntry {
                    name: Some(answer.trim().to_string()),
                    ..PersonEntry::default()
                });
            }
            MissingField::Child => {
                updated.child = Some(PersonEntry {
                    name: Some(answer.trim().to_string()),
                    ..PersonEntry::default()
                });
            }
            MissingField::ParentAge => {
                if let Some(parent) = updated.parent.as_mut() {
                    parent.age = Some(age);
                }
            }
            MissingField::ParentLikes => {
                if let Some(parent) = updated.parent.as_mut() {
                    parent.likes = split_list(answer);
                }
            }
            MissingField::ParentDislikes => {
                if let Some(parent) = updated.parent.as_mut() {
                    parent.dislikes = split_list(answer);
                }
            }
            MissingField::ChildAge => {
                if let Some(child) = updated.child.as_mut() {
                    child.age = Some(age);
                }
            }
            MissingField::ChildLikes => {
                if let Some(child) = updated.child.as_mut() {
                    child.likes = split_list(answer);
                }
            }
            MissingField::ChildDislikes => {
                if let Some(child) = updated.child.as_mut() {
                    child.dislikes = split_list(answer);
                }
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_question_loop_converges_to_a_complete_profile() {
        let service = MockKnowledgeService;
        let mut knowledge = service.initial_knowledge("a parent and a child").await.unwrap();

        let mut rounds = 0;
        while let Some(question) = service.follow_up_question(&knowledge).await.unwrap() {
            rounds += 1;
            assert!(rounds <= 9, "mock onboarding did not converge");
            knowledge = service
                .apply_answer(&knowledge, &question, "Lisbon, Portugal")
                .await
                .unwrap();
        }

        assert!(knowledge.is_complete());
    }

    #[tokio::test]
    async fn mock_apply_answer_parses_ages_and_lists() {
        let service = MockKnowledgeService;
        let mut knowledge = Knowledge {
            parent: Some(PersonEntry {
                name: Some("Sam".to_string()),
                ..PersonEntry::default()
            }),
            ..Knowledge::preset()
        };
        knowledge.parent.as_mut().unwrap().age = None;
        knowledge.parent.as_mut().unwrap().likes = vec![];
        knowledge.parent.as_mut().unwrap().dislikes = vec![];

        knowledge = service.apply_answer(&knowledge, "q", "41").await.unwrap();
        assert_eq!(knowledge.parent.as_ref().unwrap().age, Some(41));

        knowledge = service
            .apply_answer(&knowledge, "q", "jazz, gardening")
            .await
            .unwrap();
        assert_eq!(
            knowledge.parent.as_ref().unwrap().likes,
            vec!["jazz".to_string(), "gardening".to_string()]
        );
    }

    #[test]
    fn empty_follow_up_strings_count_as_no_question() {
        let reply: FollowUpReply = serde_json::from_str(r#"{"follow_up": ""}"#).unwrap();
        assert!(reply.follow_up.filter(|q| !q.trim().is_empty()).is_none());
    }
}
