//! Evening planning: local event lookup and lesson plans.

use crate::error::CapabilityError;
use crate::knowledge::Knowledge;
use crate::llm::{chat_json, chat_text};
use crate::story::EventModel;
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;

#[async_trait]
pub trait PlanningService: Send + Sync {
    /// Finds one event happening tomorrow that suits the child, or `None`
    /// when nothing fitting turns up.
    async fn find_event(
        &self,
        child_age: u8,
        city: &str,
    ) -> Result<Option<EventModel>, CapabilityError>;

    /// Produces an age-appropriate lesson plan for the given subject.
    async fn lesson_plan(
        &self,
        knowledge: &Knowledge,
        subject: &str,
    ) -> Result<String, CapabilityError>;
}

pub struct OpenAiPlanningService {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiPlanningService {
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[derive(Deserialize)]
struct EventReply {
    event: Option<EventModel>,
}

#[async_trait]
impl PlanningService for OpenAiPlanningService {
    async fn find_event(
        &self,
        child_age: u8,
        city: &str,
    ) -> Result<Option<EventModel>, CapabilityError> {
        let tomorrow = (Utc::now() + Duration::days(1)).format("%Y-%m-%d");
        let system = "You suggest one local event suitable for a child. Reply as \
            JSON: {\"event\": {\"name\": string, \"description\": string, \
            \"justification\": string, \"estimated_cost\": string|null, \
            \"url\": string|null, \"booking_url\": string|null, \
            \"address\": string|null} | null}. Use null when you know of nothing \
            suitable rather than inventing one.";
        let reply: EventReply = chat_json(
            &self.client,
            &self.model,
            "planning",
            system,
            format!(
                "What is happening on {tomorrow} in {city} that suits a \
                 {child_age}-year-old child?"
            ),
        )
        .await?;
        Ok(reply.event)
    }

    async fn lesson_plan(
        &self,
        knowledge: &Knowledge,
        subject: &str,
    ) -> Result<String, CapabilityError> {
        let age = knowledge.child.as_ref().and_then(|c| c.age);
        let system = "You write short, engaging lesson plans for an evening at \
            home: learning objectives, a sequence of hands-on activities, and one \
            playful element, all tailored to the child's age.";
        let user = match age {
            Some(age) => format!("Subject: {subject}. The child is {age} years old."),
            None => format!("Subject: {subject}."),
        };
        chat_text(&self.client, &self.model, "planning", system, user).await
    }
}

pub struct MockPlanningService;

#[async_trait]
impl PlanningService for MockPlanningService {
    async fn find_event(
        &self,
        child_age: u8,
        city: &str,
    ) -> Result<Option<EventModel>, CapabilityError> {
        Ok(Some(EventModel {
            name: format!("{city} children's museum evening"),
            description: "Hands-on exhibits with an evening family tour.".to_string(),
            justification: format!("Well suited to a {child_age}-year-old."),
            estimated_cost: Some("10 EUR".to_string()),
            url: None,
            booking_url: None,
            address: Some(format!("Museum square, {city}")),
        }))
    }

    async fn lesson_plan(
        &self,
        _knowledge: &Knowledge,
        subject: &str,
    ) -> Result<String, CapabilityError> {
        Ok(format!(
            "Tonight's mini-lesson on {subject}: talk about it over dinner, \
             draw it together, then quiz each other before bed."
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_event_mentions_city_and_age() {
        let event = MockPlanningService
            .find_event(6, "Utrecht")
            .await
            .unwrap()
            .unwrap();
        assert!(event.name.contains("Utrecht"));
        assert!(event.justification.contains('6'));
    }

    #[test]
    fn event_reply_accepts_null() {
        let reply: EventReply = serde_json::from_str(r#"{"event": null}"#).unwrap();
        assert!(reply.event.is_none());
    }
}
