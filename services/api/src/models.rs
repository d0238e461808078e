//! API Models
//!
//! Request/response bodies for the HTTP boundary, with `utoipa` schema
//! derives for the generated OpenAPI documentation. Core domain types are
//! mapped into these DTOs at the handler edge.

use serde::{Deserialize, Serialize};
use storytime_core::{IllustratedTurn, StoryTurn};
use utoipa::ToSchema;

#[derive(Deserialize, Default, ToSchema)]
pub struct StartPayload {
    /// Reuse an id to soft-reset an existing conversation; omit to get a
    /// generated one.
    pub conversation_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct StartResponse {
    pub conversation_id: String,
}

/// One pending message for the user, or nothing yet.
#[derive(Serialize, Debug, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateResponse {
    /// Spoken prompt from the assistant. `audio_b64` carries synthesized
    /// mp3 audio when the speech capability succeeded; the text is always
    /// present.
    Audio {
        text: String,
        audio_b64: Option<String>,
    },
    /// Final structured result of a turn.
    Output {
        #[schema(value_type = Object)]
        payload: serde_json::Value,
    },
}

#[derive(Deserialize, ToSchema)]
pub struct MessagePayload {
    pub text: String,
}

#[derive(Serialize, ToSchema)]
pub struct TranscriptionResponse {
    pub transcription: String,
}

#[derive(Deserialize, Default, ToSchema)]
pub struct InteractiveStoryPayload {
    /// The option chosen on the previous turn. Omit only on the first
    /// turn, where the story theme seeds the path instead.
    pub choice: Option<String>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct DecisionsDto {
    pub option1: String,
    pub option2: String,
}

/// One interactive story turn as served over HTTP. Absent `decisions`
/// means the story has concluded.
#[derive(Serialize, Debug, ToSchema)]
pub struct InteractiveTurnResponse {
    pub scene_text: String,
    pub decisions: Option<DecisionsDto>,
    pub image_paths: Vec<String>,
}

impl From<IllustratedTurn> for InteractiveTurnResponse {
    fn from(illustrated: IllustratedTurn) -> Self {
        let IllustratedTurn {
            turn: StoryTurn {
                scene_text,
                decisions,
            },
            image_paths,
        } = illustrated;
        Self {
            scene_text,
            decisions: decisions.map(|d| DecisionsDto {
                option1: d.option1,
                option2: d.option2,
            }),
            image_paths,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use storytime_core::StoryDecisions;

    #[test]
    fn state_response_audio_serializes_with_a_type_tag() {
        let response = StateResponse::Audio {
            text: "hello".to_string(),
            audio_b64: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "audio");
        assert_eq!(json["text"], "hello");
        assert!(json["audio_b64"].is_null());
    }

    #[test]
    fn state_response_output_carries_the_payload() {
        let response = StateResponse::Output {
            payload: serde_json::json!({"story": "once"}),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "output");
        assert_eq!(json["payload"]["story"], "once");
    }

    #[test]
    fn start_payload_accepts_an_empty_body() {
        let payload: StartPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.conversation_id.is_none());
    }

    #[test]
    fn interactive_turn_response_maps_from_the_core_type() {
        let illustrated = IllustratedTurn {
            turn: StoryTurn {
                scene_text: "Scene".to_string(),
                decisions: Some(StoryDecisions {
                    option1: "Left".to_string(),
                    option2: "Right".to_string(),
                }),
            },
            image_paths: vec!["img.png".to_string()],
        };
        let response = InteractiveTurnResponse::from(illustrated);
        assert_eq!(response.scene_text, "Scene");
        assert_eq!(response.decisions.as_ref().unwrap().option1, "Left");
        assert_eq!(response.image_paths, vec!["img.png"]);
    }

    #[test]
    fn terminal_turn_serializes_with_null_decisions() {
        let response = InteractiveTurnResponse {
            scene_text: "The end.".to_string(),
            decisions: None,
            image_paths: vec![],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["decisions"].is_null());
    }
}
