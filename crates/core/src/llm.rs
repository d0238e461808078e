//! Shared chat-completion plumbing for the LLM-backed capability clients.
//!
//! Every structured capability asks the model for a JSON object and parses
//! it with serde, so schema mismatches surface as `CapabilityError`s at the
//! call site instead of stringly-typed parsing further up.

use crate::error::CapabilityError;
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
};
use serde::de::DeserializeOwned;

/// Runs one system+user chat turn and returns the raw text content.
pub(crate) async fn chat_text(
    client: &Client<OpenAIConfig>,
    model: &str,
    capability: &'static str,
    system: &str,
    user: String,
) -> Result<String, CapabilityError> {
    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages(vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| CapabilityError::new(capability, e))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()
                .map_err(|e| CapabilityError::new(capability, e))?
                .into(),
        ])
        .build()
        .map_err(|e| CapabilityError::new(capability, e))?;

    let response = client
        .chat()
        .create(request)
        .await
        .map_err(|e| CapabilityError::new(capability, e))?;

    response
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .ok_or_else(|| CapabilityError::new(capability, "empty completion"))
}

/// Runs one system+user chat turn in JSON mode and parses the reply.
pub(crate) async fn chat_json<T: DeserializeOwned>(
    client: &Client<OpenAIConfig>,
    model: &str,
    capability: &'static str,
    system: &str,
    user: String,
) -> Result<T, CapabilityError> {
    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .response_format(ResponseFormat::JsonObject)
        .messages(vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| CapabilityError::new(capability, e))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()
                .map_err(|e| CapabilityError::new(capability, e))?
                .into(),
        ])
        .build()
        .map_err(|e| CapabilityError::new(capability, e))?;

    let response = client
        .chat()
        .create(request)
        .await
        .map_err(|e| CapabilityError::new(capability, e))?;

    let content = response
        .choices
        .first()
        .and_then(|choice| choice.message.content.as_deref())
        .ok_or_else(|| CapabilityError::new(capability, "empty completion"))?;

    serde_json::from_str(content).map_err(|e| CapabilityError::new(capability, e))
}
