//! # API Module
//!
//! Plumbing for the OpenAI-compatible chat endpoint both judgment calls go
//! through: the classifier gate and the summarizer. Each call here is a
//! single-shot, non-streaming completion — system prompt, one user message,
//! sampling knobs, first-choice text out.
//!
//! Every call carries an explicit timeout supplied by the caller; a timeout
//! is a scoped failure for that one operation, never a process-level fault.

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    },
};
use std::time::Duration;
use tracing::debug;

use crate::config::MemoseekConfig;

/// Sampling knobs for one completion call.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Stop sequences; empty means none.
    pub stop: Vec<String>,
    pub timeout: Duration,
}

/// Creates an OpenAI-compatible API client from configuration.
pub fn create_client(config: &MemoseekConfig) -> Client<OpenAIConfig> {
    let openai_config = OpenAIConfig::new()
        .with_api_key(config.api_key.clone())
        .with_api_base(config.api_base.clone());
    Client::with_config(openai_config)
}

/// Run one system+user chat completion and return the first choice's text.
///
/// # Parameters
/// - `client`: the shared API client.
/// - `model`: model name to complete with.
/// - `system_prompt`: instruction message.
/// - `user_content`: the single user message.
/// - `params`: sampling knobs and the per-call timeout.
///
/// # Errors
/// Returns a human-readable error string on request-building failures,
/// transport errors, timeouts, or an empty/contentless first choice. The
/// callers decide what that failure means (fail-closed rejection for the
/// classifier, sentinel summary for the summarizer).
pub async fn chat_completion(
    client: &Client<OpenAIConfig>,
    model: &str,
    system_prompt: &str,
    user_content: &str,
    params: &CompletionParams,
) -> Result<String, String> {
    let messages = vec![
        ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
            content: ChatCompletionRequestSystemMessageContent::Text(system_prompt.to_string()),
            name: None,
        }),
        ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(user_content.to_string()),
            name: None,
        }),
    ];

    let mut builder = CreateChatCompletionRequestArgs::default();
    builder
        .model(model)
        .messages(messages)
        .temperature(params.temperature)
        .max_tokens(params.max_tokens);
    if !params.stop.is_empty() {
        builder.stop(params.stop.clone());
    }
    let request = builder.build().map_err(|e| e.to_string())?;

    debug!(model, "sending chat completion request");

    let response = tokio::time::timeout(params.timeout, client.chat().create(request))
        .await
        .map_err(|_| format!("timed out after {:?}", params.timeout))?
        .map_err(|e| e.to_string())?;

    response
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .ok_or_else(|| "no content in first choice".to_string())
}
