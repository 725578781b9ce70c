//! LLM provider trait and construction options.

use async_trait::async_trait;

use super::error::LLMError;
use super::types::{ChatRequest, ChatResponse};
use crate::config::ApiKey;

/// Parameters a client handle is constructed with.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    pub model: String,
    pub api_key: ApiKey,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Fold system messages into the first user turn instead of sending a
    /// separate system instruction.
    pub convert_system_message_to_human: bool,
}

/// A configured connection to a model provider.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Options this handle was constructed with.
    fn options(&self) -> &ClientOptions;

    /// Make a chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError>;
}
