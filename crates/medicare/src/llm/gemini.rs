//! Google Gemini provider using the `generateContent` REST API.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{LLMError, check_response_error};
use super::provider::{ClientOptions, LLMProvider};
use super::types::{ChatRequest, ChatResponse, Message, ResponseFormat, Role, Usage};

/// Gemini client handle.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    options: ClientOptions,
}

impl GeminiClient {
    const BASE_URL: &'static str = "https://generativelanguage.googleapis.com/v1beta";

    pub fn new(options: ClientOptions) -> Result<Self, LLMError> {
        validate_model(&options.model)?;
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: Self::BASE_URL.to_string(),
            options,
        })
    }

    /// Point the client at a different API root, e.g. a proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LLMProvider for GeminiClient {
    fn options(&self) -> &ClientOptions {
        &self.options
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.options.model
        );
        debug!(
            model = %self.options.model,
            messages = request.messages.len(),
            "Sending Gemini request"
        );

        let body = to_gemini_request(&self.options, request);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", self.options.api_key.expose())
            .json(&body)
            .send()
            .await?;

        if let Some(err) = check_response_error(&response) {
            return Err(err);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LLMError::Api { status, message });
        }

        let gemini_response: GenerateContentResponse = response.json().await?;
        from_gemini_response(gemini_response)
    }
}

fn validate_model(model: &str) -> Result<(), LLMError> {
    let invalid = model.is_empty()
        || model
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#'));
    if invalid {
        return Err(LLMError::InvalidModel(model.to_string()));
    }
    Ok(())
}

// --- Gemini format types and conversions ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            inline_data: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

fn to_content(role: &str, message: Message) -> Content {
    let mut parts = Vec::with_capacity(message.images.len() + 1);
    if !message.content.is_empty() {
        parts.push(Part::text(message.content));
    }
    for image in message.images {
        parts.push(Part {
            text: None,
            inline_data: Some(InlineData {
                mime_type: image.mime_type,
                data: STANDARD.encode(&image.data),
            }),
        });
    }
    Content {
        role: Some(role.to_string()),
        parts,
    }
}

fn to_gemini_request(options: &ClientOptions, request: ChatRequest) -> GenerateContentRequest {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for msg in request.messages {
        match msg.role {
            Role::System => system_parts.push(msg.content),
            Role::User => contents.push(to_content("user", msg)),
            Role::Assistant => contents.push(to_content("model", msg)),
        }
    }

    let mut system_instruction = None;
    if !system_parts.is_empty() {
        let system = system_parts.join("\n\n");
        if options.convert_system_message_to_human {
            // Gemini models without system-role support get it as the first user text
            let first_user = contents
                .iter_mut()
                .find(|c| c.role.as_deref() == Some("user"));
            match first_user {
                Some(content) => content.parts.insert(0, Part::text(system)),
                None => contents.insert(
                    0,
                    Content {
                        role: Some("user".to_string()),
                        parts: vec![Part::text(system)],
                    },
                ),
            }
        } else {
            system_instruction = Some(Content {
                role: None,
                parts: vec![Part::text(system)],
            });
        }
    }

    let response_mime_type = match request.response_format {
        ResponseFormat::Text => None,
        ResponseFormat::Json => Some("application/json"),
    };

    GenerateContentRequest {
        contents,
        system_instruction,
        generation_config: GenerationConfig {
            temperature: options.temperature,
            max_output_tokens: options.max_output_tokens,
            response_mime_type,
        },
    }
}

fn from_gemini_response(response: GenerateContentResponse) -> Result<ChatResponse, LLMError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(LLMError::EmptyResponse);
    };

    let content = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if content.is_empty() {
        return Err(LLMError::EmptyResponse);
    }

    Ok(ChatResponse {
        content,
        finish_reason: candidate.finish_reason,
        usage: response.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKey;
    use crate::llm::InlineImage;
    use serde_json::{Value, json};

    fn options(convert: bool) -> ClientOptions {
        ClientOptions {
            model: "gemini-2.5-flash".to_string(),
            api_key: ApiKey::new("key"),
            temperature: 0.5,
            max_output_tokens: 2048,
            convert_system_message_to_human: convert,
        }
    }

    fn to_json(options: &ClientOptions, request: ChatRequest) -> Value {
        serde_json::to_value(to_gemini_request(options, request)).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_models() {
        for model in ["", "gemini 2.5", "models/gemini", "gemini?x=1"] {
            let mut opts = options(true);
            opts.model = model.to_string();
            assert!(matches!(
                GeminiClient::new(opts),
                Err(LLMError::InvalidModel(m)) if m == model
            ));
        }
    }

    #[test]
    fn test_new_keeps_options() {
        let client = GeminiClient::new(options(true)).unwrap();
        assert_eq!(client.options(), &options(true));
        assert_eq!(client.base_url, GeminiClient::BASE_URL);

        let client = client.with_base_url("http://localhost:9000/v1beta/");
        assert_eq!(client.base_url, "http://localhost:9000/v1beta");
    }

    #[test]
    fn test_system_message_downgraded_to_first_user_turn() {
        let request = ChatRequest::new(vec![
            Message::system("Be brief."),
            Message::user("Hello"),
            Message::assistant("Hi"),
            Message::user("Again"),
        ]);

        let body = to_json(&options(true), request);
        assert!(body.get("systemInstruction").is_none());
        assert_eq!(
            body["contents"],
            json!([
                {"role": "user", "parts": [{"text": "Be brief."}, {"text": "Hello"}]},
                {"role": "model", "parts": [{"text": "Hi"}]},
                {"role": "user", "parts": [{"text": "Again"}]}
            ])
        );
    }

    #[test]
    fn test_system_only_conversation_becomes_user_turn() {
        let body = to_json(
            &options(true),
            ChatRequest::new(vec![Message::system("Only system")]),
        );
        assert_eq!(
            body["contents"],
            json!([{"role": "user", "parts": [{"text": "Only system"}]}])
        );
    }

    #[test]
    fn test_system_instruction_when_not_downgraded() {
        let request = ChatRequest::new(vec![Message::system("Be brief."), Message::user("Hello")]);

        let body = to_json(&options(false), request);
        assert_eq!(
            body["systemInstruction"],
            json!({"parts": [{"text": "Be brief."}]})
        );
        assert_eq!(
            body["contents"],
            json!([{"role": "user", "parts": [{"text": "Hello"}]}])
        );
    }

    #[test]
    fn test_generation_config() {
        let body = to_json(&options(true), ChatRequest::new(vec![Message::user("x")]));
        assert_eq!(
            body["generationConfig"],
            json!({"temperature": 0.5, "maxOutputTokens": 2048})
        );

        let body = to_json(
            &options(true),
            ChatRequest::new(vec![Message::user("x")]).json(),
        );
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn test_inline_images_are_base64_encoded() {
        let message = Message::user("Read this").with_image(InlineImage {
            mime_type: "image/png".to_string(),
            data: b"png-bytes".to_vec(),
        });

        let body = to_json(&options(true), ChatRequest::new(vec![message]));
        assert_eq!(
            body["contents"][0]["parts"],
            json!([
                {"text": "Read this"},
                {"inlineData": {"mimeType": "image/png", "data": "cG5nLWJ5dGVz"}}
            ])
        );
    }

    #[test]
    fn test_response_conversion() {
        let raw = r#"{
            "candidates": [
                {
                    "content": {
                        "role": "model",
                        "parts": [{"text": "Malaria is "}, {"text": "treatable."}]
                    },
                    "finishReason": "STOP"
                }
            ],
            "usageMetadata": {
                "promptTokenCount": 12,
                "candidatesTokenCount": 4,
                "totalTokenCount": 16
            }
        }"#;

        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let response = from_gemini_response(parsed).unwrap();
        assert_eq!(response.content, "Malaria is treatable.");
        assert_eq!(response.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(
            response.usage,
            Some(Usage {
                prompt_tokens: 12,
                completion_tokens: 4,
                total_tokens: 16,
            })
        );
    }

    #[test]
    fn test_response_without_candidates_is_empty() {
        let parsed: GenerateContentResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(matches!(
            from_gemini_response(parsed),
            Err(LLMError::EmptyResponse)
        ));

        let parsed: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        assert!(matches!(
            from_gemini_response(parsed),
            Err(LLMError::EmptyResponse)
        ));
    }
}
