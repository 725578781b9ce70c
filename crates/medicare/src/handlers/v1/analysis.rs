//! Medical record and document image analysis handlers.

use axum::Json;
use axum::extract::State;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::llm::{ChatRequest as LlmRequest, InlineImage, Message};
use crate::response::{ApiError, ApiJson};
use crate::schemas::{
    AnalysisRequest, AnalysisResponse, ImageAnalysisRequest, ImageAnalysisResponse, Language,
    MedicalAnalysis, Validate,
};
use crate::server::AppState;

const ANALYSIS_FIELDS: &str = "\"summary\" (string), \"key_findings\", \"recommendations\" \
     and \"next_steps\" (arrays of strings)";

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/analysis
pub async fn analyze(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AnalysisRequest>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    req.validate()?;

    let client = state
        .clients
        .chat_client()
        .map_err(ApiError::client_unavailable)?;

    let messages = vec![
        Message::system(output_shape(req.language, ANALYSIS_FIELDS)),
        Message::user(record_with_context(&req.text, req.context.as_deref())),
    ];

    let response = client
        .chat(LlmRequest::new(messages).json())
        .await
        .map_err(ApiError::provider)?;

    let analysis = parse_model_json::<MedicalAnalysis>(&response.content).unwrap_or_else(|e| {
        warn!(error = %e, "Model returned malformed analysis JSON, using fallback");
        MedicalAnalysis::formatting_fallback(&e.to_string())
    });

    Ok(Json(AnalysisResponse {
        analysis,
        language: req.language,
        timestamp: Utc::now(),
    }))
}

/// POST /api/v1/analysis/image
///
/// Request body carries the image as standard base64, optionally as a
/// `data:` URL and with line wraps. The decoded size is checked against
/// `max_file_size` before any model call.
pub async fn analyze_image(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ImageAnalysisRequest>,
) -> Result<Json<ImageAnalysisResponse>, ApiError> {
    req.validate()?;

    let data = decode_image(&req.image_base64)
        .map_err(|_| ApiError::bad_request("image_base64 is not valid base64"))?;

    let max_file_size = state.settings().max_file_size();
    if data.len() as u64 > max_file_size {
        return Err(ApiError::payload_too_large(format!(
            "image is {} bytes, limit is {max_file_size}",
            data.len()
        )));
    }

    let client = state
        .clients
        .vision_client()
        .map_err(ApiError::client_unavailable)?;

    let fields = format!("\"extracted_text\" (string), {ANALYSIS_FIELDS}");
    let text = req
        .context
        .as_deref()
        .map(|c| format!("Additional context:\n{c}"))
        .unwrap_or_default();
    let messages = vec![
        Message::system(output_shape(req.language, &fields)),
        Message::user(text).with_image(InlineImage {
            mime_type: req.mime_type,
            data,
        }),
    ];

    let response = client
        .chat(LlmRequest::new(messages).json())
        .await
        .map_err(ApiError::provider)?;

    let extraction = parse_model_json::<ImageExtraction>(&response.content).unwrap_or_else(|e| {
        warn!(error = %e, "Model returned malformed image analysis JSON, using fallback");
        ImageExtraction {
            extracted_text: String::new(),
            analysis: MedicalAnalysis::formatting_fallback(&e.to_string()),
        }
    });

    Ok(Json(ImageAnalysisResponse {
        extracted_text: extraction.extracted_text,
        analysis: extraction.analysis,
        language: req.language,
        timestamp: Utc::now(),
    }))
}

// ============================================================================
// Helpers
// ============================================================================

#[derive(Deserialize)]
struct ImageExtraction {
    #[serde(default)]
    extracted_text: String,
    #[serde(flatten)]
    analysis: MedicalAnalysis,
}

fn output_shape(language: Language, fields: &str) -> String {
    format!(
        "Respond in {} with a single JSON object containing {fields}.",
        language.name()
    )
}

fn record_with_context(text: &str, context: Option<&str>) -> String {
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => format!("{text}\n\nAdditional context:\n{context}"),
        None => text.to_string(),
    }
}

/// Decode base64 image bytes, accepting a `data:<mime>;base64,` prefix and
/// embedded whitespace.
fn decode_image(raw: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let raw = raw.trim();
    let payload = match raw.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, data)| data),
        None => raw,
    };
    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    STANDARD.decode(compact)
}

/// Parse model output as JSON, tolerating a surrounding Markdown code fence.
fn parse_model_json<T: DeserializeOwned>(content: &str) -> Result<T, serde_json::Error> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(body.trim())
}
