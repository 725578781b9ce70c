//! Request and response records exchanged with HTTP clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Limits on free-text request fields, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4_000;
pub const MAX_RECORD_CHARS: usize = 50_000;

/// Research result count bounds and default.
pub const MAX_RESEARCH_RESULTS: u32 = 20;
const DEFAULT_RESEARCH_RESULTS: u32 = 5;

// ============================================================================
// Validation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: u32,
        max: u32,
    },

    #[error("unsupported mime type: {0}")]
    InvalidMimeType(String),
}

/// Field-level checks on an incoming record.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

fn require_text(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Response language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Fr,
}

impl Language {
    /// English name, for instructing the model.
    pub fn name(&self) -> &'static str {
        match self {
            Self::En => "English",
            Self::Fr => "French",
        }
    }
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub language: Language,
}

impl Validate for ChatRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text("message", &self.message, MAX_MESSAGE_CHARS)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub language: Language,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Analysis
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisRequest {
    pub text: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub language: Language,
}

impl Validate for AnalysisRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text("text", &self.text, MAX_RECORD_CHARS)?;
        if let Some(context) = &self.context
            && context.chars().count() > MAX_RECORD_CHARS
        {
            return Err(ValidationError::TooLong {
                field: "context",
                max: MAX_RECORD_CHARS,
            });
        }
        Ok(())
    }
}

/// Structured analysis of a medical record.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MedicalAnalysis {
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

impl MedicalAnalysis {
    /// Longest slice of the parse error kept in a fallback summary.
    pub const FALLBACK_DETAIL_CHARS: usize = 200;

    /// Analysis returned when the model's output could not be read as structured data.
    pub fn formatting_fallback(detail: &str) -> Self {
        let detail: String = detail.chars().take(Self::FALLBACK_DETAIL_CHARS).collect();
        Self {
            summary: format!("Analysis completed but encountered formatting issues: {detail}"),
            key_findings: vec!["Analysis was performed but results need manual review".to_string()],
            recommendations: vec![
                "Consult with a healthcare professional for detailed interpretation".to_string(),
            ],
            next_steps: vec![
                "Schedule appointment with your doctor".to_string(),
                "Keep this record for your medical history".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisResponse {
    pub analysis: MedicalAnalysis,
    pub language: Language,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Image analysis
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageAnalysisRequest {
    /// Standard base64 image bytes.
    pub image_base64: String,
    pub mime_type: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub language: Language,
}

impl Validate for ImageAnalysisRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.image_base64.trim().is_empty() {
            return Err(ValidationError::EmptyField("image_base64"));
        }
        match self.mime_type.strip_prefix("image/") {
            Some(subtype) if !subtype.is_empty() => Ok(()),
            _ => Err(ValidationError::InvalidMimeType(self.mime_type.clone())),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageAnalysisResponse {
    pub extracted_text: String,
    pub analysis: MedicalAnalysis,
    pub language: Language,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Research
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResearchRequest {
    pub query: String,
    #[serde(default = "default_research_results")]
    pub max_results: u32,
    #[serde(default)]
    pub language: Language,
}

fn default_research_results() -> u32 {
    DEFAULT_RESEARCH_RESULTS
}

impl Validate for ResearchRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text("query", &self.query, MAX_MESSAGE_CHARS)?;
        if !(1..=MAX_RESEARCH_RESULTS).contains(&self.max_results) {
            return Err(ValidationError::OutOfRange {
                field: "max_results",
                min: 1,
                max: MAX_RESEARCH_RESULTS,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResearchResponse {
    pub query: String,
    pub results: Vec<ResearchResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_defaults_to_english() {
        let req: ChatRequest = serde_json::from_str(r#"{"message": "What is malaria?"}"#).unwrap();
        assert_eq!(req.language, Language::En);
        assert!(req.validate().is_ok());

        let req: ChatRequest =
            serde_json::from_str(r#"{"message": "Qu'est-ce que le paludisme?", "language": "fr"}"#)
                .unwrap();
        assert_eq!(req.language, Language::Fr);
    }

    #[test]
    fn test_chat_request_requires_message_field() {
        assert!(serde_json::from_str::<ChatRequest>(r#"{"language": "en"}"#).is_err());
        assert!(serde_json::from_str::<ChatRequest>(r#"{"message": "x", "language": "de"}"#).is_err());
    }

    #[test]
    fn test_chat_request_validation() {
        let blank = ChatRequest {
            message: "  \n".to_string(),
            language: Language::En,
        };
        assert_eq!(blank.validate(), Err(ValidationError::EmptyField("message")));

        let long = ChatRequest {
            message: "a".repeat(MAX_MESSAGE_CHARS + 1),
            language: Language::En,
        };
        assert_eq!(
            long.validate(),
            Err(ValidationError::TooLong {
                field: "message",
                max: MAX_MESSAGE_CHARS
            })
        );
    }

    #[test]
    fn test_analysis_request_validation() {
        let req: AnalysisRequest =
            serde_json::from_str(r#"{"text": "BP 140/90 mmHg"}"#).unwrap();
        assert!(req.context.is_none());
        assert!(req.validate().is_ok());

        let req = AnalysisRequest {
            text: String::new(),
            context: None,
            language: Language::En,
        };
        assert_eq!(req.validate(), Err(ValidationError::EmptyField("text")));

        let req = AnalysisRequest {
            text: "ok".to_string(),
            context: Some("c".repeat(MAX_RECORD_CHARS + 1)),
            language: Language::En,
        };
        assert!(matches!(
            req.validate(),
            Err(ValidationError::TooLong {
                field: "context",
                ..
            })
        ));
    }

    #[test]
    fn test_image_request_validation() {
        let mut req = ImageAnalysisRequest {
            image_base64: "aGVsbG8=".to_string(),
            mime_type: "image/jpeg".to_string(),
            context: None,
            language: Language::En,
        };
        assert!(req.validate().is_ok());

        req.mime_type = "application/pdf".to_string();
        assert_eq!(
            req.validate(),
            Err(ValidationError::InvalidMimeType("application/pdf".to_string()))
        );

        req.mime_type = "image/".to_string();
        assert!(req.validate().is_err());

        req.mime_type = "image/png".to_string();
        req.image_base64 = String::new();
        assert_eq!(
            req.validate(),
            Err(ValidationError::EmptyField("image_base64"))
        );
    }

    #[test]
    fn test_research_request_defaults_and_bounds() {
        let req: ResearchRequest = serde_json::from_str(r#"{"query": "malaria"}"#).unwrap();
        assert_eq!(req.max_results, 5);
        assert!(req.validate().is_ok());

        let req: ResearchRequest =
            serde_json::from_str(r#"{"query": "malaria", "max_results": 0}"#).unwrap();
        assert!(matches!(
            req.validate(),
            Err(ValidationError::OutOfRange { .. })
        ));

        let req: ResearchRequest =
            serde_json::from_str(r#"{"query": "malaria", "max_results": 21}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_medical_analysis_lists_default_empty() {
        let analysis: MedicalAnalysis =
            serde_json::from_str(r#"{"summary": "Elevated blood pressure."}"#).unwrap();
        assert_eq!(analysis.summary, "Elevated blood pressure.");
        assert!(analysis.key_findings.is_empty());
        assert!(analysis.next_steps.is_empty());

        assert!(serde_json::from_str::<MedicalAnalysis>(r#"{"key_findings": []}"#).is_err());
    }

    #[test]
    fn test_formatting_fallback_truncates_detail() {
        let fallback = MedicalAnalysis::formatting_fallback(&"x".repeat(500));
        let prefix = "Analysis completed but encountered formatting issues: ";
        assert_eq!(fallback.summary.len(), prefix.len() + 200);
        assert!(fallback.summary.starts_with(prefix));
        assert_eq!(
            fallback.key_findings,
            vec!["Analysis was performed but results need manual review"]
        );
        assert_eq!(fallback.next_steps.len(), 2);
        assert!(fallback.recommendations[0].contains("healthcare professional"));
    }

    #[test]
    fn test_research_response_omits_missing_summary() {
        let response = ResearchResponse {
            query: "malaria".to_string(),
            results: vec![ResearchResult {
                title: "WHO fact sheet".to_string(),
                url: "https://who.int/malaria".to_string(),
                content: "Malaria is a life-threatening disease.".to_string(),
                score: 0.9,
            }],
            summary: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("summary"));
        assert!(json.contains("\"title\":\"WHO fact sheet\""));
    }

    #[test]
    fn test_language_serialization() {
        assert_eq!(serde_json::to_string(&Language::Fr).unwrap(), "\"fr\"");
        assert_eq!(Language::Fr.name(), "French");
    }
}
