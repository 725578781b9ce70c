//! Factory that lazily builds and memoizes the chat and vision client handles.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{info, warn};

use super::error::LLMError;
use super::gemini::GeminiClient;
use super::provider::{ClientOptions, LLMProvider};
use crate::config::{ConfigError, Settings, load_settings};

/// Builds a client handle from its options.
pub type ClientConstructor =
    dyn Fn(ClientOptions) -> Result<Arc<dyn LLMProvider>, LLMError> + Send + Sync;

/// The two client configurations the backend uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Chat,
    Vision,
}

impl ClientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Vision => "vision",
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Holds at most one handle per [`ClientKind`].
///
/// Handles are built on first request. Concurrent first callers block on a
/// single construction and all receive the same `Arc`. A failed construction
/// is not stored, so the next call tries again.
pub struct ClientFactory {
    settings: Arc<Settings>,
    constructor: Box<ClientConstructor>,
    chat: OnceCell<Arc<dyn LLMProvider>>,
    vision: OnceCell<Arc<dyn LLMProvider>>,
}

impl ClientFactory {
    /// Vision extraction runs cooler than chat regardless of settings.
    pub const VISION_TEMPERATURE: f32 = 0.5;

    /// Factory producing Gemini clients against `settings.gemini_base_url()`.
    pub fn new(settings: Arc<Settings>) -> Self {
        let base_url = settings.gemini_base_url().to_string();
        Self::with_constructor(settings, move |options| {
            let client = GeminiClient::new(options)?.with_base_url(base_url.as_str());
            Ok(Arc::new(client) as Arc<dyn LLMProvider>)
        })
    }

    pub fn with_constructor<F>(settings: Arc<Settings>, constructor: F) -> Self
    where
        F: Fn(ClientOptions) -> Result<Arc<dyn LLMProvider>, LLMError> + Send + Sync + 'static,
    {
        Self {
            settings,
            constructor: Box::new(constructor),
            chat: OnceCell::new(),
            vision: OnceCell::new(),
        }
    }

    /// Load settings and build a Gemini factory over them.
    pub fn from_env(env_file: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = load_settings(env_file)?;
        Ok(Self::new(Arc::new(settings)))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Options a handle of `kind` is constructed with.
    pub fn options(&self, kind: ClientKind) -> ClientOptions {
        let temperature = match kind {
            ClientKind::Chat => self.settings.temperature(),
            ClientKind::Vision => Self::VISION_TEMPERATURE,
        };
        ClientOptions {
            model: self.settings.gemini_model().to_string(),
            api_key: self.settings.google_api_key().clone(),
            temperature,
            max_output_tokens: self.settings.max_tokens(),
            convert_system_message_to_human: true,
        }
    }

    pub fn chat_options(&self) -> ClientOptions {
        self.options(ClientKind::Chat)
    }

    pub fn vision_options(&self) -> ClientOptions {
        self.options(ClientKind::Vision)
    }

    /// General-purpose chat client.
    pub fn chat_client(&self) -> Result<Arc<dyn LLMProvider>, LLMError> {
        self.client(ClientKind::Chat)
    }

    /// Vision-tuned client for image extraction.
    pub fn vision_client(&self) -> Result<Arc<dyn LLMProvider>, LLMError> {
        self.client(ClientKind::Vision)
    }

    pub fn client(&self, kind: ClientKind) -> Result<Arc<dyn LLMProvider>, LLMError> {
        let cell = match kind {
            ClientKind::Chat => &self.chat,
            ClientKind::Vision => &self.vision,
        };
        cell.get_or_try_init(|| {
            let options = self.options(kind);
            info!(
                kind = %kind,
                model = %options.model,
                temperature = options.temperature,
                max_output_tokens = options.max_output_tokens,
                "Constructing LLM client"
            );
            (self.constructor)(options).inspect_err(|e| {
                warn!(kind = %kind, error = %e, "LLM client construction failed");
            })
        })
        .map(Arc::clone)
    }
}
