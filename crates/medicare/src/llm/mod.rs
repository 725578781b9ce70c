//! Gemini client handles and the factory that memoizes them.

mod error;
mod factory;
mod gemini;
mod provider;
mod types;

pub use error::LLMError;
pub use factory::{ClientConstructor, ClientFactory, ClientKind};
pub use gemini::GeminiClient;
pub use provider::{ClientOptions, LLMProvider};
pub use types::{ChatRequest, ChatResponse, InlineImage, Message, ResponseFormat, Role, Usage};
