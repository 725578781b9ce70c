//! MediCare backend: settings, Gemini client handles, and the HTTP surface over them.

pub mod config;
pub mod handlers;
pub mod llm;
pub mod response;
pub mod schemas;
pub mod server;
