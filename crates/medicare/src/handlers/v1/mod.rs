//! V1 API handlers.

mod analysis;
mod chat;

pub use analysis::{analyze, analyze_image};
pub use chat::chat;
