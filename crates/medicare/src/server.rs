use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::warn;

use crate::config::Settings;
use crate::handlers;
use crate::llm::ClientFactory;

/// Room for the JSON envelope around a base64 image.
const BODY_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub clients: Arc<ClientFactory>,
}

impl AppState {
    pub fn new(clients: ClientFactory) -> Self {
        Self {
            clients: Arc::new(clients),
        }
    }

    pub fn settings(&self) -> &Settings {
        self.clients.settings()
    }
}

pub fn build_app(state: AppState) -> Router {
    let settings = state.settings();
    let timeout = Duration::from_secs(settings.request_timeout_seconds());
    let body_limit = body_limit(settings.max_file_size());
    let cors = cors_layer(&settings.cors_origins_list());

    let api_v1 = Router::new()
        .route("/chat", post(handlers::v1::chat))
        .route("/analysis", post(handlers::v1::analyze))
        .route("/analysis/image", post(handlers::v1::analyze_image))
        .with_state(state.clone());

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/health", get(handlers::health))
        .with_state(state)
        .nest("/api/v1", api_v1)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
}

/// Request body limit that admits a base64-encoded file of `max_file_size` bytes.
fn body_limit(max_file_size: u64) -> usize {
    let encoded = max_file_size.div_ceil(3).saturating_mul(4);
    usize::try_from(encoded.saturating_add(BODY_OVERHEAD_BYTES)).unwrap_or(usize::MAX)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Skipping invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}
