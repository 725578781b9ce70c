//! Process settings loaded from the environment and an optional `.env` file.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

// ============================================================================
// Keys and defaults
// ============================================================================

const GOOGLE_API_KEY: &str = "google_api_key";
const TAVILY_API_KEY: &str = "tavily_api_key";
const HOST: &str = "host";
const PORT: &str = "port";
const CORS_ORIGINS: &str = "cors_origins";
const GEMINI_MODEL: &str = "gemini_model";
const GEMINI_BASE_URL: &str = "gemini_base_url";
const TEMPERATURE: &str = "temperature";
const MAX_TOKENS: &str = "max_tokens";
const MAX_FILE_SIZE: &str = "max_file_size";
const REQUEST_TIMEOUT_SECONDS: &str = "request_timeout_seconds";

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> String {
    "http://localhost:3000".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_request_timeout() -> u64 {
    300
}

// ============================================================================
// ApiKey
// ============================================================================

/// A credential whose `Debug` output never shows the value.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Validated process settings. Read-only once loaded.
#[derive(Debug, Clone)]
pub struct Settings {
    google_api_key: ApiKey,
    tavily_api_key: ApiKey,
    host: String,
    port: u16,
    cors_origins: String,
    gemini_model: String,
    gemini_base_url: String,
    temperature: f32,
    max_tokens: u32,
    max_file_size: u64,
    request_timeout_seconds: u64,
}

/// Load settings from the process environment, layered over `env_file` when given.
pub fn load_settings(env_file: Option<&Path>) -> Result<Settings, ConfigError> {
    let vars = std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
    Settings::from_sources(env_file, vars)
}

impl Settings {
    pub const TEMPERATURE_RANGE: (f32, f32) = (0.0, 2.0);
    pub const MAX_TOKENS_RANGE: (u32, u32) = (100, 8192);

    /// Build settings from an optional dotenv file and explicit variables.
    ///
    /// Keys match case-insensitively. `vars` take precedence over the file, and
    /// a missing file is treated as empty.
    pub fn from_sources<I>(env_file: Option<&Path>, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut values = HashMap::new();

        if let Some(path) = env_file {
            match dotenvy::from_path_iter(path) {
                Ok(iter) => {
                    for item in iter {
                        let (key, value) = item?;
                        values.insert(key.to_ascii_lowercase(), value);
                    }
                    debug!(path = %path.display(), "Loaded env file");
                }
                Err(e) if e.not_found() => {
                    debug!(path = %path.display(), "No env file, using environment only");
                }
                Err(e) => return Err(ConfigError::EnvFile(e)),
            }
        }

        for (key, value) in vars {
            values.insert(key.to_ascii_lowercase(), value);
        }

        Self::from_values(&values)
    }

    fn from_values(values: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut fields = Fields {
            values,
            issues: Vec::new(),
        };

        let google_api_key = fields.required(GOOGLE_API_KEY);
        let tavily_api_key = fields.required(TAVILY_API_KEY);
        let host = fields.string(HOST, default_host);
        let port = fields.parsed(PORT, default_port());
        let cors_origins = fields.string(CORS_ORIGINS, default_cors_origins);
        let gemini_model = fields.string(GEMINI_MODEL, default_gemini_model);
        let gemini_base_url = fields.string(GEMINI_BASE_URL, default_gemini_base_url);
        let (min, max) = Self::TEMPERATURE_RANGE;
        let temperature = fields.bounded(TEMPERATURE, default_temperature(), min, max);
        let (min, max) = Self::MAX_TOKENS_RANGE;
        let max_tokens = fields.bounded(MAX_TOKENS, default_max_tokens(), min, max);
        let max_file_size = fields.bounded(MAX_FILE_SIZE, default_max_file_size(), 1, u64::MAX);
        let request_timeout_seconds = fields.bounded(
            REQUEST_TIMEOUT_SECONDS,
            default_request_timeout(),
            1,
            u64::MAX,
        );

        match (google_api_key, tavily_api_key) {
            (Some(google_api_key), Some(tavily_api_key)) if fields.issues.is_empty() => Ok(Self {
                google_api_key: ApiKey(google_api_key),
                tavily_api_key: ApiKey(tavily_api_key),
                host,
                port,
                cors_origins,
                gemini_model,
                gemini_base_url,
                temperature,
                max_tokens,
                max_file_size,
                request_timeout_seconds,
            }),
            _ => Err(ConfigError::Invalid(fields.issues)),
        }
    }

    pub fn google_api_key(&self) -> &ApiKey {
        &self.google_api_key
    }

    pub fn tavily_api_key(&self) -> &ApiKey {
        &self.tavily_api_key
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn cors_origins(&self) -> &str {
        &self.cors_origins
    }

    /// Comma-separated origins as a list, trimmed, in order. Empty entries are dropped.
    pub fn cors_origins_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn gemini_model(&self) -> &str {
        &self.gemini_model
    }

    /// API root the Gemini client posts to, e.g. a proxy in front of Google.
    pub fn gemini_base_url(&self) -> &str {
        &self.gemini_base_url
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn request_timeout_seconds(&self) -> u64 {
        self.request_timeout_seconds
    }
}

/// Field reader that records every problem instead of stopping at the first.
struct Fields<'a> {
    values: &'a HashMap<String, String>,
    issues: Vec<SettingsIssue>,
}

impl Fields<'_> {
    /// Non-blank value for `key`. Blank optional values fall back to defaults.
    fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn required(&mut self, key: &'static str) -> Option<String> {
        let value = self.get(key).map(str::to_string);
        if value.is_none() {
            self.issues.push(SettingsIssue::Missing { key });
        }
        value
    }

    fn string(&self, key: &str, default: fn() -> String) -> String {
        self.get(key).map(str::to_string).unwrap_or_else(default)
    }

    fn parsed<T: FromStr>(&mut self, key: &'static str, default: T) -> T {
        let Some(raw) = self.get(key) else {
            return default;
        };
        match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                let value = raw.to_string();
                self.issues.push(SettingsIssue::Unparseable { key, value });
                default
            }
        }
    }

    fn bounded<T>(&mut self, key: &'static str, default: T, min: T, max: T) -> T
    where
        T: FromStr + PartialOrd + Display + Copy,
    {
        let Some(raw) = self.get(key).map(str::to_string) else {
            return default;
        };
        let value = self.parsed(key, default);
        if raw.parse::<T>().is_ok() && !(min..=max).contains(&value) {
            self.issues.push(SettingsIssue::OutOfRange {
                key,
                value: raw,
                min: min.to_string(),
                max: max.to_string(),
            });
            return default;
        }
        value
    }
}

// ============================================================================
// ConfigError
// ============================================================================

/// A single problem found while validating settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsIssue {
    #[error("{key} is required")]
    Missing { key: &'static str },

    #[error("{key} has an invalid value: {value:?}")]
    Unparseable { key: &'static str, value: String },

    #[error("{key} must be between {min} and {max}, got {value}")]
    OutOfRange {
        key: &'static str,
        value: String,
        min: String,
        max: String,
    },
}

impl SettingsIssue {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Missing { key } | Self::Unparseable { key, .. } | Self::OutOfRange { key, .. } => {
                *key
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read env file: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error("invalid settings: {}", join_issues(.0))]
    Invalid(Vec<SettingsIssue>),
}

fn join_issues(issues: &[SettingsIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Tests
// ============================================================================
