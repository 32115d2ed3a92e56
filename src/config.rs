//! Runtime configuration
//!
//! Everything is read once from the environment at startup (the binaries call
//! `dotenv::dotenv()` first) and handed to the adapter constructors.

use crate::error::OrchestrationError;
use crate::llm::RetryPolicy;
use crate::Result;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4";
pub const DEFAULT_ANALYTICS_BASE_URL: &str = "https://analyticsdata.googleapis.com/v1beta";

/// Language model gateway settings (OpenAI-compatible proxy)
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "http://localhost:4000".to_string(),
            model: "gemini-2.5-flash".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub spreadsheet_id: String,
    pub credentials_path: PathBuf,
    pub google_access_token: Option<String>,
    pub sheets_base_url: String,
    pub analytics_base_url: String,
    pub llm: LlmSettings,
    pub retry: RetryPolicy,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            credentials_path: PathBuf::from("credentials.json"),
            google_access_token: None,
            sheets_base_url: DEFAULT_SHEETS_BASE_URL.to_string(),
            analytics_base_url: DEFAULT_ANALYTICS_BASE_URL.to_string(),
            llm: LlmSettings::default(),
            retry: RetryPolicy::default(),
            port: 8080,
        }
    }
}

impl Settings {
    /// Build settings from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(val) = get("SEO_SPREADSHEET_ID") {
            settings.spreadsheet_id = val.trim().to_string();
        }
        if let Some(val) = get("GOOGLE_CREDENTIALS_PATH") {
            settings.credentials_path = PathBuf::from(val);
        }
        if let Some(val) = get("SHEETS_API_BASE_URL") {
            settings.sheets_base_url = val.trim_end_matches('/').to_string();
        }
        if let Some(val) = get("ANALYTICS_API_BASE_URL") {
            settings.analytics_base_url = val.trim_end_matches('/').to_string();
        }

        settings.google_access_token = match get("GOOGLE_ACCESS_TOKEN") {
            Some(token) => Some(token),
            None => read_token_file(&settings.credentials_path),
        };

        if let Some(val) = get("LITELLM_API_KEY") {
            settings.llm.api_key = val;
        }
        if let Some(val) = get("LLM_BASE_URL") {
            settings.llm.base_url = val.trim_end_matches('/').to_string();
        }
        if let Some(val) = get("LLM_MODEL") {
            settings.llm.model = val;
        }
        if let Some(val) = get("LLM_TIMEOUT_SECS") {
            settings.llm.timeout = Duration::from_secs(parse_var("LLM_TIMEOUT_SECS", &val)?);
        }
        if let Some(val) = get("LLM_MAX_RETRIES") {
            settings.retry.max_attempts = parse_var("LLM_MAX_RETRIES", &val)?;
        }
        if let Some(val) = get("LLM_RETRY_BASE_MS") {
            settings.retry.base_delay = Duration::from_millis(parse_var("LLM_RETRY_BASE_MS", &val)?);
        }

        if let Some(val) = get("PORT").or_else(|| get("API_PORT")) {
            settings.port = parse_var("PORT", &val)?;
        }

        Ok(settings)
    }

    /// Sheets is usable only with both a spreadsheet id and a token
    pub fn sheets_configured(&self) -> bool {
        !self.spreadsheet_id.is_empty() && self.google_access_token.is_some()
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        OrchestrationError::ConfigError(format!("{} has an invalid value: {}", key, value))
    })
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(alias = "token")]
    access_token: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Read a pre-minted OAuth access token from the credentials file.
/// Missing or unreadable files simply mean "no token".
fn read_token_file(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let creds: CredentialsFile = match serde_json::from_str(&content) {
        Ok(creds) => creds,
        Err(e) => {
            warn!("Could not parse credentials file {}: {}", path.display(), e);
            return None;
        }
    };

    if creds.access_token.is_none() && creds.kind.as_deref() == Some("service_account") {
        warn!(
            "{} is a service-account key; set GOOGLE_ACCESS_TOKEN with a token minted for it",
            path.display()
        );
    }

    creds.access_token.filter(|t| !t.is_empty())
}
