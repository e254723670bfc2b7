//! Backend credentials and reporting windows, read from the environment.

use chrono::Duration;
use std::path::PathBuf;
use std::time::Duration as StdDuration;
use zeroize::Zeroizing;

use crate::error::{BooksError, Result};

const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
const ENV_ANON_KEY: &str = "SUPABASE_ANON_KEY";
const ENV_SERVICE_ROLE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
const ENV_CURRENCY: &str = "BOOKS_CURRENCY";
const ENV_DAILY_WINDOW: &str = "BOOKS_DAILY_WINDOW_DAYS";
const ENV_SUMMARY_WINDOW: &str = "BOOKS_SUMMARY_WINDOW_DAYS";
const ENV_TIMEOUT: &str = "BOOKS_REQUEST_TIMEOUT_SECS";
const ENV_LOG_DIR: &str = "BOOKS_LOG_DIR";

pub const DEFAULT_CURRENCY: &str = "TZS";
pub const DEFAULT_DAILY_WINDOW_DAYS: i64 = 7;
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Trailing time span a report is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Days(i64),
    Unbounded,
}

impl Window {
    /// Lower bound on `created_at` for a report computed at `now`.
    pub fn since(
        &self,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<chrono::DateTime<chrono::Utc>> {
        match self {
            Window::Days(days) => Some(
                Duration::try_days(*days)
                    .and_then(|span| now.checked_sub_signed(span))
                    .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC),
            ),
            Window::Unbounded => None,
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub anon_key: Zeroizing<String>,
    /// Only needed for privileged user creation.
    pub service_role_key: Option<Zeroizing<String>>,
    pub currency: String,
    pub daily_window: Window,
    pub summary_window: Window,
    pub request_timeout: StdDuration,
    pub log_dir: Option<PathBuf>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("supabase_url", &self.supabase_url)
            .field("anon_key", &"<redacted>")
            .field("service_role_key", &self.service_role_key.as_ref().map(|_| "<redacted>"))
            .field("currency", &self.currency)
            .field("daily_window", &self.daily_window)
            .field("summary_window", &self.summary_window)
            .field("request_timeout", &self.request_timeout)
            .field("log_dir", &self.log_dir)
            .finish()
    }
}

impl AppConfig {
    /// Build a config with default windows for the given project.
    pub fn new(supabase_url: &str, anon_key: &str) -> Result<Self> {
        let supabase_url = normalize_supabase_url(supabase_url);
        if supabase_url.is_empty() {
            return Err(BooksError::Config("Supabase URL is empty".into()));
        }
        if anon_key.trim().is_empty() {
            return Err(BooksError::Config("Supabase anon key is empty".into()));
        }
        Ok(Self {
            supabase_url,
            anon_key: Zeroizing::new(anon_key.trim().to_string()),
            service_role_key: None,
            currency: DEFAULT_CURRENCY.to_string(),
            daily_window: Window::Days(DEFAULT_DAILY_WINDOW_DAYS),
            summary_window: Window::Unbounded,
            request_timeout: StdDuration::from_secs(DEFAULT_TIMEOUT_SECS),
            log_dir: None,
        })
    }

    pub fn with_service_role_key(mut self, key: &str) -> Self {
        let key = key.trim();
        self.service_role_key = (!key.is_empty()).then(|| Zeroizing::new(key.to_string()));
        self
    }

    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        let url = required_env(ENV_SUPABASE_URL)?;
        let anon_key = Zeroizing::new(required_env(ENV_ANON_KEY)?);
        let mut config = Self::new(&url, &anon_key)?;

        if let Some(key) = optional_env(ENV_SERVICE_ROLE_KEY) {
            config = config.with_service_role_key(&key);
        }
        if let Some(currency) = optional_env(ENV_CURRENCY) {
            config.currency = currency.to_uppercase();
        }
        if let Some(raw) = optional_env(ENV_DAILY_WINDOW) {
            config.daily_window = parse_window(ENV_DAILY_WINDOW, &raw)?;
        }
        if let Some(raw) = optional_env(ENV_SUMMARY_WINDOW) {
            config.summary_window = parse_window(ENV_SUMMARY_WINDOW, &raw)?;
        }
        if let Some(raw) = optional_env(ENV_TIMEOUT) {
            let secs = raw
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| BooksError::Config(format!("{ENV_TIMEOUT} must be a positive integer")))?;
            config.request_timeout = StdDuration::from_secs(secs);
        }
        config.log_dir = optional_env(ENV_LOG_DIR).map(PathBuf::from);
        Ok(config)
    }

    /// The service role key, or the configuration error privileged
    /// operations surface when it is absent.
    pub fn require_service_role_key(&self) -> Result<&str> {
        self.service_role_key
            .as_ref()
            .map(|k| k.as_str())
            .ok_or_else(|| BooksError::Config("Server configuration error".into()))
    }

    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.supabase_url)
    }

    pub fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.supabase_url, path.trim_start_matches('/'))
    }
}

/// Normalise the project URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes and a trailing `/rest/v1` or `/auth/v1`
pub fn normalize_supabase_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    for suffix in ["/rest/v1", "/auth/v1"] {
        if url.ends_with(suffix) {
            url.truncate(url.len() - suffix.len());
        }
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}

fn required_env(key: &str) -> Result<String> {
    optional_env(key).ok_or_else(|| BooksError::Config(format!("Missing {key} environment variable")))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `all`/`unbounded` or a positive day count that still lands on a
/// representable date.
fn parse_window(key: &str, raw: &str) -> Result<Window> {
    match raw.to_lowercase().as_str() {
        "all" | "unbounded" => Ok(Window::Unbounded),
        other => other
            .parse::<i64>()
            .ok()
            .filter(|d| *d > 0)
            .filter(|d| {
                Duration::try_days(*d)
                    .and_then(|span| chrono::Utc::now().checked_sub_signed(span))
                    .is_some()
            })
            .map(Window::Days)
            .ok_or_else(|| BooksError::Config(format!("{key} must be a positive day count or 'all'"))),
    }
}
