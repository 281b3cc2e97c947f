//! Configuration management.
//!
//! Precedence, lowest first: built-in defaults, config file, environment
//! (after `.env` is loaded by the binary), command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::browser::BrowserSettings;
use crate::error::{Error, Result};
use crate::http_client::resolve_user_agent;

/// Name `prefer` discovers config files under (`qualer-stage.toml`,
/// `qualer-stage.json`, ... in the working and user config directories).
pub const CONFIG_NAME: &str = "qualer-stage";

pub const DEFAULT_BASE_URL: &str = "https://jgiquality.qualer.com";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Tenant root, e.g. `https://acme.qualer.com`.
    pub base_url: String,
    /// Login page path relative to `base_url`.
    pub login_path: String,
    /// Wait after submitting the login form.
    pub login_wait: Duration,
    /// Wait after navigating before reading the DOM.
    pub page_settle: Duration,
    /// HTTP request timeout.
    pub request_timeout: Duration,
    /// `None` => Chrome UA, `"impersonate"` => rotating real UA, else custom.
    pub user_agent: Option<String>,
    /// Relational staging target (`DB_URL`).
    pub db_url: Option<String>,
    /// Flat-file staging directory; wins over `db_url`.
    pub csv_dir: Option<PathBuf>,
    pub browser: BrowserSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            login_path: "/login".to_string(),
            login_wait: Duration::from_secs(5),
            page_settle: Duration::from_secs(3),
            request_timeout: Duration::from_secs(30),
            user_agent: None,
            db_url: None,
            csv_dir: None,
            browser: BrowserSettings::default(),
        }
    }
}

impl Settings {
    /// Defaults, then `path` (or the file `prefer` discovers for
    /// [`CONFIG_NAME`]), then environment.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => discover_config_file().await,
        };
        Self::load_with(file.as_deref(), |key| std::env::var(key).ok())
    }

    /// Defaults, then `file` if given, then environment read through `var`.
    pub fn load_with(file: Option<&Path>, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Settings::default();
        if let Some(file) = file {
            debug!("Loading config from {}", file.display());
            Config::load_from_path(file)?.apply_to_settings(&mut settings);
        }
        settings.apply_env(var);
        Ok(settings)
    }

    /// Apply environment overrides read through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("QUALER_BASE_URL") {
            self.base_url = url;
        }
        let secs = |key: &str| get(key).and_then(|v| parse_secs(key, &v));
        if let Some(wait) = secs("QUALER_LOGIN_WAIT_TIME") {
            self.login_wait = wait;
        }
        if let Some(wait) = secs("QUALER_PAGE_LOAD_WAIT_TIME") {
            self.page_settle = wait;
        }
        if let Some(timeout) = secs("QUALER_REQUEST_TIMEOUT") {
            self.request_timeout = timeout;
        }
        if let Some(headless) = get("QUALER_HEADLESS") {
            match parse_bool(&headless) {
                Some(value) => self.browser.headless = value,
                None => warn!("Ignoring QUALER_HEADLESS={:?}: not a boolean", headless),
            }
        }
        if let Some(url) = get("DB_URL") {
            self.db_url = Some(url);
        }
    }

    /// User agent string sent by both the browser headers and HTTP client.
    pub fn resolved_user_agent(&self) -> String {
        resolve_user_agent(self.user_agent.as_deref())
    }

    pub fn login_url(&self) -> String {
        crate::executor::resolve_url(&self.base_url, &self.login_path)
    }
}

/// Locate a config file in the standard locations.
async fn discover_config_file() -> Option<PathBuf> {
    match prefer::load(CONFIG_NAME).await {
        Ok(found) => found.source_path().map(|p| p.to_path_buf()),
        Err(_) => {
            debug!("No {} config file found", CONFIG_NAME);
            None
        }
    }
}

fn parse_secs(key: &str, value: &str) -> Option<Duration> {
    match value.trim().parse::<f64>() {
        Ok(secs) => secs_to_duration(key, secs),
        Err(_) => {
            warn!("Ignoring {}={:?}: expected seconds", key, value);
            None
        }
    }
}

fn secs_to_duration(key: &str, secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        warn!("Ignoring {}={}: expected non-negative seconds", key, secs);
        None
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_path: Option<String>,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_wait: Option<f64>,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_settle: Option<f64>,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserSettings>,
}

impl Config {
    /// Load a TOML (`.toml`) or JSON (anything else) config file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("Failed to parse TOML config: {}", e))),
            _ => serde_json::from_str(&contents)
                .map_err(|e| Error::Config(format!("Failed to parse JSON config: {}", e))),
        }
    }

    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref url) = self.base_url {
            settings.base_url = url.clone();
        }
        if let Some(ref path) = self.login_path {
            settings.login_path = path.clone();
        }
        if let Some(secs) = self.login_wait.and_then(|s| secs_to_duration("login_wait", s)) {
            settings.login_wait = secs;
        }
        if let Some(secs) = self.page_settle.and_then(|s| secs_to_duration("page_settle", s)) {
            settings.page_settle = secs;
        }
        if let Some(secs) = self
            .request_timeout
            .and_then(|s| secs_to_duration("request_timeout", s))
        {
            settings.request_timeout = secs;
        }
        if self.user_agent.is_some() {
            settings.user_agent = self.user_agent.clone();
        }
        if self.db_url.is_some() {
            settings.db_url = self.db_url.clone();
        }
        if self.csv_dir.is_some() {
            settings.csv_dir = self.csv_dir.clone();
        }
        if let Some(ref browser) = self.browser {
            settings.browser = browser.clone();
        }
    }
}
