//! Shared helper functions for CLI commands.

use anyhow::Context;
use clap::Args;

use qualer_stage::repository::util::redact_url_password;
use qualer_stage::staging::DatabaseStore;
use qualer_stage::{Credentials, Settings};

/// Flags shared by commands that log in.
#[derive(Debug, Clone, Args)]
pub struct SessionArgs {
    /// Tenant root URL
    #[arg(long, env = "QUALER_BASE_URL")]
    pub base_url: Option<String>,

    /// Login email (otherwise QUALER_EMAIL / QUALER_USERNAME, then a prompt)
    #[arg(short, long)]
    pub username: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// User agent: a custom string, or "impersonate" for a rotating real one
    #[arg(long)]
    pub user_agent: Option<String>,
}

impl SessionArgs {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(ref url) = self.base_url {
            settings.base_url = url.clone();
        }
        if self.headed {
            settings.browser.headless = false;
        }
        if self.user_agent.is_some() {
            settings.user_agent = self.user_agent.clone();
        }
    }

    /// Password always comes from the environment or a hidden prompt.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), None)
    }
}

/// Parse `NAME=VALUE`.
pub fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got {:?}", raw)),
    }
}

/// Open the configured staging database, creating its table if needed.
pub async fn open_database(settings: &Settings) -> anyhow::Result<DatabaseStore> {
    let url = settings
        .db_url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .context("No staging database configured (set DB_URL or pass --db-url)")?;
    DatabaseStore::connect(url)
        .await
        .with_context(|| format!("Failed to open {}", redact_url_password(url)))
}
