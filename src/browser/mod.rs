//! Browser automation seam.
//!
//! The authenticated session lives in a real browser. Everything above this
//! module talks to it through [`BrowserHandle`], so tests can substitute a
//! scripted fake for Chrome.

mod chrome;
mod config;
mod types;

pub use chrome::launch;
pub use config::BrowserSettings;
pub use types::BrowserCookie;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Operations the session needs from a live browser.
///
/// All calls act on the single page the session drives.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Navigate and wait for the load to finish.
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Rendered HTML of the current document.
    async fn page_source(&self) -> Result<String>;

    /// Every cookie the browser holds for the current page.
    async fn cookies(&self) -> Result<Vec<BrowserCookie>>;

    /// Evaluate an expression that resolves to a JSON-serializable value.
    /// Promises are awaited.
    async fn execute_async_script(&self, script: &str) -> Result<Value>;

    /// Type text into the first element matching a CSS selector.
    async fn type_into(&self, selector: &str, text: &str) -> Result<()>;

    /// Send an Enter key press to the first element matching a CSS selector.
    async fn press_enter(&self, selector: &str) -> Result<()>;

    /// Shut the browser down. Calling twice is harmless.
    async fn quit(&self) -> Result<()>;
}
