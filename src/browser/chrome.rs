//! Chrome over the DevTools protocol.

#[cfg(feature = "browser")]
use std::path::{Path, PathBuf};
#[cfg(feature = "browser")]
use std::time::Duration;

#[cfg(feature = "browser")]
use async_trait::async_trait;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use serde_json::Value;
#[cfg(feature = "browser")]
use tokio::sync::Mutex;
#[cfg(feature = "browser")]
use tokio::task::JoinHandle;
#[cfg(feature = "browser")]
use tracing::{debug, info};

use super::{BrowserHandle, BrowserSettings};
#[cfg(feature = "browser")]
use super::BrowserCookie;
use crate::error::{Error, Result};

/// Common Chrome executable paths to check.
#[cfg(feature = "browser")]
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/google/chrome/google-chrome",
];

#[cfg(feature = "browser")]
fn cdp(e: impl std::fmt::Display) -> Error {
    Error::Browser(e.to_string())
}

/// A launched (or attached) Chrome with the one page the session drives.
#[cfg(feature = "browser")]
pub struct ChromeBrowser {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: JoinHandle<()>,
}

/// Start Chrome according to `settings`, or attach to `remote_url` when set.
#[cfg(feature = "browser")]
pub async fn launch(settings: &BrowserSettings) -> Result<Box<dyn BrowserHandle>> {
    let (browser, mut handler) = match settings.remote_url.as_deref() {
        Some(url) => connect_remote(url, settings.timeout).await?,
        None => {
            info!("Launching browser (headless={})", settings.headless);
            let chrome_path = match &settings.chrome_path {
                Some(path) => path.clone(),
                None => find_chrome()?,
            };

            let mut builder = BrowserConfig::builder()
                .chrome_executable(chrome_path)
                .request_timeout(Duration::from_secs(settings.timeout));

            // with_head means NOT headless
            if !settings.headless {
                builder = builder.with_head();
            }
            if let Some(ref proxy) = settings.proxy {
                builder = builder.arg(format!("--proxy-server={}", proxy));
            }

            builder = builder
                .arg("--disable-blink-features=AutomationControlled")
                .arg("--disable-dev-shm-usage")
                .arg("--no-first-run")
                .arg("--no-default-browser-check")
                .arg("--no-sandbox")
                .arg("--disable-gpu");

            for arg in &settings.chrome_args {
                builder = builder.arg(arg.as_str());
            }

            let config = builder
                .build()
                .map_err(|e| Error::Browser(format!("Failed to build browser config: {}", e)))?;

            Browser::launch(config).await.map_err(cdp)?
        }
    };

    let handler = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    let page = browser.new_page("about:blank").await.map_err(cdp)?;

    Ok(Box::new(ChromeBrowser {
        browser: Mutex::new(Some(browser)),
        page,
        handler,
    }))
}

#[cfg(feature = "browser")]
fn find_chrome() -> Result<PathBuf> {
    for path in CHROME_PATHS {
        let p = Path::new(path);
        if p.exists() {
            info!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    for cmd in &[
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    info!("Found Chrome in PATH: {}", path);
                    return Ok(PathBuf::from(path));
                }
            }
        }
    }

    Err(Error::Browser(
        "Chrome/Chromium not found. Install it or set browser.chrome_path".to_string(),
    ))
}

#[cfg(feature = "browser")]
async fn connect_remote(
    url: &str,
    timeout: u64,
) -> Result<(Browser, chromiumoxide::Handler)> {
    info!(
        "Connecting to remote browser at {} (timeout: {}s)",
        url, timeout
    );

    // The WebSocket URL comes from the /json/version endpoint
    let http_url = url
        .replace("ws://", "http://")
        .replace("wss://", "https://");
    let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

    let resp: Value = reqwest::Client::new()
        .get(&version_url)
        .send()
        .await?
        .json()
        .await?;

    let ws_url = resp
        .get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Browser("No webSocketDebuggerUrl in response".to_string()))?;

    let handler_config = chromiumoxide::handler::HandlerConfig {
        request_timeout: Duration::from_secs(timeout),
        ..Default::default()
    };

    Browser::connect_with_config(ws_url, handler_config)
        .await
        .map_err(cdp)
}

#[cfg(feature = "browser")]
#[async_trait]
impl BrowserHandle for ChromeBrowser {
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        self.page.goto(url).await.map_err(cdp)?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await.map_err(cdp)?.unwrap_or_default())
    }

    async fn page_source(&self) -> Result<String> {
        self.page.content().await.map_err(cdp)
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>> {
        let cookies = self.page.get_cookies().await.map_err(cdp)?;
        debug!("Got {} cookies from browser", cookies.len());
        Ok(cookies
            .into_iter()
            .map(|c| BrowserCookie {
                name: Some(c.name),
                value: Some(c.value),
                domain: Some(c.domain),
                path: Some(c.path),
                secure: Some(c.secure),
                http_only: Some(c.http_only),
            })
            .collect())
    }

    async fn execute_async_script(&self, script: &str) -> Result<Value> {
        self.page
            .evaluate(script.to_string())
            .await
            .map_err(cdp)?
            .into_value()
            .map_err(|e| Error::Browser(format!("Failed to parse script result: {}", e)))
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<()> {
        let element = self.page.find_element(selector).await.map_err(cdp)?;
        element.click().await.map_err(cdp)?;
        element.type_str(text).await.map_err(cdp)?;
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> Result<()> {
        let element = self.page.find_element(selector).await.map_err(cdp)?;
        element.press_key("Enter").await.map_err(cdp)?;
        Ok(())
    }

    async fn quit(&self) -> Result<()> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };
        if let Err(e) = browser.close().await {
            debug!("Browser close failed: {}", e);
        }
        if let Err(e) = browser.wait().await {
            debug!("Browser wait failed: {}", e);
        }
        self.handler.abort();
        Ok(())
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
pub async fn launch(_settings: &BrowserSettings) -> Result<Box<dyn BrowserHandle>> {
    Err(Error::Browser(
        "Browser support not compiled. Rebuild with: cargo build --features browser".to_string(),
    ))
}
