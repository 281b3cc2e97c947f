//! Authenticated session lifecycle.
//!
//! An [`AuthSession`] owns one browser, one HTTP client sharing the
//! browser's cookies, and optionally one staging backend. It logs in once on
//! open and releases everything on [`AuthSession::close`].

pub mod credentials;
mod stage;

pub use credentials::{ConsolePrompter, Credentials, Prompter};

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::browser::{self, BrowserHandle};
use crate::config::Settings;
use crate::cookies::{CookieBridge, SessionJar, SyncSummary};
use crate::csrf;
use crate::error::{Error, Result};
use crate::executor::{resolve_url, EndpointRequest, ExecutedResponse, RequestExecutor};
use crate::http_client::{
    browser_headers, HttpMethod, HttpRequest, HttpResponse, HttpSession, ReqwestSession,
};
use crate::staging::{StagingStore, StorageTarget};
use crate::unwrap::{unwrap_body, Payload};

const EMAIL_FIELD: &str = "#Email";
const PASSWORD_FIELD: &str = "#Password";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// A logged-in Qualer session: browser, HTTP client, cookie jar and
/// staging backend.
///
/// Release is only guaranteed through [`AuthSession::scoped`] or
/// [`AuthSession::run`], which close the session however the body ends, or
/// an explicit [`AuthSession::close`]. Dropping an open session does not
/// quit the browser or close staging: `Drop` cannot await, so it only logs
/// and the Chrome child is left to chromiumoxide's own teardown.
pub struct AuthSession {
    settings: Settings,
    user_agent: String,
    jar: Arc<SessionJar>,
    browser: Option<Box<dyn BrowserHandle>>,
    http: Option<Box<dyn HttpSession>>,
    store: Option<Box<dyn StagingStore>>,
}

impl AuthSession {
    /// Launch Chrome, log in, and build the HTTP client.
    ///
    /// Staging is opened from `settings` (CSV directory, then database URL);
    /// replace it with [`AuthSession::with_store`].
    pub async fn open(settings: Settings, credentials: Credentials) -> Result<Self> {
        let browser = browser::launch(&settings.browser).await?;
        let jar = Arc::new(SessionJar::new());
        let http = match ReqwestSession::new(
            jar.clone(),
            settings.request_timeout,
            &settings.resolved_user_agent(),
        ) {
            Ok(http) => http,
            Err(e) => {
                let _ = browser.quit().await;
                return Err(e);
            }
        };
        Self::open_with(settings, credentials, browser, Box::new(http), jar).await
    }

    /// Log in over an already running browser and HTTP client.
    ///
    /// `jar` must be the jar `http` reads its cookies from.
    pub async fn open_with(
        settings: Settings,
        credentials: Credentials,
        browser: Box<dyn BrowserHandle>,
        http: Box<dyn HttpSession>,
        jar: Arc<SessionJar>,
    ) -> Result<Self> {
        if let Err(e) = login(&settings, &credentials, browser.as_ref(), &jar).await {
            if let Err(quit_err) = browser.quit().await {
                debug!("Browser shutdown after failed login: {}", quit_err);
            }
            return Err(e);
        }

        let target = StorageTarget::select(settings.csv_dir.clone(), settings.db_url.clone());
        let store = match target.open().await {
            Ok(store) => store,
            Err(e) => {
                let _ = browser.quit().await;
                return Err(e);
            }
        };

        Ok(Self {
            user_agent: settings.resolved_user_agent(),
            settings,
            jar,
            browser: Some(browser),
            http: Some(http),
            store,
        })
    }

    /// Open a session, run `f`, and close the session however `f` ends.
    pub async fn scoped<T, F>(settings: Settings, credentials: Credentials, f: F) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut AuthSession) -> BoxFuture<'s, Result<T>>,
    {
        let session = Self::open(settings, credentials).await?;
        session.run(f).await
    }

    /// Run `f` against this session, then close it. The error from `f` takes
    /// precedence over one from closing.
    pub async fn run<T, F>(mut self, f: F) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut AuthSession) -> BoxFuture<'s, Result<T>>,
    {
        let result = f(&mut self).await;
        let closed = self.close().await;
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), _) => Err(e),
        }
    }

    /// Quit the browser and close the staging backend. Safe to call twice.
    pub async fn close(&mut self) -> Result<()> {
        self.http = None;

        if let Some(browser) = self.browser.take() {
            info!("Closing browser");
            if let Err(e) = browser.quit().await {
                warn!("Browser did not shut down cleanly: {}", e);
            }
        }

        if let Some(store) = self.store.take() {
            store.close().await?;
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.browser.is_some() && self.http.is_some()
    }

    /// Use `store` for staging, closing any backend opened from settings.
    pub async fn with_store(mut self, store: Box<dyn StagingStore>) -> Result<Self> {
        if let Some(previous) = self.store.replace(store) {
            previous.close().await?;
        }
        Ok(self)
    }

    pub fn store_backend(&self) -> Option<&dyn StagingStore> {
        self.store.as_deref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn jar(&self) -> &SessionJar {
        &self.jar
    }

    pub fn browser(&self) -> Result<&dyn BrowserHandle> {
        self.browser
            .as_deref()
            .ok_or(Error::SessionNotReady("browser is not running"))
    }

    pub fn http(&self) -> Result<&dyn HttpSession> {
        self.http
            .as_deref()
            .ok_or(Error::SessionNotReady("HTTP session is not initialized"))
    }

    /// Copy the browser's current cookies into the HTTP jar again.
    pub async fn sync_cookies(&self) -> Result<SyncSummary> {
        CookieBridge::sync(self.browser()?, &self.jar).await
    }

    pub fn executor(&self) -> Result<RequestExecutor<'_>> {
        Ok(RequestExecutor::new(
            self.browser()?,
            self.http()?,
            &self.jar,
            &self.settings.base_url,
            &self.user_agent,
            self.settings.page_settle,
        ))
    }

    /// Run one endpoint request through the dual-path executor.
    pub async fn execute(&self, request: &EndpointRequest) -> Result<ExecutedResponse> {
        self.executor()?.execute(request).await
    }

    /// GET `url` with the browser header template. Non-2xx is an error.
    pub async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        referer: Option<&str>,
    ) -> Result<HttpResponse> {
        let url = resolve_url(&self.settings.base_url, url);
        let headers = self.headers(referer, &[]).await?;
        let request = HttpRequest::new(HttpMethod::Get, url)
            .headers(headers)
            .params(params.to_vec());
        self.http()?.send(request).await?.error_for_status()
    }

    /// POST form `data` with the browser header template.
    ///
    /// With `include_csrf`, a token from the browser's current page is added
    /// unless `data` already has one; a page without a token is tolerated.
    pub async fn post(
        &self,
        url: &str,
        data: &[(String, String)],
        referer: Option<&str>,
        include_csrf: bool,
    ) -> Result<HttpResponse> {
        let url = resolve_url(&self.settings.base_url, url);
        let mut data = data.to_vec();
        if include_csrf && !csrf::has_token_param(&data) {
            let page = self.browser()?.page_source().await?;
            match csrf::extract_field(&page) {
                Ok(field) => data.push(field),
                Err(Error::TokenNotFound) => debug!("No anti-forgery token on current page"),
                Err(e) => return Err(e),
            }
        }

        let headers = self
            .headers(referer, &[("content_type", FORM_CONTENT_TYPE)])
            .await?;
        let request = HttpRequest::new(HttpMethod::Post, url)
            .headers(headers)
            .params(data);
        self.http()?.send(request).await?.error_for_status()
    }

    /// Load `url` over HTTP (status checked) and in the browser, returning
    /// the rendered page with any `<pre>`-wrapped JSON unwrapped.
    pub async fn fetch(&self, url: &str) -> Result<Payload> {
        Ok(self.fetch_page(url).await?.0)
    }

    async fn fetch_page(&self, url: &str) -> Result<(Payload, HttpResponse)> {
        let url = resolve_url(&self.settings.base_url, url);
        let request = HttpRequest::new(HttpMethod::Get, url.clone());
        let response = self.http()?.send(request).await?.error_for_status()?;

        let browser = self.browser()?;
        browser.navigate(&url).await?;
        let rendered = browser.page_source().await?;
        let payload = unwrap_body(&rendered, response.content_type())?;
        Ok((payload, response))
    }

    /// Header template with the referer defaulting to the browser's page.
    async fn headers(
        &self,
        referer: Option<&str>,
        extra: &[(&str, &str)],
    ) -> Result<std::collections::BTreeMap<String, String>> {
        let referer = match referer {
            Some(r) => resolve_url(&self.settings.base_url, r),
            None => match self.browser()?.current_url().await {
                Ok(current) if current.starts_with("http") => current,
                _ => format!("{}/", self.settings.base_url.trim_end_matches('/')),
            },
        };
        let mut overrides = vec![("x_requested_with", "XMLHttpRequest")];
        overrides.extend_from_slice(extra);
        Ok(browser_headers(
            &self.settings.base_url,
            &referer,
            &self.user_agent,
            &overrides,
        ))
    }
}

/// Warns only; see the release notes on [`AuthSession`].
impl Drop for AuthSession {
    fn drop(&mut self) {
        if self.browser.is_some() {
            warn!("AuthSession dropped without close(); browser left to its own teardown");
        }
    }
}

async fn login(
    settings: &Settings,
    credentials: &Credentials,
    browser: &dyn BrowserHandle,
    jar: &SessionJar,
) -> Result<()> {
    let login_url = settings.login_url();
    info!("Logging in at {}", login_url);
    browser.navigate(&login_url).await?;

    let username = credentials.username()?;
    browser.type_into(EMAIL_FIELD, &username).await?;
    let password = credentials.password()?;
    browser.type_into(PASSWORD_FIELD, &password).await?;
    browser.press_enter(PASSWORD_FIELD).await?;

    tokio::time::sleep(settings.login_wait).await;

    let landed = browser.current_url().await?;
    if landed.to_ascii_lowercase().contains("login") {
        return Err(Error::Authentication(format!(
            "still on the login page after {:?} ({})",
            settings.login_wait, landed
        )));
    }
    info!("Logged in, landed on {}", landed);

    let summary = CookieBridge::sync(browser, jar).await?;
    debug!("Session jar holds {} cookies", summary.copied);
    Ok(())
}
