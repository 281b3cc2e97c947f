//! Dual-path request execution.
//!
//! A request is first sent directly over HTTP. Some endpoints validate a live
//! page context that a plain client cannot reproduce, so when the direct
//! attempt is rejected the same request is replayed once from inside the
//! authenticated browser tab with `fetch`. There are exactly two attempts.

pub mod script;

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::browser::BrowserHandle;
use crate::cookies::{CookieBridge, SessionJar};
use crate::csrf;
use crate::error::{Error, Result};
use crate::http_client::{browser_headers, HttpMethod, HttpRequest, HttpSession};
use crate::unwrap::is_json_content_type;

/// One logical call against an internal endpoint.
#[derive(Debug, Clone)]
pub struct EndpointRequest {
    pub method: HttpMethod,
    /// Path relative to the base URL, or an absolute URL.
    pub path: String,
    /// Query parameters for GET, form fields for POST.
    pub params: Vec<(String, String)>,
    /// Page whose load establishes the referer and fresh cookies.
    pub auth_context_page: String,
    /// Attach an anti-forgery token. Defaults to true for POST.
    pub include_csrf: bool,
    /// Extra headers; underscores in names become hyphens.
    pub headers: Vec<(String, String)>,
}

impl EndpointRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            auth_context_page: "/".to_string(),
            include_csrf: method == HttpMethod::Post,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn context_page(mut self, page: impl Into<String>) -> Self {
        self.auth_context_page = page.into();
        self
    }

    pub fn include_csrf(mut self, include: bool) -> Self {
        self.include_csrf = include;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn wants_token(&self) -> bool {
        self.method == HttpMethod::Post && self.include_csrf && !csrf::has_token_param(&self.params)
    }
}

/// Which attempt produced the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPath {
    Http,
    Browser,
}

/// Parsed JSON payload plus what is needed to stage it.
#[derive(Debug, Clone)]
pub struct ExecutedResponse {
    pub payload: Value,
    pub path: FetchPath,
    pub url: String,
    pub status: u16,
    pub request_headers: BTreeMap<String, String>,
    pub response_headers: BTreeMap<String, String>,
}

/// Runs [`EndpointRequest`]s against the session's browser and HTTP client.
pub struct RequestExecutor<'a> {
    browser: &'a dyn BrowserHandle,
    http: &'a dyn HttpSession,
    jar: &'a SessionJar,
    base_url: &'a str,
    user_agent: &'a str,
    settle: Duration,
}

impl<'a> RequestExecutor<'a> {
    pub fn new(
        browser: &'a dyn BrowserHandle,
        http: &'a dyn HttpSession,
        jar: &'a SessionJar,
        base_url: &'a str,
        user_agent: &'a str,
        settle: Duration,
    ) -> Self {
        Self {
            browser,
            http,
            jar,
            base_url,
            user_agent,
            settle,
        }
    }

    /// Absolute URL for a path, or the path itself when already absolute.
    pub fn resolve(&self, path: &str) -> String {
        resolve_url(self.base_url, path)
    }

    pub async fn execute(&self, request: &EndpointRequest) -> Result<ExecutedResponse> {
        let url = self.resolve(&request.path);
        let referer = self.resolve(&request.auth_context_page);
        let headers = self.headers_for(request, &referer);

        let mut params = request.params.clone();
        let mut http_allowed = true;
        if request.wants_token() {
            let page = self.browser.page_source().await?;
            match csrf::extract_field(&page) {
                Ok(field) => params.push(field),
                Err(Error::TokenNotFound) => {
                    info!("No anti-forgery token on current page, skipping direct HTTP for {}", url);
                    http_allowed = false;
                }
                Err(e) => return Err(e),
            }
        }

        if http_allowed {
            match self.attempt_http(request.method, &url, &headers, params).await {
                Ok(response) => return Ok(response),
                Err(e) => warn!("Direct HTTP rejected for {}: {}; retrying in browser", url, e),
            }
        }

        self.attempt_browser(request, &url, &referer, &headers).await
    }

    fn headers_for(&self, request: &EndpointRequest, referer: &str) -> BTreeMap<String, String> {
        let mut overrides: Vec<(&str, &str)> = vec![("x_requested_with", "XMLHttpRequest")];
        overrides.extend(request.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        browser_headers(self.base_url, referer, self.user_agent, &overrides)
    }

    async fn attempt_http(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &BTreeMap<String, String>,
        params: Vec<(String, String)>,
    ) -> Result<ExecutedResponse> {
        let request = HttpRequest::new(method, url)
            .headers(headers.clone())
            .params(params);
        let response = self.http.send(request).await?.error_for_status()?;

        // A login page or HTML error shell served with 200 is a rejection too.
        let payload: Value = response.json().inspect_err(|_| {
            if !is_json_content_type(response.content_type()) {
                debug!(
                    "Direct HTTP returned {:?} instead of JSON",
                    response.content_type()
                );
            }
        })?;

        Ok(ExecutedResponse {
            payload,
            path: FetchPath::Http,
            url: response.url,
            status: response.status.as_u16(),
            request_headers: response.request_headers,
            response_headers: response.headers,
        })
    }

    async fn attempt_browser(
        &self,
        request: &EndpointRequest,
        url: &str,
        context_url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<ExecutedResponse> {
        info!("Fetching {} through browser context {}", url, context_url);
        self.browser.navigate(context_url).await?;
        tokio::time::sleep(self.settle).await;
        CookieBridge::sync(self.browser, self.jar).await?;

        let mut params = request.params.clone();
        if request.wants_token() {
            let page = self.browser.page_source().await?;
            match csrf::extract_field(&page) {
                Ok(field) => params.push(field),
                Err(Error::TokenNotFound) => {
                    warn!("No anti-forgery token on {}, proceeding without it", context_url)
                }
                Err(e) => return Err(e),
            }
        }

        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&params)
            .finish();
        let (target, body) = match request.method {
            HttpMethod::Get if !encoded.is_empty() => {
                let sep = if url.contains('?') { '&' } else { '?' };
                (format!("{}{}{}", url, sep, encoded), None)
            }
            HttpMethod::Get => (url.to_string(), None),
            HttpMethod::Post => (url.to_string(), Some(encoded.as_str())),
        };

        let script_headers = script::script_headers(headers, request.method);
        let js = script::fetch_script(request.method, &target, &script_headers, body)?;
        let result = self.browser.execute_async_script(&js).await?;
        let response = script::parse_result(result)?;

        let payload: Value = serde_json::from_str(&response.body).map_err(|e| {
            Error::Fetch(format!("{} returned a non-JSON body: {}", target, e))
        })?;

        Ok(ExecutedResponse {
            payload,
            path: FetchPath::Browser,
            url: target,
            status: response.status,
            request_headers: script_headers,
            response_headers: response.headers,
        })
    }
}

/// Join `path` onto `base_url` unless it is already absolute.
pub fn resolve_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
