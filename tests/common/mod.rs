//! Scripted browser and HTTP fakes for driving `AuthSession` without Chrome
//! or the network.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

use qualer_stage::browser::{BrowserCookie, BrowserHandle};
use qualer_stage::cookies::SessionJar;
use qualer_stage::http_client::{HttpRequest, HttpResponse, HttpSession};
use qualer_stage::session::{Credentials, Prompter};
use qualer_stage::{AuthSession, Error, Result, Settings};

pub const BASE: &str = "https://acme.qualer.com";
pub const LANDING: &str = "https://acme.qualer.com/ClientDashboard/Clients";
pub const TOKEN_INPUT: &str =
    r#"<form><input name="__RequestVerificationToken" type="hidden" value="tok-123" /></form>"#;

#[derive(Default)]
pub struct BrowserState {
    pub current_url: String,
    pub pages: HashMap<String, String>,
    pub login_succeeds: bool,
    pub cookies: Vec<BrowserCookie>,
    pub script_result: Value,
    pub navigations: Vec<String>,
    pub typed: Vec<(String, String)>,
    pub scripts: Vec<String>,
    pub quit_calls: usize,
}

/// Browser whose pages, cookies and script results are set up front.
/// Clones share state, so a test keeps one to inspect calls.
#[derive(Clone)]
pub struct FakeBrowser {
    pub state: Arc<Mutex<BrowserState>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        let mut state = BrowserState {
            login_succeeds: true,
            script_result: json!({"error": "no script result configured"}),
            ..Default::default()
        };
        state.pages.insert(
            format!("{}/login", BASE),
            r#"<form id="login"><input id="Email"/><input id="Password"/></form>"#.to_string(),
        );
        state.pages.insert(LANDING.to_string(), TOKEN_INPUT.to_string());
        state.cookies = vec![
            BrowserCookie::new("ASP.NET_SessionId", "sess-1").domain("acme.qualer.com"),
            BrowserCookie::new("__RequestVerificationToken", "cookie-tok-1")
                .domain("acme.qualer.com")
                .path("/"),
        ];
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn failing_login(self) -> Self {
        self.state.lock().unwrap().login_succeeds = false;
        self
    }

    pub fn page(self, url: &str, html: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), html.to_string());
        self
    }

    pub fn script_result(self, result: Value) -> Self {
        self.state.lock().unwrap().script_result = result;
        self
    }

    pub fn set_cookies(&self, cookies: Vec<BrowserCookie>) {
        self.state.lock().unwrap().cookies = cookies;
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.lock().unwrap().scripts.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn quit_calls(&self) -> usize {
        self.state.lock().unwrap().quit_calls
    }
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.navigations.push(url.to_string());
        state.current_url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().current_url.clone())
    }

    async fn page_source(&self) -> Result<String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .pages
            .get(&state.current_url)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string()))
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>> {
        Ok(self.state.lock().unwrap().cookies.clone())
    }

    async fn execute_async_script(&self, script: &str) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        state.scripts.push(script.to_string());
        Ok(state.script_result.clone())
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.current_url.contains("/login") {
            return Err(Error::Browser(format!("no element matches {}", selector)));
        }
        state.typed.push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn press_enter(&self, _selector: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.login_succeeds {
            state.current_url = LANDING.to_string();
        } else {
            state.current_url = format!("{}/login?error=1", BASE);
        }
        Ok(())
    }

    async fn quit(&self) -> Result<()> {
        self.state.lock().unwrap().quit_calls += 1;
        Ok(())
    }
}

type Responder = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync>;

/// HTTP transport answering from a closure and logging every request.
#[derive(Clone)]
pub struct FakeHttp {
    responder: Arc<Responder>,
    pub requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl FakeHttp {
    pub fn new(responder: impl Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static) -> Self {
        Self {
            responder: Arc::new(Box::new(responder)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every request fails at the transport level.
    pub fn unreachable() -> Self {
        Self::new(|_| {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpSession for FakeHttp {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = (self.responder)(&request);
        self.requests.lock().unwrap().push(request);
        response
    }
}

pub fn response(status: u16, content_type: &str, body: &str) -> HttpResponse {
    HttpResponse {
        status: StatusCode::from_u16(status).unwrap(),
        url: String::new(),
        headers: BTreeMap::from([("content-type".to_string(), content_type.to_string())]),
        request_headers: BTreeMap::from([("accept".to_string(), "*/*".to_string())]),
        body: body.to_string(),
    }
}

pub fn json_response(status: u16, body: &str) -> HttpResponse {
    response(status, "application/json; charset=utf-8", body)
}

struct NoPrompt;

impl Prompter for NoPrompt {
    fn prompt(&self, label: &str) -> Result<String> {
        panic!("unexpected prompt for {}", label)
    }

    fn prompt_secret(&self, label: &str) -> Result<String> {
        panic!("unexpected prompt for {}", label)
    }
}

pub fn credentials() -> Credentials {
    Credentials::new(Some("ops@acme.test".into()), Some("pw".into()))
        .with_env(|_| None)
        .with_prompter(NoPrompt)
}

pub fn settings() -> Settings {
    Settings {
        base_url: BASE.to_string(),
        login_wait: Duration::ZERO,
        page_settle: Duration::ZERO,
        ..Settings::default()
    }
}

pub async fn open(
    settings: Settings,
    browser: &FakeBrowser,
    http: &FakeHttp,
) -> Result<AuthSession> {
    AuthSession::open_with(
        settings,
        credentials(),
        Box::new(browser.clone()),
        Box::new(http.clone()),
        Arc::new(SessionJar::new()),
    )
    .await
}
