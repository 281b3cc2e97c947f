//! Unwrapping of JSON documents rendered inside an HTML `<pre>` shell.
//!
//! Some endpoints are meant for direct navigation, so the browser shows their
//! JSON as `<html><body><pre>{...}</pre></body></html>`.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::Value;

use crate::error::{Error, Result};

static PRE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("pre").expect("valid pre selector"));

/// Body of a fetched page after unwrapping.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// JSON recovered from the page (wrapped or bare).
    Json(Value),
    /// Anything else, returned exactly as rendered.
    Raw(String),
}

impl Payload {
    /// Text form suitable for staging.
    pub fn to_body(&self) -> String {
        match self {
            Payload::Json(value) => value.to_string(),
            Payload::Raw(body) => body.clone(),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }
}

/// Whether a Content-Type header value declares JSON.
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || mime == "text/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

/// Extract the text of the first `<pre>` element, if any.
pub fn pre_text(body: &str) -> Option<String> {
    let document = Html::parse_document(body);
    document
        .select(&PRE)
        .next()
        .map(|pre| pre.text().collect::<String>().trim().to_string())
}

/// Normalize a rendered page.
///
/// - `<pre>` present: the JSON inside it.
/// - no `<pre>` but a JSON content type: [`Error::Unwrap`].
/// - otherwise: the raw body, untouched.
pub fn unwrap_body(body: &str, content_type: Option<&str>) -> Result<Payload> {
    let declared_json = is_json_content_type(content_type);

    match pre_text(body) {
        Some(text) => match serde_json::from_str::<Value>(&text) {
            Ok(value) => Ok(Payload::Json(value)),
            Err(e) if declared_json => Err(Error::Unwrap(format!(
                "<pre> content is not valid JSON: {}",
                e
            ))),
            Err(_) => Ok(Payload::Raw(body.to_string())),
        },
        None if declared_json => Err(Error::Unwrap(
            "couldn't find <pre> tag in response body".to_string(),
        )),
        None => Ok(Payload::Raw(body.to_string())),
    }
}
