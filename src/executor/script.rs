//! In-page `fetch` script used by the browser path.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::http_client::HttpMethod;

/// Headers a page script may not set; the browser supplies its own.
const FORBIDDEN_HEADERS: &[&str] = &[
    "accept-encoding",
    "connection",
    "content-length",
    "cookie",
    "host",
    "origin",
    "referer",
    "user-agent",
];

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// Result of a successful in-page fetch.
#[derive(Debug, Clone)]
pub struct ScriptResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Headers to forward from the HTTP template into the script.
pub fn script_headers(
    headers: &BTreeMap<String, String>,
    method: HttpMethod,
) -> BTreeMap<String, String> {
    let mut forwarded: BTreeMap<String, String> = headers
        .iter()
        .filter(|(name, _)| {
            !name.starts_with("sec-") && !FORBIDDEN_HEADERS.contains(&name.as_str())
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if method == HttpMethod::Post {
        forwarded.insert("content-type".to_string(), FORM_CONTENT_TYPE.to_string());
    }
    forwarded
}

/// Build an async expression performing the request with the page's
/// credentials. Resolves to `{status, headers, body}` or `{error}`.
///
/// `url` must already carry the query string for GET; `body` is the encoded
/// form for POST. Both are embedded as JSON string literals.
pub fn fetch_script(
    method: HttpMethod,
    url: &str,
    headers: &BTreeMap<String, String>,
    body: Option<&str>,
) -> Result<String> {
    let url = serde_json::to_string(url)?;
    let headers = serde_json::to_string(headers)?;
    let body = match (method, body) {
        (HttpMethod::Post, Some(body)) => serde_json::to_string(body)?,
        _ => "undefined".to_string(),
    };

    Ok(format!(
        r#"
        (async () => {{
            try {{
                const response = await fetch({url}, {{
                    method: '{method}',
                    headers: {headers},
                    body: {body},
                    credentials: 'include'
                }});

                if (!response.ok) {{
                    return {{
                        error: `HTTP ${{response.status}}: ${{response.statusText}}`,
                        status: response.status
                    }};
                }}

                return {{
                    status: response.status,
                    headers: Object.fromEntries(response.headers.entries()),
                    body: await response.text()
                }};
            }} catch (e) {{
                return {{ error: e.toString() }};
            }}
        }})()
        "#,
        method = method.as_str(),
    ))
}

/// Interpret the value the script resolved to.
pub fn parse_result(result: Value) -> Result<ScriptResponse> {
    if let Some(error) = result.get("error") {
        let message = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(Error::Fetch(message));
    }

    let status = result
        .get("status")
        .and_then(|s| s.as_u64())
        .ok_or_else(|| Error::Fetch(format!("unexpected script result: {}", result)))?;
    let status = u16::try_from(status)
        .map_err(|_| Error::Fetch(format!("status {} out of range", status)))?;
    let headers = result
        .get("headers")
        .and_then(|h| h.as_object())
        .map(|h| {
            h.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.to_ascii_lowercase(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let body = result
        .get("body")
        .and_then(|b| b.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(ScriptResponse {
        status,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_script_embeds_values_as_literals() {
        let headers = BTreeMap::from([("x-requested-with".to_string(), "XMLHttpRequest".to_string())]);
        let script = fetch_script(
            HttpMethod::Post,
            "https://acme.qualer.com/ClientDashboard/Clients_Read",
            &headers,
            Some("sort=Name-asc&name=O%27Brien"),
        )
        .unwrap();
        assert!(script.contains(r#"fetch("https://acme.qualer.com/ClientDashboard/Clients_Read""#));
        assert!(script.contains(r#"body: "sort=Name-asc&name=O%27Brien""#));
        assert!(script.contains("credentials: 'include'"));
        assert!(script.contains("method: 'POST'"));
        assert!(script.contains(r#""x-requested-with":"XMLHttpRequest""#));
    }

    #[test]
    fn test_get_script_has_no_body() {
        let script = fetch_script(HttpMethod::Get, "https://x/a?b=1", &BTreeMap::new(), Some("ignored")).unwrap();
        assert!(script.contains("body: undefined"));
        assert!(!script.contains("ignored"));
    }

    #[test]
    fn test_quote_in_url_cannot_break_out() {
        let script = fetch_script(HttpMethod::Get, "https://x/a?q='); alert(1); ('", &BTreeMap::new(), None).unwrap();
        assert!(script.contains(r#"fetch("https://x/a?q='); alert(1); ('""#));
    }

    #[test]
    fn test_script_headers_filtering() {
        let headers: BTreeMap<String, String> = [
            ("accept", "*/*"),
            ("origin", "https://x"),
            ("referer", "https://x/"),
            ("sec-fetch-mode", "cors"),
            ("user-agent", "UA"),
            ("x-requested-with", "XMLHttpRequest"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let forwarded = script_headers(&headers, HttpMethod::Post);
        let names: Vec<&str> = forwarded.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, ["accept", "content-type", "x-requested-with"]);
        assert_eq!(forwarded["content-type"], FORM_CONTENT_TYPE);

        assert!(!script_headers(&headers, HttpMethod::Get).contains_key("content-type"));
    }

    #[test]
    fn test_parse_error_result() {
        let err = parse_result(json!({"error": "HTTP 401: Unauthorized", "status": 401})).unwrap_err();
        match err {
            Error::Fetch(msg) => assert_eq!(msg, "HTTP 401: Unauthorized"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_success_result() {
        let parsed = parse_result(json!({
            "status": 200,
            "headers": {"Content-Type": "application/json"},
            "body": "{\"Data\":[]}"
        }))
        .unwrap();
        assert_eq!(parsed.status, 200);
        assert_eq!(parsed.headers["content-type"], "application/json");
        assert_eq!(parsed.body, "{\"Data\":[]}");
    }

    #[test]
    fn test_parse_malformed_result() {
        assert!(matches!(parse_result(json!(null)), Err(Error::Fetch(_))));
    }

    #[test]
    fn test_parse_status_out_of_range() {
        let result = parse_result(json!({"status": 65736, "headers": {}, "body": "{}"}));
        match result {
            Err(Error::Fetch(msg)) => assert!(msg.contains("65736")),
            other => panic!("expected Fetch error, got {:?}", other.map(|r| r.status)),
        }
        assert!(matches!(parse_result(json!({"status": -1})), Err(Error::Fetch(_))));
    }
}
