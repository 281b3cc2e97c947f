//! Browser-like request header template.

use std::collections::BTreeMap;

use chrono::Utc;

/// Headers a Chrome tab sends for a same-origin XHR, keyed by lowercase name.
///
/// `overrides` are applied last; underscores in their keys become hyphens
/// (`x_requested_with` => `x-requested-with`).
pub fn browser_headers(
    base_url: &str,
    referer: &str,
    user_agent: &str,
    overrides: &[(&str, &str)],
) -> BTreeMap<String, String> {
    let origin = base_url.trim_end_matches('/');
    let mut headers: BTreeMap<String, String> = [
        ("accept", "*/*"),
        ("accept-language", "en-US,en;q=0.9"),
        ("cache-control", "no-cache, must-revalidate"),
        ("origin", origin),
        ("pragma", "no-cache"),
        ("priority", "u=1, i"),
        ("referer", referer),
        (
            "sec-ch-ua",
            r#""Google Chrome";v="120", "Chromium";v="120", "Not A(Brand";v="24""#,
        ),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", r#""Windows""#),
        ("sec-fetch-dest", "empty"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-origin"),
        ("user-agent", user_agent),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    headers.insert(
        "clientrequesttime".to_string(),
        Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
    );

    for (key, value) in overrides {
        headers.insert(key.replace('_', "-").to_ascii_lowercase(), value.to_string());
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template() {
        let headers = browser_headers("https://acme.qualer.com/", "https://acme.qualer.com/clients", "UA", &[]);
        assert_eq!(headers["origin"], "https://acme.qualer.com");
        assert_eq!(headers["referer"], "https://acme.qualer.com/clients");
        assert_eq!(headers["user-agent"], "UA");
        assert_eq!(headers["clientrequesttime"].len(), "2024-01-01T00:00:00".len());
    }

    #[test]
    fn test_overrides_hyphenated() {
        let headers = browser_headers(
            "https://x",
            "https://x/",
            "UA",
            &[("x_requested_with", "XMLHttpRequest"), ("accept", "application/json")],
        );
        assert_eq!(headers["x-requested-with"], "XMLHttpRequest");
        assert_eq!(headers["accept"], "application/json");
        assert!(!headers.contains_key("x_requested_with"));
    }
}
