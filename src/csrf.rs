//! Anti-forgery token extraction.
//!
//! The server embeds its token in a hidden input whose name starts with
//! [`TOKEN_PREFIX`] (sometimes with a path-derived suffix). Only
//! double-quoted attributes are recognised; single-quoted markup reports
//! [`Error::TokenNotFound`].

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Name prefix of the hidden anti-forgery input and cookie.
pub const TOKEN_PREFIX: &str = "__RequestVerificationToken";

// `[^>]*` stops at the nearest `>` so one tag never swallows its neighbour.
static INPUT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<input\b[^>]*>").expect("valid input tag regex"));

static NAME_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|[\s"/])name\s*=\s*"([^"]*)""#).expect("valid name regex")
});

static VALUE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|[\s"/])value\s*=\s*"([^"]*)""#).expect("valid value regex")
});

/// Return `(token_name, token_value)` for the first matching input in
/// document order that carries a non-empty value.
pub fn extract_field(html: &str) -> Result<(String, String)> {
    for tag in INPUT_TAG.find_iter(html) {
        let tag = tag.as_str();
        let Some(name) = attribute(&NAME_ATTR, tag) else {
            continue;
        };
        if !name.starts_with(TOKEN_PREFIX) {
            continue;
        }
        match attribute(&VALUE_ATTR, tag) {
            Some(value) if !value.is_empty() => return Ok((name.to_string(), value.to_string())),
            _ => continue,
        }
    }
    Err(Error::TokenNotFound)
}

/// Return only the token value.
pub fn extract_token(html: &str) -> Result<String> {
    extract_field(html).map(|(_, value)| value)
}

/// Whether a parameter list already carries an anti-forgery token.
pub fn has_token_param(params: &[(String, String)]) -> bool {
    params.iter().any(|(k, _)| k.starts_with(TOKEN_PREFIX))
}

fn attribute<'a>(re: &Regex, tag: &'a str) -> Option<&'a str> {
    // Skip the `<input` prefix so the tag name itself never matches.
    let attrs = &tag[6..];
    re.captures(attrs)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_before_value() {
        let html = r#"
        <html>
            <form>
                <input type="hidden" name="__RequestVerificationToken" value="test-token-123">
            </form>
        </html>"#;
        assert_eq!(extract_token(html).unwrap(), "test-token-123");
    }

    #[test]
    fn test_value_before_name() {
        let html = r#"<form><input type="hidden" value="test-token-456" name="__RequestVerificationToken"></form>"#;
        assert_eq!(extract_token(html).unwrap(), "test-token-456");
    }

    #[test]
    fn test_intervening_attributes() {
        let html = r#"<input type="hidden" name="__RequestVerificationToken" id="csrf-field" class="hidden" value="test-token-789">"#;
        assert_eq!(extract_token(html).unwrap(), "test-token-789");
    }

    #[test]
    fn test_order_independence() {
        let variants = [
            r#"<input name="__RequestVerificationToken" value="same">"#,
            r#"<input value="same" name="__RequestVerificationToken">"#,
            r#"<input id="x" value="same" class="c" name="__RequestVerificationToken" type="hidden">"#,
            "<div>\n   <input\n name=\"__RequestVerificationToken\"\n value=\"same\" />\n</div>",
            r#"<div><form><input type="hidden"name="__RequestVerificationToken"value="same"/></form></div>"#,
        ];
        for html in variants {
            assert_eq!(extract_token(html).unwrap(), "same", "html: {html}");
        }
    }

    #[test]
    fn test_complex_value() {
        let html = r#"<input name="__RequestVerificationToken" value="CfDJ8NvE3x5aBC123+DEF456/GHI789==">"#;
        assert_eq!(
            extract_token(html).unwrap(),
            "CfDJ8NvE3x5aBC123+DEF456/GHI789=="
        );
    }

    #[test]
    fn test_multiple_inputs() {
        let html = r#"
            <input name="username" value="user">
            <input name="__RequestVerificationToken" value="correct-token">
            <input name="password" value="pass">"#;
        assert_eq!(extract_token(html).unwrap(), "correct-token");
    }

    #[test]
    fn test_adjacent_inputs_do_not_leak() {
        let html = r#"<input name="field1" value="value1"><input name="__RequestVerificationToken" value="target-token"><input name="field2" value="value2">"#;
        let token = extract_token(html).unwrap();
        assert_eq!(token, "target-token");
        assert!(!token.contains("value1"));
        assert!(!token.contains("value2"));
    }

    #[test]
    fn test_name_without_value_does_not_borrow_neighbour() {
        let html = r#"<input name="__RequestVerificationToken"><input name="other" value="leak">"#;
        assert!(matches!(extract_token(html), Err(Error::TokenNotFound)));
    }

    #[test]
    fn test_first_token_wins() {
        let html = r#"
            <input name="__RequestVerificationToken" value="first-token">
            <input name="__RequestVerificationToken" value="second-token">"#;
        assert_eq!(extract_token(html).unwrap(), "first-token");
    }

    #[test]
    fn test_empty_value_is_skipped() {
        let html = r#"
            <input name="__RequestVerificationToken" value="">
            <input name="__RequestVerificationToken_L3dvcms1" value="real">"#;
        let (name, value) = extract_field(html).unwrap();
        assert_eq!(name, "__RequestVerificationToken_L3dvcms1");
        assert_eq!(value, "real");
    }

    #[test]
    fn test_suffixed_name() {
        let html = r#"<input name="__RequestVerificationToken_Lw2" type="hidden" value="abc">"#;
        let (name, value) = extract_field(html).unwrap();
        assert_eq!(name, "__RequestVerificationToken_Lw2");
        assert_eq!(value, "abc");
    }

    #[test]
    fn test_data_name_attribute_is_not_name() {
        let html = r#"<input data-name="__RequestVerificationToken" name="other" value="nope">"#;
        assert!(matches!(extract_token(html), Err(Error::TokenNotFound)));
    }

    #[test]
    fn test_not_found() {
        let html = r#"<html><form><input name="username" value="user"></form></html>"#;
        assert!(matches!(extract_token(html), Err(Error::TokenNotFound)));
        assert!(matches!(extract_token(""), Err(Error::TokenNotFound)));
    }

    #[test]
    fn test_single_quotes_unsupported() {
        let html = "<input name='__RequestVerificationToken' value='single-quote-token'>";
        assert!(matches!(extract_token(html), Err(Error::TokenNotFound)));
    }

    #[test]
    fn test_has_token_param() {
        let params = vec![
            ("page".to_string(), "1".to_string()),
            ("__RequestVerificationToken".to_string(), "t".to_string()),
        ];
        assert!(has_token_param(&params));
        assert!(!has_token_param(&params[..1]));
    }
}
