//! HTML form scraping for endpoints that answer with server-rendered forms.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use scraper::{Html, Selector};

static FORM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("form").expect("valid form selector"));
static INPUT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input").expect("valid input selector"));

/// Collect `name -> value` for every named input inside the form with `form_id`.
///
/// Inputs without a `value` map to an empty string. Returns an empty map when
/// the form is missing.
pub fn extract_form_fields(html: &str, form_id: &str) -> BTreeMap<String, String> {
    let document = Html::parse_document(html);
    let mut fields = BTreeMap::new();

    let Some(form) = document
        .select(&FORM)
        .find(|f| f.value().id() == Some(form_id))
    else {
        return fields;
    };

    for input in form.select(&INPUT) {
        let Some(name) = input.value().attr("name").filter(|n| !n.is_empty()) else {
            continue;
        };
        let value = input.value().attr("value").unwrap_or_default();
        fields.insert(name.to_string(), value.to_string());
    }

    fields
}

/// Like [`extract_form_fields`], but when nothing is found returns a single
/// `raw_response` entry holding the first `fallback_len` characters of the page.
pub fn extract_form_fields_or_snippet(
    html: &str,
    form_id: &str,
    fallback_len: usize,
) -> BTreeMap<String, String> {
    let fields = extract_form_fields(html, form_id);
    if !fields.is_empty() {
        return fields;
    }
    let snippet: String = html.chars().take(fallback_len).collect();
    BTreeMap::from([("raw_response".to_string(), snippet)])
}
