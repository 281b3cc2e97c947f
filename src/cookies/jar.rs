//! Cookie jar shared by the HTTP client and the browser bridge.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use reqwest::header::HeaderValue;
use tracing::{debug, warn};
use url::Url;

/// A cookie as held by the jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JarCookie {
    pub name: String,
    pub value: String,
    /// Lowercase domain. Empty matches every host; a leading dot marks a
    /// domain cookie.
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    /// Set by a response without a Domain attribute: exact host match only.
    pub host_only: bool,
}

impl JarCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: String::new(),
            path: "/".to_string(),
            secure: false,
            http_only: false,
            host_only: false,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into().to_ascii_lowercase();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    fn key(&self) -> CookieKey {
        (self.name.clone(), self.domain.clone(), self.path.clone())
    }

    /// Whether this cookie should be sent with a request to `url`.
    pub fn matches(&self, url: &Url) -> bool {
        if self.secure && url.scheme() != "https" {
            return false;
        }
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        domain_matches(&self.domain, &host, self.host_only) && path_matches(&self.path, url.path())
    }
}

type CookieKey = (String, String, String);

/// Thread-safe cookie store keyed by `(name, domain, path)`.
///
/// Writing a cookie with an existing identity replaces its value, so a
/// rotated session cookie never coexists with the stale one.
#[derive(Debug, Default)]
pub struct SessionJar {
    cookies: RwLock<BTreeMap<CookieKey, JarCookie>>,
}

impl SessionJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite by identity.
    pub fn insert(&self, cookie: JarCookie) {
        let mut cookies = self.cookies.write().unwrap_or_else(PoisonError::into_inner);
        cookies.insert(cookie.key(), cookie);
    }

    pub fn remove(&self, name: &str, domain: &str, path: &str) -> Option<JarCookie> {
        let mut cookies = self.cookies.write().unwrap_or_else(PoisonError::into_inner);
        cookies.remove(&(name.to_string(), domain.to_ascii_lowercase(), path.to_string()))
    }

    /// Value of the first cookie named `name`, in identity order.
    pub fn get(&self, name: &str) -> Option<String> {
        let cookies = self.cookies.read().unwrap_or_else(PoisonError::into_inner);
        cookies
            .values()
            .find(|c| c.name == name)
            .map(|c| c.value.clone())
    }

    pub fn len(&self) -> usize {
        self.cookies.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cookies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Every cookie currently held.
    pub fn snapshot(&self) -> Vec<JarCookie> {
        let cookies = self.cookies.read().unwrap_or_else(PoisonError::into_inner);
        cookies.values().cloned().collect()
    }

    /// Cookies that apply to `url`, longest path first.
    pub fn cookies_for(&self, url: &Url) -> Vec<JarCookie> {
        let cookies = self.cookies.read().unwrap_or_else(PoisonError::into_inner);
        let mut matching: Vec<JarCookie> =
            cookies.values().filter(|c| c.matches(url)).cloned().collect();
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        matching
    }

    /// `Cookie` header value for `url`, if any cookie applies.
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let cookies = self.cookies_for(url);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Apply one `Set-Cookie` line received from `url`.
    pub fn apply_set_cookie(&self, line: &str, url: &Url) {
        let parsed = match cookie::Cookie::parse(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Failed to parse Set-Cookie from {}: {}", url, e);
                return;
            }
        };

        let (domain, host_only) = match parsed.domain() {
            Some(d) => (
                format!(".{}", d.trim_start_matches('.').to_ascii_lowercase()),
                false,
            ),
            None => (
                url.host_str().unwrap_or_default().to_ascii_lowercase(),
                true,
            ),
        };
        let path = parsed
            .path()
            .map(str::to_string)
            .unwrap_or_else(|| default_path(url));

        let expired = parsed
            .max_age()
            .map(|age| age.is_zero() || age.is_negative())
            .unwrap_or(false)
            || parsed
                .expires_datetime()
                .map(|at| at.unix_timestamp() <= chrono::Utc::now().timestamp())
                .unwrap_or(false);

        if expired {
            debug!("Server expired cookie {}", parsed.name());
            self.remove(parsed.name(), &domain, &path);
            return;
        }

        debug!("Server set cookie {}", parsed.name());
        self.insert(JarCookie {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            path,
            secure: parsed.secure().unwrap_or(false),
            http_only: parsed.http_only().unwrap_or(false),
            host_only,
        });
    }
}

impl reqwest::cookie::CookieStore for SessionJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        for header in cookie_headers {
            match header.to_str() {
                Ok(line) => self.apply_set_cookie(line, url),
                Err(_) => warn!("Ignoring non-ASCII Set-Cookie from {}", url),
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.header_for(url)
            .and_then(|header| HeaderValue::from_str(&header).ok())
    }
}

fn domain_matches(cookie_domain: &str, host: &str, host_only: bool) -> bool {
    if cookie_domain.is_empty() {
        return true;
    }
    if host_only {
        return cookie_domain == host;
    }
    let domain = cookie_domain.trim_start_matches('.');
    host == domain || host.ends_with(&format!(".{}", domain))
}

fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    if let Some(rest) = request_path.strip_prefix(cookie_path) {
        return cookie_path.ends_with('/') || rest.starts_with('/');
    }
    false
}

/// Directory of the request path, used when Set-Cookie carries no Path.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_overwrite_by_identity() {
        let jar = SessionJar::new();
        jar.insert(JarCookie::new("ASP.NET_SessionId", "old").with_domain("www.qualer.com"));
        jar.insert(JarCookie::new("ASP.NET_SessionId", "new").with_domain("www.qualer.com"));
        assert_eq!(jar.len(), 1);
        assert_eq!(jar.get("ASP.NET_SessionId").as_deref(), Some("new"));
    }

    #[test]
    fn test_same_name_different_path_coexist() {
        let jar = SessionJar::new();
        jar.insert(JarCookie::new("a", "1").with_path("/"));
        jar.insert(JarCookie::new("a", "2").with_path("/api"));
        assert_eq!(jar.len(), 2);

        let header = jar.header_for(&url("https://example.com/api/x")).unwrap();
        assert_eq!(header, "a=2; a=1");
    }

    #[test]
    fn test_domain_matching() {
        let jar = SessionJar::new();
        jar.insert(JarCookie::new("dot", "1").with_domain(".qualer.com"));
        jar.insert(JarCookie::new("bare", "2").with_domain("qualer.com"));
        jar.insert(JarCookie::new("any", "3"));
        jar.insert(JarCookie::new("other", "4").with_domain("example.com"));

        let names = |u: &str| -> Vec<String> {
            let mut n: Vec<_> = jar.cookies_for(&url(u)).into_iter().map(|c| c.name).collect();
            n.sort();
            n
        };

        assert_eq!(names("https://www.qualer.com/"), ["any", "bare", "dot"]);
        assert_eq!(names("https://qualer.com/"), ["any", "bare", "dot"]);
        assert_eq!(names("https://notqualer.com/"), ["any"]);
    }

    #[test]
    fn test_secure_cookie_requires_https() {
        let jar = SessionJar::new();
        jar.insert(JarCookie::new("s", "1").with_secure(true));
        assert!(jar.header_for(&url("http://example.com/")).is_none());
        assert_eq!(jar.header_for(&url("https://example.com/")).unwrap(), "s=1");
    }

    #[test]
    fn test_path_matching() {
        assert!(path_matches("/", "/anything"));
        assert!(path_matches("/api", "/api"));
        assert!(path_matches("/api", "/api/v1"));
        assert!(!path_matches("/api", "/apiary"));
        assert!(!path_matches("/api/", "/api"));
    }

    #[test]
    fn test_set_cookie_rotation() {
        let jar = SessionJar::new();
        let u = url("https://www.qualer.com/clients/get");
        jar.insert(JarCookie::new("sid", "browser").with_domain(".qualer.com"));

        let header = HeaderValue::from_static("sid=rotated; Domain=qualer.com; Path=/; Secure");
        jar.set_cookies(&mut std::iter::once(&header), &u);

        assert_eq!(jar.len(), 1);
        assert_eq!(jar.get("sid").as_deref(), Some("rotated"));
        assert_eq!(
            jar.cookies(&u).unwrap().to_str().unwrap(),
            "sid=rotated"
        );
    }

    #[test]
    fn test_set_cookie_host_only_and_default_path() {
        let jar = SessionJar::new();
        jar.apply_set_cookie("h=1", &url("https://www.qualer.com/Sop/Get"));
        let stored = jar.snapshot().pop().unwrap();
        assert!(stored.host_only);
        assert_eq!(stored.domain, "www.qualer.com");
        assert_eq!(stored.path, "/Sop");
        assert!(jar.header_for(&url("https://sub.www.qualer.com/Sop/x")).is_none());
        assert!(jar.header_for(&url("https://www.qualer.com/Sop/x")).is_some());
    }

    #[test]
    fn test_set_cookie_expiry_removes() {
        let jar = SessionJar::new();
        let u = url("https://www.qualer.com/");
        jar.apply_set_cookie("gone=1; Path=/", &u);
        assert_eq!(jar.len(), 1);
        jar.apply_set_cookie("gone=; Path=/; Max-Age=0", &u);
        assert!(jar.is_empty());

        jar.apply_set_cookie("old=1; Path=/", &u);
        jar.apply_set_cookie("old=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT", &u);
        assert!(jar.is_empty());
    }
}
