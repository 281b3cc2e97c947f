//! Copies the browser's cookies into the HTTP jar.

use tracing::debug;

use super::jar::{JarCookie, SessionJar};
use crate::browser::{BrowserCookie, BrowserHandle};
use crate::error::Result;

/// Outcome of one synchronization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub copied: usize,
    pub skipped: usize,
}

/// Keeps the HTTP jar in step with the browser.
///
/// Sync is additive: cookies the browser no longer holds stay in the jar
/// until overwritten by identity.
pub struct CookieBridge;

impl CookieBridge {
    /// Copy every usable browser cookie into `jar`.
    pub async fn sync(browser: &dyn BrowserHandle, jar: &SessionJar) -> Result<SyncSummary> {
        let cookies = browser.cookies().await?;
        let summary = Self::apply(&cookies, jar);
        debug!(
            "Synced {} cookies from browser ({} skipped)",
            summary.copied, summary.skipped
        );
        Ok(summary)
    }

    /// Copy already-read browser cookies into `jar`.
    ///
    /// Records without a name or value are skipped. Missing path defaults to
    /// `/`, missing secure to `false`, missing domain to "any host".
    pub fn apply(cookies: &[BrowserCookie], jar: &SessionJar) -> SyncSummary {
        let mut summary = SyncSummary::default();
        for cookie in cookies {
            match to_jar_cookie(cookie) {
                Some(c) => {
                    jar.insert(c);
                    summary.copied += 1;
                }
                None => summary.skipped += 1,
            }
        }
        summary
    }
}

fn to_jar_cookie(cookie: &BrowserCookie) -> Option<JarCookie> {
    let name = cookie.name.as_deref().filter(|n| !n.is_empty())?;
    let value = cookie.value.as_deref().filter(|v| !v.is_empty())?;

    let mut jar_cookie = JarCookie::new(name, value)
        .with_domain(cookie.domain.as_deref().unwrap_or_default())
        .with_path(cookie.path.as_deref().filter(|p| !p.is_empty()).unwrap_or("/"))
        .with_secure(cookie.secure.unwrap_or(false));
    jar_cookie.http_only = cookie.http_only.unwrap_or(false);
    Some(jar_cookie)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_defaults() {
        let jar = SessionJar::new();
        let summary = CookieBridge::apply(&[BrowserCookie::new("a", "1")], &jar);
        assert_eq!(summary, SyncSummary { copied: 1, skipped: 0 });

        let stored = jar.snapshot().pop().unwrap();
        assert_eq!(stored.path, "/");
        assert_eq!(stored.domain, "");
        assert!(!stored.secure);
    }

    #[test]
    fn test_apply_skips_incomplete_records() {
        let jar = SessionJar::new();
        let cookies = vec![
            BrowserCookie::new("", "1"),
            BrowserCookie::new("b", ""),
            BrowserCookie {
                value: Some("x".into()),
                ..Default::default()
            },
            BrowserCookie::new("kept", "1").domain(".qualer.com"),
        ];
        let summary = CookieBridge::apply(&cookies, &jar);
        assert_eq!(summary, SyncSummary { copied: 1, skipped: 3 });
        assert_eq!(jar.get("kept").as_deref(), Some("1"));
    }

    #[test]
    fn test_apply_keeps_given_fields_and_path_identity() {
        let jar = SessionJar::new();
        let cookies = vec![
            BrowserCookie {
                value: Some("orphan".into()),
                path: Some("/".into()),
                ..Default::default()
            },
            BrowserCookie {
                name: Some("nameless".into()),
                secure: Some(true),
                ..Default::default()
            },
            BrowserCookie::new("sid", "root").domain("acme.qualer.com"),
            BrowserCookie::new("sid", "account")
                .domain("acme.qualer.com")
                .path("/Account")
                .secure(true),
        ];
        let summary = CookieBridge::apply(&cookies, &jar);
        assert_eq!(summary, SyncSummary { copied: 2, skipped: 2 });
        assert_eq!(jar.len(), 2);

        let mut stored = jar.snapshot();
        stored.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(stored[0].path, "/");
        assert_eq!(stored[0].value, "root");
        assert!(!stored[0].secure);
        assert_eq!(stored[1].path, "/Account");
        assert_eq!(stored[1].value, "account");
        assert!(stored[1].secure);
        assert!(stored.iter().all(|c| c.domain == "acme.qualer.com"));
    }

    #[test]
    fn test_repeat_sync_overwrites() {
        let jar = SessionJar::new();
        let first = BrowserCookie::new("sid", "one").domain(".qualer.com").path("/");
        let second = BrowserCookie::new("sid", "two").domain(".qualer.com").path("/");
        CookieBridge::apply(&[first], &jar);
        CookieBridge::apply(&[second], &jar);
        assert_eq!(jar.len(), 1);
        assert_eq!(jar.get("sid").as_deref(), Some("two"));
    }

    #[test]
    fn test_sync_is_additive() {
        let jar = SessionJar::new();
        CookieBridge::apply(&[BrowserCookie::new("old", "1")], &jar);
        CookieBridge::apply(&[BrowserCookie::new("new", "2")], &jar);
        assert_eq!(jar.len(), 2);
    }
}
