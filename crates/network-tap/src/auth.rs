//! Credentials observed on the page's own calls, reused for the baseline fetch.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use tracing::trace;

static CSRF_COOKIE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|;\s*)ct0=([^;]+)").unwrap());

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthState {
    pub authorization: Option<String>,
    pub csrf: Option<String>,
}

/// Last-write-wins cache of the page's `authorization` and `x-csrf-token` headers.
#[derive(Debug, Default)]
pub struct AuthCache {
    state: RwLock<AuthState>,
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .rev()
        .find(|(key, value)| key.eq_ignore_ascii_case(name) && !value.is_empty())
        .map(|(_, value)| value.as_str())
}

impl AuthCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_from_headers(&self, headers: &[(String, String)]) {
        let authorization = header(headers, "authorization");
        let csrf = header(headers, "x-csrf-token");
        if authorization.is_none() && csrf.is_none() {
            return;
        }
        let mut guard = self.state.write();
        if let Some(value) = authorization {
            guard.authorization = Some(value.to_string());
        }
        if let Some(value) = csrf {
            guard.csrf = Some(value.to_string());
        }
        trace!(target: "network-tap", "cached page credentials");
    }

    pub fn current(&self) -> AuthState {
        self.state.read().clone()
    }

    /// Headers for an authenticated platform call. Falls back to the public
    /// bearer and to the `ct0` cookie when the page has not revealed its own.
    pub fn request_headers(
        &self,
        fallback_authorization: &str,
        cookie: Option<&str>,
        language: &str,
    ) -> Vec<(&'static str, String)> {
        let state = self.current();
        let mut headers = vec![(
            "authorization",
            state
                .authorization
                .unwrap_or_else(|| fallback_authorization.to_string()),
        )];
        if let Some(csrf) = state.csrf.or_else(|| cookie.and_then(csrf_from_cookie)) {
            headers.push(("x-csrf-token", csrf));
        }
        headers.push(("x-twitter-active-user", "yes".to_string()));
        headers.push(("x-twitter-auth-type", "OAuth2Session".to_string()));
        headers.push(("x-twitter-client-language", language.to_string()));
        headers
    }
}

pub fn csrf_from_cookie(cookie: &str) -> Option<String> {
    let raw = CSRF_COOKIE.captures(cookie)?.get(1)?.as_str();
    Some(
        urlencoding::decode(raw)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| raw.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn last_write_wins_and_is_case_insensitive() {
        let cache = AuthCache::new();
        cache.update_from_headers(&pairs(&[("Authorization", "Bearer one")]));
        cache.update_from_headers(&pairs(&[("x-csrf-token", "tok")]));
        cache.update_from_headers(&pairs(&[("AUTHORIZATION", "Bearer two")]));
        assert_eq!(
            cache.current(),
            AuthState {
                authorization: Some("Bearer two".into()),
                csrf: Some("tok".into())
            }
        );
    }

    #[test]
    fn falls_back_to_public_bearer_and_cookie() {
        let cache = AuthCache::new();
        let headers = cache.request_headers("Bearer public", Some("lang=en; ct0=abc%3D; x=1"), "de");
        assert_eq!(headers[0], ("authorization", "Bearer public".to_string()));
        assert!(headers.contains(&("x-csrf-token", "abc=".to_string())));
        assert!(headers.contains(&("x-twitter-client-language", "de".to_string())));
    }

    #[test]
    fn no_csrf_header_without_source() {
        let cache = AuthCache::new();
        let headers = cache.request_headers("Bearer public", None, "en");
        assert!(headers.iter().all(|(name, _)| *name != "x-csrf-token"));
    }
}
