//! Refresh-token cookie protocol.
//!
//! The raw refresh token travels only in a scoped `HttpOnly` cookie. The
//! login endpoint issues it under the broad auth path with a relaxed
//! SameSite policy so cross-origin SPA flows can reach both the refresh and
//! logout endpoints; rotation re-issues it pinned to the refresh endpoint.

use axum::http::{header::InvalidHeaderValue, HeaderMap, HeaderValue};

pub const REFRESH_COOKIE: &str = "refresh_token";

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieScope {
    /// Login-issued: readable by `/api/auth/refresh` and `/api/auth/logout`.
    Login,
    /// Rotation-issued: pinned to the refresh endpoint.
    Refresh,
}

impl CookieScope {
    fn path(self) -> &'static str {
        match self {
            CookieScope::Login => "/api/auth",
            CookieScope::Refresh => "/api/auth/refresh",
        }
    }

    fn same_site(self) -> &'static str {
        match self {
            CookieScope::Login => "None",
            CookieScope::Refresh => "Lax",
        }
    }
}

/// Build the `Set-Cookie` value carrying a freshly issued refresh token.
pub fn set_cookie(
    scope: CookieScope,
    token: &str,
    validity_days: i64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = validity_days * SECONDS_PER_DAY;
    let mut cookie = format!(
        "{REFRESH_COOKIE}={token}; Max-Age={max_age}; Path={}; HttpOnly; SameSite={}",
        scope.path(),
        scope.same_site(),
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Build the `Set-Cookie` value that drops the refresh cookie at the given
/// scope (empty value, `Max-Age=0`).
pub fn clear_cookie(scope: CookieScope, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{REFRESH_COOKIE}=; Max-Age=0; Path={}; HttpOnly; SameSite={}",
        scope.path(),
        scope.same_site(),
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Pull the raw refresh token out of the request's `Cookie` header, if any.
pub fn read_refresh_cookie(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == REFRESH_COOKIE && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_cookie_is_broadly_scoped_and_relaxed() {
        let value = set_cookie(CookieScope::Login, "tok123", 14, true).expect("header value");
        let cookie = value.to_str().expect("ascii");
        assert!(cookie.starts_with("refresh_token=tok123"));
        assert!(cookie.contains("Max-Age=1209600"));
        assert!(cookie.contains("Path=/api/auth;"));
        assert!(cookie.contains("SameSite=None"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
    }

    #[test]
    fn rotation_cookie_is_pinned_to_refresh() {
        let value = set_cookie(CookieScope::Refresh, "tok123", 14, true).expect("header value");
        let cookie = value.to_str().expect("ascii");
        assert!(cookie.contains("Path=/api/auth/refresh"));
        assert!(cookie.contains("SameSite=Lax"));
    }

    #[test]
    fn clear_cookie_empties_value_and_max_age() {
        let value = clear_cookie(CookieScope::Login, true).expect("header value");
        let cookie = value.to_str().expect("ascii");
        assert!(cookie.starts_with("refresh_token=;"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("Path=/api/auth;"));
    }

    #[test]
    fn insecure_flag_drops_secure_attribute() {
        let value = set_cookie(CookieScope::Login, "tok", 1, false).expect("header value");
        assert!(!value.to_str().expect("ascii").contains("Secure"));
    }

    #[test]
    fn read_finds_token_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("theme=dark; refresh_token=abc123; lang=en"),
        );
        assert_eq!(read_refresh_cookie(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn read_ignores_missing_or_empty_cookie() {
        let headers = HeaderMap::new();
        assert_eq!(read_refresh_cookie(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("refresh_token=; theme=dark"),
        );
        assert_eq!(read_refresh_cookie(&headers), None);
    }

    #[test]
    fn issued_cookie_round_trips_through_read() {
        let token = crate::auth::refresh::generate_token();
        let value = set_cookie(CookieScope::Login, &token, 14, true).expect("header value");
        let cookie = value.to_str().expect("ascii");
        let pair = cookie.split(';').next().expect("first attribute");

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_str(pair).expect("cookie header"),
        );
        assert_eq!(read_refresh_cookie(&headers), Some(token));
    }
}
