//! Cookie helpers: build and clear the httpOnly auth cookies.
//!
//! Max-age values come from the session manager's token lifetimes, so a
//! cookie never outlives or undercuts the token it carries.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use desk_core::auth::sessions::AuthSettings;
use time::Duration;

/// Cookie name for the access token.
pub const ACCESS_COOKIE: &str = "accessToken";
/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "refreshToken";

fn auth_cookie(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(max_age)
        .build()
}

fn to_time(d: chrono::Duration) -> Duration {
    Duration::seconds(d.num_seconds())
}

/// Builds auth cookies with a fixed `Secure` policy and the configured TTLs.
#[derive(Debug, Clone)]
pub struct CookieIssuer {
    secure: bool,
    access_max_age: Duration,
    refresh_max_age: Duration,
}

impl CookieIssuer {
    pub fn new(settings: &AuthSettings, secure: bool) -> Self {
        Self {
            secure,
            access_max_age: to_time(settings.access_ttl),
            refresh_max_age: to_time(settings.refresh_ttl),
        }
    }

    pub fn access(&self, token: &str) -> Cookie<'static> {
        auth_cookie(ACCESS_COOKIE, token.to_string(), self.access_max_age, self.secure)
    }

    pub fn refresh(&self, token: &str) -> Cookie<'static> {
        auth_cookie(REFRESH_COOKIE, token.to_string(), self.refresh_max_age, self.secure)
    }

    /// Add both token cookies to the jar.
    pub fn set_pair(&self, jar: CookieJar, access_token: &str, refresh_token: &str) -> CookieJar {
        jar.add(self.access(access_token))
            .add(self.refresh(refresh_token))
    }

    /// Expire both token cookies.
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        jar.add(auth_cookie(ACCESS_COOKIE, String::new(), Duration::ZERO, self.secure))
            .add(auth_cookie(REFRESH_COOKIE, String::new(), Duration::ZERO, self.secure))
    }
}

/// Read a cookie value straight from request headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
