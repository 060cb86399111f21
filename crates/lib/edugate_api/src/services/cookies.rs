//! Cookie service: set/clear httpOnly auth cookies.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use edugate_core::models::auth::TokenPair;
use time::Duration;

/// Cookie name for the access token.
pub const ACCESS_COOKIE: &str = "accessToken";
/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "refreshToken";
/// Cookie carrying the SSO `state` between redirect and callback.
pub const SSO_STATE_COOKIE: &str = "ssoState";

/// SSO round trips must finish within this window.
const SSO_STATE_MAX_AGE_SECS: i64 = 10 * 60;

fn build(name: &str, value: &str, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), value.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(max_age)
        .build()
}

/// Build a httpOnly cookie for the access token.
pub fn access_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    build(ACCESS_COOKIE, token, Duration::seconds(max_age_secs), secure)
}

/// Build a httpOnly cookie for the refresh token.
pub fn refresh_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    build(REFRESH_COOKIE, token, Duration::seconds(max_age_secs), secure)
}

pub fn sso_state_cookie(state: &str, secure: bool) -> Cookie<'static> {
    build(
        SSO_STATE_COOKIE,
        state,
        Duration::seconds(SSO_STATE_MAX_AGE_SECS),
        secure,
    )
}

/// Expired cookie that makes the browser drop `name`.
pub fn cleared(name: &str, secure: bool) -> Cookie<'static> {
    build(name, "", Duration::ZERO, secure)
}

/// Set both auth cookies from a freshly issued pair.
pub fn with_session(
    jar: CookieJar,
    tokens: &TokenPair,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    secure: bool,
) -> CookieJar {
    jar.add(access_cookie(&tokens.access_token, access_ttl_secs, secure))
        .add(refresh_cookie(&tokens.refresh_token, refresh_ttl_secs, secure))
}

/// Clear both auth cookies.
pub fn without_session(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(cleared(ACCESS_COOKIE, secure))
        .add(cleared(REFRESH_COOKIE, secure))
}
