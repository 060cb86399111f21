//! Route paths and the policies attached to them.

use edugate_core::access::RoutePolicy;

pub const GET_HEALTH: &str = "/health";

pub const POST_AUTH_LOGIN: &str = "/auth/login";
pub const POST_AUTH_REGISTER: &str = "/auth/register";
pub const POST_AUTH_FORGOT_PASSWORD: &str = "/auth/forgot-password";
pub const POST_AUTH_RESET_PASSWORD: &str = "/auth/reset-password";
pub const POST_AUTH_MAGIC_LINK_REQUEST: &str = "/auth/magic-link/request";
pub const POST_AUTH_MAGIC_LINK_VERIFY: &str = "/auth/magic-link/verify";
pub const GET_AUTH_SSO: &str = "/auth/sso/{provider}";
pub const GET_AUTH_SSO_CALLBACK: &str = "/auth/sso/{provider}/callback";
pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
pub const POST_AUTH_LOGOUT: &str = "/auth/logout";
pub const GET_AUTH_ME: &str = "/auth/me";

/// Session routes (`/auth/logout`, `/auth/me`): any active member of the
/// bound tenant and school.
pub fn session_policy() -> RoutePolicy {
    RoutePolicy::authenticated()
}
