//! Integration tests: drive the router over in-memory stores.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{Extension, Json, Router};
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, HOST, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::get;
use chrono::Utc;
use edugate_api::config::ApiConfig;
use edugate_api::middleware::pipeline::Pipeline;
use edugate_api::{AppState, router, with_pipeline};
use edugate_core::access::RoutePolicy;
use edugate_core::auth::AuthError;
use edugate_core::auth::delivery::TokenDelivery;
use edugate_core::auth::jwt::TokenIssuer;
use edugate_core::auth::password::hash_password;
use edugate_core::auth::service::AuthService;
use edugate_core::auth::sso::{SsoProfile, SsoProvider, SsoRegistry};
use edugate_core::memory::{MemoryProvisioner, MemoryTenantDirectory, MemoryUserStore};
use edugate_core::models::tenant::{School, Tenant, TenantContext};
use edugate_core::models::user::{AuthenticatedUser, UserRecord, UserRole, UserStatus};
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;

const ACME: &str = "acme.edugate.test";
const OTHER: &str = "other.edugate.test";

#[derive(Default)]
struct CapturingDelivery {
    magic: Mutex<Vec<String>>,
}

#[async_trait]
impl TokenDelivery for CapturingDelivery {
    async fn deliver_password_reset(&self, _: &str, _: &str, _: &str) -> Result<(), AuthError> {
        Ok(())
    }

    async fn deliver_magic_link(&self, _: &str, _: &str, token: &str) -> Result<(), AuthError> {
        self.magic.lock().unwrap().push(token.to_string());
        Ok(())
    }

    async fn deliver_email_verification(
        &self,
        _: &str,
        _: &str,
        _: &str,
    ) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Provider whose callback `code` is the external user id.
struct FakeProvider;

#[async_trait]
impl SsoProvider for FakeProvider {
    fn authorize_url(&self, state: &str) -> Result<Url, AuthError> {
        let mut url = Url::parse("https://sso.example.com/authorize")
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        url.query_pairs_mut().append_pair("state", state);
        Ok(url)
    }

    async fn exchange(&self, code: &str) -> Result<SsoProfile, AuthError> {
        Ok(SsoProfile {
            provider: "fake".into(),
            provider_user_id: code.into(),
            email: "someone@b.com".into(),
            first_name: None,
            last_name: None,
        })
    }
}

struct TestApp {
    app: Router,
    state: AppState,
    users: Arc<MemoryUserStore>,
    delivery: Arc<CapturingDelivery>,
}

fn tenant(id: &str, subdomain: &str) -> Tenant {
    Tenant {
        id: id.into(),
        subdomain: subdomain.into(),
        custom_domain: None,
        database_name: subdomain.into(),
        is_active: true,
    }
}

fn user(id: &str, email: &str, role: UserRole) -> UserRecord {
    UserRecord {
        id: id.into(),
        tenant_id: "T1".into(),
        school_id: None,
        email: email.into(),
        password_hash: Some(hash_password("right-password", 4).unwrap()),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        role,
        status: UserStatus::Active,
        sso_provider: None,
        sso_id: None,
        reset_password_token: None,
        reset_password_expires: None,
        magic_link_token: None,
        magic_link_expires: None,
        email_verification_token: None,
        last_login_at: None,
        created_at: Utc::now(),
    }
}

fn test_app() -> TestApp {
    let directory = Arc::new(MemoryTenantDirectory::new());
    directory.insert_tenant(tenant("T1", "acme"));
    directory.insert_tenant(tenant("T2", "other"));
    directory.insert_school(School {
        id: "S1".into(),
        tenant_id: "T1".into(),
        code: "NORTH".into(),
        is_active: true,
    });
    directory.insert_school(School {
        id: "S9".into(),
        tenant_id: "T2".into(),
        code: "SOUTH".into(),
        is_active: true,
    });

    let users = Arc::new(MemoryUserStore::new());
    users.insert(user("u1", "a@b.com", UserRole::Student));
    users.insert(user("u2", "admin@b.com", UserRole::Admin));

    let delivery = Arc::new(CapturingDelivery::default());
    let issuer = TokenIssuer::new("access-secret", "15m", "refresh-secret", "7d").unwrap();
    let auth = AuthService::new(users.clone(), directory.clone(), issuer, delivery.clone())
        .with_bcrypt_cost(4);

    let mut sso = SsoRegistry::new();
    sso.register("fake", Arc::new(FakeProvider));

    let state = AppState {
        auth: Arc::new(auth),
        directory,
        provisioner: Arc::new(MemoryProvisioner::new()),
        sso: Arc::new(sso),
        config: ApiConfig {
            bind_addr: "127.0.0.1:0".into(),
            database_url: "postgres://unused".into(),
            access_secret: "access-secret".into(),
            access_duration: "15m".into(),
            refresh_secret: "refresh-secret".into(),
            refresh_duration: "7d".into(),
            secure_cookies: false,
            bcrypt_cost: 4,
        },
    };

    TestApp {
        app: router(state.clone()),
        state,
        users,
        delivery,
    }
}

fn post_json(path: &str, host: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(HOST, host)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_req(path: &str, host: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(path).header(HOST, host)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let resp = app.clone().oneshot(req).await.expect("request");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse JSON")
    };
    (status, headers, body)
}

/// `name=value` of the first `Set-Cookie` for `name`.
fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{name}=")))
        .map(|v| v.split(';').next().unwrap_or_default().to_string())
}

fn set_cookie_line(headers: &HeaderMap, name: &str) -> String {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{name}=")))
        .unwrap_or_default()
        .to_string()
}

async fn login(t: &TestApp, email: &str) -> (HeaderMap, Value) {
    let (status, headers, body) = send(
        &t.app,
        post_json(
            "/auth/login",
            ACME,
            json!({"email": email, "password": "right-password"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    (headers, body)
}

async fn access_token(t: &TestApp, email: &str) -> String {
    let (headers, _) = login(t, email).await;
    cookie(&headers, "accessToken")
        .and_then(|c| c.strip_prefix("accessToken=").map(str::to_string))
        .expect("access cookie")
}

// ---------------------------------------------------------------------------
// Tenant binding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_needs_no_tenant() {
    let t = test_app();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _, body) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unknown_tenant_fails_closed_without_naming_it() {
    let t = test_app();
    let (status, _, body) = send(
        &t.app,
        post_json(
            "/auth/login",
            "ghost.edugate.test",
            json!({"email": "a@b.com", "password": "right-password"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(!body.to_string().contains("ghost"));
}

#[tokio::test]
async fn missing_host_is_unauthorized() {
    let t = test_app();
    let req = Request::builder()
        .method("POST")
        .uri("/auth/forgot-password")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"email": "a@b.com"}).to_string()))
        .unwrap();
    let (status, _, body) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "tenant information not found");
}

#[tokio::test]
async fn foreign_school_header_is_not_found() {
    let t = test_app();
    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(HOST, ACME)
        .header("x-school-id", "S9")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"email": "a@b.com", "password": "right-password"}).to_string(),
        ))
        .unwrap();
    let (status, _, _) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Login and registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_sets_cookies_and_scopes_session() {
    let t = test_app();
    let before = Utc::now().timestamp_millis();
    let (headers, body) = login(&t, "a@b.com").await;

    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["tenantId"], "T1");
    assert_eq!(body["user"]["userType"], "student");
    assert!(body["expiresAt"].as_i64().unwrap() > before);

    let access = set_cookie_line(&headers, "accessToken");
    assert!(access.contains("HttpOnly"));
    assert!(access.contains("SameSite=Lax"));
    assert!(access.contains("Max-Age=900"));
    assert!(set_cookie_line(&headers, "refreshToken").contains("Max-Age=604800"));
}

#[tokio::test]
async fn wrong_password_and_unknown_email_share_one_response() {
    let t = test_app();
    let (s1, _, wrong) = send(
        &t.app,
        post_json(
            "/auth/login",
            ACME,
            json!({"email": "a@b.com", "password": "wrong-password"}),
        ),
    )
    .await;
    let (s2, _, missing) = send(
        &t.app,
        post_json(
            "/auth/login",
            ACME,
            json!({"email": "nobody@b.com", "password": "right-password"}),
        ),
    )
    .await;
    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!(s2, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong, missing);
    assert_eq!(wrong["message"], "Invalid email or password");
}

#[tokio::test]
async fn register_statuses() {
    let t = test_app();
    let (status, _, body) = send(
        &t.app,
        post_json(
            "/auth/register",
            ACME,
            json!({"email": "new@b.com", "password": "long-enough", "firstName": "New"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["status"], "pending");
    assert_eq!(body["user"]["userType"], "student");

    let (status, _, _) = send(
        &t.app,
        post_json(
            "/auth/register",
            ACME,
            json!({"email": "a@b.com", "password": "long-enough"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(
        &t.app,
        post_json(
            "/auth/register",
            ACME,
            json!({"email": "other@b.com", "password": "long-enough", "schoolId": "S9"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Single-use tokens
// ---------------------------------------------------------------------------

#[tokio::test]
async fn email_requests_answer_identically_for_unknown_accounts() {
    let t = test_app();
    for path in ["/auth/forgot-password", "/auth/magic-link/request"] {
        let (s1, _, known) = send(&t.app, post_json(path, ACME, json!({"email": "a@b.com"}))).await;
        let (s2, _, unknown) =
            send(&t.app, post_json(path, ACME, json!({"email": "ghost@b.com"}))).await;
        assert_eq!(s1, StatusCode::OK, "{path}");
        assert_eq!(s2, StatusCode::OK, "{path}");
        assert_eq!(known, unknown, "{path}");
    }
    // Only the real account got a link.
    assert_eq!(t.delivery.magic.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn magic_link_verifies_once() {
    let t = test_app();
    let (status, _, _) = send(
        &t.app,
        post_json("/auth/magic-link/request", ACME, json!({"email": "a@b.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = t.delivery.magic.lock().unwrap().last().cloned().unwrap();

    let (status, headers, body) = send(
        &t.app,
        post_json("/auth/magic-link/verify", ACME, json!({"token": token})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], "u1");
    assert!(cookie(&headers, "accessToken").is_some());

    let (status, _, _) = send(
        &t.app,
        post_json("/auth/magic-link/verify", ACME, json!({"token": token})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn me_accepts_bearer_or_cookie() {
    let t = test_app();
    let token = access_token(&t, "a@b.com").await;

    let req = get_req("/auth/me", ACME)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "a@b.com");

    let req = get_req("/auth/me", ACME)
        .header(COOKIE, format!("accessToken={token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn session_failures_are_generic_401s() {
    let t = test_app();
    let token = access_token(&t, "a@b.com").await;

    let req = get_req("/auth/me", ACME).body(Body::empty()).unwrap();
    let (status, _, missing) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Valid token, other tenant's host.
    let req = get_req("/auth/me", OTHER)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, mismatch) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing, mismatch);

    t.users.set_status("u1", UserStatus::Suspended);
    let req = get_req("/auth/me", ACME)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, inactive) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing, inactive);
}

#[tokio::test]
async fn refresh_from_cookie_rotates_session() {
    let t = test_app();
    let (headers, _) = login(&t, "a@b.com").await;
    let refresh = cookie(&headers, "refreshToken").unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/auth/refresh")
        .header(HOST, ACME)
        .header(COOKIE, refresh)
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(cookie(&headers, "accessToken").is_some());
    assert!(cookie(&headers, "refreshToken").is_some());
}

#[tokio::test]
async fn bad_refresh_token_clears_cookies() {
    let t = test_app();
    let (status, headers, body) = send(
        &t.app,
        post_json("/auth/refresh", ACME, json!({"refreshToken": "garbage"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid refresh token");
    assert!(set_cookie_line(&headers, "accessToken").contains("Max-Age=0"));
    assert!(set_cookie_line(&headers, "refreshToken").contains("Max-Age=0"));
}

#[tokio::test]
async fn logout_requires_session_and_clears_cookies() {
    let t = test_app();
    let req = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header(HOST, ACME)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = access_token(&t, "a@b.com").await;
    let req = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header(HOST, ACME)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(set_cookie_line(&headers, "accessToken").contains("Max-Age=0"));
}

// ---------------------------------------------------------------------------
// Route policies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stages_and_handler_share_the_bound_context() {
    let t = test_app();
    let context_route = Router::new().route(
        "/context",
        get(
            |Extension(ctx): Extension<Arc<TenantContext>>,
             Extension(user): Extension<AuthenticatedUser>| async move {
                Json(json!({
                    "tenantId": ctx.tenant_id(),
                    "schoolId": ctx.school_id(),
                    "userTenant": user.tenant_id,
                }))
            },
        ),
    );
    let app = with_pipeline(
        context_route,
        &t.state,
        Pipeline::protected(RoutePolicy::authenticated()),
    )
    .with_state(t.state.clone());

    let token = access_token(&t, "a@b.com").await;
    let req = get_req("/context", ACME)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenantId"], "T1");
    assert_eq!(body["schoolId"], Value::Null);
    assert_eq!(body["userTenant"], "T1");
}

#[tokio::test]
async fn role_policy_is_enforced_per_route() {
    let t = test_app();
    let admin_only = Router::new().route("/admin/ping", get(|| async { "pong" }));
    let admin_only = with_pipeline(
        admin_only,
        &t.state,
        Pipeline::protected(RoutePolicy::authenticated().with_roles(&[UserRole::Admin])),
    );
    let app = admin_only.with_state(t.state.clone());

    let student = access_token(&t, "a@b.com").await;
    let req = get_req("/admin/ping", ACME)
        .header(AUTHORIZATION, format!("Bearer {student}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let admin = access_token(&t, "admin@b.com").await;
    let req = get_req("/admin/ping", ACME)
        .header(AUTHORIZATION, format!("Bearer {admin}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn permission_policy_reads_current_grants() {
    let t = test_app();
    let guarded = Router::new().route("/grades", get(|| async { "ok" }));
    let guarded = with_pipeline(
        guarded,
        &t.state,
        Pipeline::protected(RoutePolicy::authenticated().with_permissions(&["grades:read"])),
    );
    let app = guarded.with_state(t.state.clone());
    let token = access_token(&t, "a@b.com").await;

    let req = get_req("/grades", ACME)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Access denied. Required permissions: grades:read");

    // Granted after the token was issued.
    t.users.grant_permission("T1", UserRole::Student, "grades:read");
    let req = get_req("/grades", ACME)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// SSO
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sso_unknown_provider_is_not_found() {
    let t = test_app();
    let req = get_req("/auth/sso/nope", ACME).body(Body::empty()).unwrap();
    let (status, _, _) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sso_round_trip_only_signs_in_linked_accounts() {
    let t = test_app();
    let req = get_req("/auth/sso/fake", ACME).body(Body::empty()).unwrap();
    let (status, headers, _) = send(&t.app, req).await;
    assert_eq!(status, StatusCode::FOUND);
    let location = headers.get(LOCATION).unwrap().to_str().unwrap().to_string();
    assert!(location.starts_with("https://sso.example.com/authorize"));
    let state_cookie = cookie(&headers, "ssoState").unwrap();
    let state = state_cookie.strip_prefix("ssoState=").unwrap().to_string();

    let callback = |code: &str, state: &str, cookie: &str| {
        get_req(
            &format!("/auth/sso/fake/callback?code={code}&state={state}"),
            ACME,
        )
        .header(COOKIE, cookie.to_string())
        .body(Body::empty())
        .unwrap()
    };

    // Forged state.
    let (status, _, _) = send(&t.app, callback("ext-1", "forged", &state_cookie)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Not linked yet.
    let (status, _, _) = send(&t.app, callback("ext-1", &state, &state_cookie)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut linked = t.users.get("u1").unwrap();
    linked.sso_provider = Some("fake".into());
    linked.sso_id = Some("ext-1".into());
    t.users.insert(linked);

    let (status, headers, body) = send(&t.app, callback("ext-1", &state, &state_cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], "u1");
    assert!(cookie(&headers, "accessToken").is_some());
}
