//! # edugate_api
//!
//! HTTP API library for Edugate.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use edugate_core::auth::AuthError;
use edugate_core::auth::delivery::LogDelivery;
use edugate_core::auth::jwt::TokenIssuer;
use edugate_core::auth::pg::PgUserStore;
use edugate_core::auth::service::AuthService;
use edugate_core::auth::sso::SsoRegistry;
use edugate_core::tenant::pg::{PgSchemaProvisioner, PgTenantDirectory};
use edugate_core::tenant::{TenantDirectory, TenantProvisioner};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{auth, health, sso};
use crate::middleware::pipeline::{Pipeline, PipelineState, run_pipeline};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub directory: Arc<dyn TenantDirectory>,
    pub provisioner: Arc<dyn TenantProvisioner>,
    pub sso: Arc<SsoRegistry>,
    pub config: ApiConfig,
}

impl AppState {
    /// Wire the PostgreSQL-backed stores and the log-only token delivery.
    pub fn postgres(pool: PgPool, config: ApiConfig, sso: SsoRegistry) -> Result<Self, AuthError> {
        let issuer = TokenIssuer::new(
            &config.access_secret,
            &config.access_duration,
            &config.refresh_secret,
            &config.refresh_duration,
        )?;
        let directory: Arc<dyn TenantDirectory> = Arc::new(PgTenantDirectory::new(pool.clone()));
        let provisioner: Arc<dyn TenantProvisioner> =
            Arc::new(PgSchemaProvisioner::new(pool.clone()));
        let auth = AuthService::new(
            Arc::new(PgUserStore::new(pool)),
            directory.clone(),
            issuer,
            Arc::new(LogDelivery),
        )
        .with_bcrypt_cost(config.bcrypt_cost);

        Ok(Self {
            auth: Arc::new(auth),
            directory,
            provisioner,
            sso: Arc::new(sso),
            config,
        })
    }
}

/// Run embedded database migrations.
///
/// Delegates to `edugate_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    edugate_core::migrate::migrate(pool).await
}

/// Attach `pipeline` to every route of `router`.
pub fn with_pipeline(
    router: Router<AppState>,
    state: &AppState,
    pipeline: Pipeline,
) -> Router<AppState> {
    let guard = PipelineState {
        app: state.clone(),
        pipeline: Arc::new(pipeline),
    };
    router.route_layer(axum::middleware::from_fn_with_state(guard, run_pipeline))
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Tenant-bound, no session required.
    let public = Router::new()
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(
            routes::POST_AUTH_FORGOT_PASSWORD,
            post(auth::forgot_password_handler),
        )
        .route(
            routes::POST_AUTH_RESET_PASSWORD,
            post(auth::reset_password_handler),
        )
        .route(
            routes::POST_AUTH_MAGIC_LINK_REQUEST,
            post(auth::magic_link_request_handler),
        )
        .route(
            routes::POST_AUTH_MAGIC_LINK_VERIFY,
            post(auth::magic_link_verify_handler),
        )
        .route(routes::GET_AUTH_SSO, get(sso::sso_start_handler))
        .route(routes::GET_AUTH_SSO_CALLBACK, get(sso::sso_callback_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler));
    let public = with_pipeline(public, &state, Pipeline::public());

    let session = Router::new()
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(routes::GET_AUTH_ME, get(auth::me_handler));
    let session = with_pipeline(session, &state, Pipeline::protected(routes::session_policy()));

    Router::new()
        .route(routes::GET_HEALTH, get(health::health))
        .merge(public)
        .merge(session)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
