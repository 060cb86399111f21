//! Per-route request pipeline: tenant binding, principal resolution and
//! authorization, run in a fixed order by one middleware.
//!
//! Each stage leaves its result in the request extensions for the stages and
//! handlers after it: `Arc<TenantContext>` from `BindTenant`,
//! [`AuthenticatedUser`] from `ResolvePrincipal`.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, HOST};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use edugate_core::access::{RoutePolicy, authorize};
use edugate_core::auth::{AuthError, SessionRejection};
use edugate_core::models::tenant::TenantContext;
use edugate_core::models::user::AuthenticatedUser;
use edugate_core::tenant::context::bind_tenant_context;
use thiserror::Error;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies::ACCESS_COOKIE;

/// Header naming the school a request is scoped to.
pub const SCHOOL_HEADER: &str = "x-school-id";

/// One step of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    BindTenant,
    ResolvePrincipal,
    Authorize(RoutePolicy),
}

impl Stage {
    fn rank(&self) -> u8 {
        match self {
            Stage::BindTenant => 0,
            Stage::ResolvePrincipal => 1,
            Stage::Authorize(_) => 2,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("pipeline must start with BindTenant")]
    MissingTenantBinding,

    #[error("stage {0:?} is out of order")]
    OutOfOrder(Stage),

    #[error("Authorize requires ResolvePrincipal before it")]
    AuthorizeWithoutPrincipal,
}

/// Ordered stage list. Stages always run as
/// `BindTenant → ResolvePrincipal → Authorize`, each at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Result<Self, PipelineError> {
        if stages.first() != Some(&Stage::BindTenant) {
            return Err(PipelineError::MissingTenantBinding);
        }
        for pair in stages.windows(2) {
            if pair[1].rank() <= pair[0].rank() {
                return Err(PipelineError::OutOfOrder(pair[1].clone()));
            }
        }
        let has_principal = stages.contains(&Stage::ResolvePrincipal);
        if !has_principal && stages.iter().any(|s| matches!(s, Stage::Authorize(_))) {
            return Err(PipelineError::AuthorizeWithoutPrincipal);
        }
        Ok(Self { stages })
    }

    /// Tenant binding only: login, registration and other anonymous routes.
    pub fn public() -> Self {
        Self {
            stages: vec![Stage::BindTenant],
        }
    }

    /// Full chain for routes that need an authorized principal.
    pub fn protected(policy: RoutePolicy) -> Self {
        Self {
            stages: vec![
                Stage::BindTenant,
                Stage::ResolvePrincipal,
                Stage::Authorize(policy),
            ],
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

/// Middleware state: the shared app state plus the route's pipeline.
#[derive(Clone)]
pub struct PipelineState {
    pub app: AppState,
    pub pipeline: Arc<Pipeline>,
}

/// Run every stage of the route's pipeline, then the handler.
pub async fn run_pipeline(
    State(state): State<PipelineState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    for stage in state.pipeline.stages() {
        match stage {
            Stage::BindTenant => {
                let (host, school) = tenant_hints(&request);
                let ctx = bind_tenant(&state.app, host, school).await?;
                request.extensions_mut().insert(Arc::new(ctx));
            }
            Stage::ResolvePrincipal => {
                let ctx = bound_context(&request)?;
                let token = access_token(request.headers())
                    .ok_or(AuthError::Session(SessionRejection::MissingToken))?;
                let principal = state.app.auth.resolve_principal(&token, &ctx).await?;
                request.extensions_mut().insert(principal);
            }
            Stage::Authorize(policy) => {
                let ctx = bound_context(&request)?;
                let principal = request
                    .extensions()
                    .get::<AuthenticatedUser>()
                    .cloned()
                    .ok_or_else(|| AppError::Internal("principal not resolved".into()))?;
                authorize(state.app.auth.users().as_ref(), &ctx, &principal, policy).await?;
            }
        }
    }
    Ok(next.run(request).await)
}

/// Host and school header as owned strings. The request body is not `Sync`,
/// so no borrow of the request may be held across an await.
fn tenant_hints(request: &Request) -> (Option<String>, Option<String>) {
    let headers = request.headers();
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().host())
        .map(str::to_string);
    let school = headers
        .get(SCHOOL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    (host, school)
}

async fn bind_tenant(
    state: &AppState,
    host: Option<String>,
    school: Option<String>,
) -> Result<TenantContext, AppError> {
    let ctx = bind_tenant_context(
        state.directory.as_ref(),
        state.provisioner.as_ref(),
        host.as_deref(),
        school.as_deref(),
    )
    .await?;
    debug!(tenant_id = ctx.tenant_id(), school_id = ?ctx.school_id(), "tenant bound");
    Ok(ctx)
}

fn bound_context(request: &Request) -> Result<Arc<TenantContext>, AppError> {
    request
        .extensions()
        .get::<Arc<TenantContext>>()
        .cloned()
        .ok_or_else(|| AppError::Internal("tenant not bound".into()))
}

/// `Authorization: Bearer` wins over the access cookie.
fn access_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(token.to_string());
    }
    CookieJar::from_headers(headers)
        .get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}
