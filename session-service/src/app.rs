use std::sync::Arc;

use anyhow::Result;
use axum::extract::FromRef;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use common_auth::TokenService;
use common_http_errors::{panic_response, respond_errors, ErrorResponder};
use common_observability::AuthPipelineMetrics;
use common_security::{
    authenticate_request, refresh_request, require_authentication, require_privilege,
    AuthPipeline, PrivilegeGuard, PrivilegeRequirements, RefreshOptions, RequireAuthentication,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::ServiceConfig;
use crate::directory::UserDirectory;
use crate::handlers::{admin, create_session, health, me, metrics_endpoint, not_found, reports};

pub const SERVICE_NAME: &str = "session-service";

#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub directory: Arc<UserDirectory>,
    pub pipeline: AuthPipeline,
    pub metrics: AuthPipelineMetrics,
}

impl AppState {
    pub fn new(config: &ServiceConfig, directory: UserDirectory) -> Result<Self> {
        let tokens = Arc::new(TokenService::new(config.jwt.clone())?);
        let directory = Arc::new(directory);
        let metrics = AuthPipelineMetrics::new()?;
        let pipeline = AuthPipeline::new(tokens.clone(), directory.clone())
            .with_refresh_options(RefreshOptions {
                force_refresh_even_if_not_expired: config.force_refresh,
            })
            .with_metrics(metrics.clone());
        Ok(Self {
            tokens,
            directory,
            pipeline,
            metrics,
        })
    }
}

impl FromRef<AppState> for AuthPipeline {
    fn from_ref(state: &AppState) -> Self {
        state.pipeline.clone()
    }
}

impl FromRef<AppState> for Arc<TokenService> {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

pub fn build_router(state: AppState, config: &ServiceConfig) -> Router {
    let refresh_header = HeaderName::from_static("x-refresh-token");
    let origins = config.clone();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _: &Parts| origins.origin_allowed(origin),
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION, refresh_header.clone()])
        .expose_headers([AUTHORIZATION, refresh_header, CONTENT_LENGTH])
        .allow_credentials(true);

    let responder = ErrorResponder::new(SERVICE_NAME).with_stack_trace(config.include_stack_trace);
    let authenticated = || from_fn_with_state(RequireAuthentication::new(), require_authentication);
    let reports_guard = PrivilegeGuard::new(PrivilegeRequirements::new().has("reports:read"));
    let admin_guard = PrivilegeGuard::new(PrivilegeRequirements::new().has_all(["admin", "audit"]));

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/sessions", post(create_session))
        .route("/me", get(me).route_layer(authenticated()))
        .route(
            "/reports",
            get(reports).route_layer(from_fn_with_state(reports_guard, require_privilege)),
        )
        .route(
            "/admin",
            get(admin)
                .route_layer(from_fn_with_state(admin_guard, require_privilege))
                .route_layer(authenticated()),
        )
        .fallback(not_found)
        .with_state(state.clone())
        // Handler panics are caught inside the auth layers so the 500 carries the caller's identity.
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn_with_state(state.pipeline.clone(), refresh_request))
        .layer(from_fn_with_state(state.pipeline, authenticate_request))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn_with_state(responder, respond_errors))
        .layer(cors)
}
