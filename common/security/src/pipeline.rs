use std::convert::Infallible;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::Response;
use common_auth::{Claims, CookieDomainResolver, OriginDomainResolver, TokenService, UserProvider};
use common_http_errors::{ApiError, ResponseIdentity};
use common_observability::AuthPipelineMetrics;

use crate::refresh::RefreshOptions;
use crate::state::RequestAuthState;

/// Shared state for the authentication and refresh middleware.
#[derive(Clone)]
pub struct AuthPipeline {
    pub tokens: Arc<TokenService>,
    pub provider: Arc<dyn UserProvider>,
    pub domains: Arc<dyn CookieDomainResolver>,
    pub refresh: RefreshOptions,
    pub metrics: Option<AuthPipelineMetrics>,
}

impl AuthPipeline {
    pub fn new(tokens: Arc<TokenService>, provider: Arc<dyn UserProvider>) -> Self {
        let domains = Arc::new(OriginDomainResolver::from_config(tokens.config()));
        Self {
            tokens,
            provider,
            domains,
            refresh: RefreshOptions::default(),
            metrics: None,
        }
    }

    pub fn with_refresh_options(mut self, options: RefreshOptions) -> Self {
        self.refresh = options;
        self
    }

    pub fn with_domain_resolver(mut self, domains: Arc<dyn CookieDomainResolver>) -> Self {
        self.domains = domains;
        self
    }

    pub fn with_metrics(mut self, metrics: AuthPipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

impl std::fmt::Debug for AuthPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthPipeline")
            .field("refresh", &self.refresh)
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

/// Tags the response with the request's user so the error responder can log it.
pub(crate) fn tag_identity(response: &mut Response, state: &RequestAuthState) {
    if response.extensions().get::<ResponseIdentity>().is_some() {
        return;
    }
    if let Some(id) = state.user_id() {
        response.extensions_mut().insert(ResponseIdentity(id));
    }
}

/// The request's authentication state; empty when the pipeline did not run.
#[derive(Debug, Clone)]
pub struct AuthState(pub RequestAuthState);

#[async_trait]
impl<S> FromRequestParts<S> for AuthState
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(AuthState(
            parts
                .extensions
                .get::<RequestAuthState>()
                .cloned()
                .unwrap_or_default(),
        ))
    }
}

/// The decoded user. Rejects like `require_authentication` without a message.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let state = parts.extensions.get::<RequestAuthState>();
        crate::guard::check_authenticated(state, None)?;
        state
            .and_then(|state| state.user.clone())
            .map(CurrentUser)
            .ok_or_else(|| ApiError::authentication(""))
    }
}
