use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use common_auth::{RequestTokens, TokenService};
use common_http_errors::AuthSubCode;
use common_observability::VerificationOutcome;
use tracing::debug;

use crate::pipeline::{tag_identity, AuthPipeline};
use crate::state::RequestAuthState;

/// Decodes the access token. Failures are recorded on the state, never raised.
pub fn authenticate(tokens: &TokenService, found: RequestTokens) -> RequestAuthState {
    let state = RequestAuthState::new(found);
    let token = state.access_token.clone().unwrap_or_default();
    match tokens.verify_token(&token, false) {
        Ok(user) => state.with_user(user),
        Err(error) => {
            debug!(sub_code = error.sub_code(), reason = error.message(), "access token rejected");
            state.with_error(error)
        }
    }
}

pub fn verification_outcome(state: &RequestAuthState) -> VerificationOutcome {
    if state.access_token.is_none() {
        return VerificationOutcome::Missing;
    }
    match &state.error_detail {
        None => VerificationOutcome::Ok,
        Some(error) if error.is_authentication(AuthSubCode::Expired) => VerificationOutcome::Expired,
        Some(_) => VerificationOutcome::Invalid,
    }
}

/// `middleware::from_fn_with_state(pipeline, authenticate_request)`
pub async fn authenticate_request(
    State(pipeline): State<AuthPipeline>,
    mut req: Request,
    next: Next,
) -> Response {
    let found = RequestTokens::from_parts(req.headers(), req.uri(), &pipeline.tokens.config().keys);
    let state = authenticate(&pipeline.tokens, found);
    if let Some(metrics) = &pipeline.metrics {
        metrics.verification(verification_outcome(&state));
    }

    req.extensions_mut().insert(state.clone());
    let mut response = next.run(req).await;
    tag_identity(&mut response, &state);
    response
}
