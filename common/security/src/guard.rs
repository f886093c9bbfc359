use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use common_http_errors::{ApiError, ApiResult};
use tracing::debug;

use crate::state::RequestAuthState;

/// Passes when the state carries a user with an `id`.
///
/// Otherwise an explicit `message` wins, then the stored `error_detail`, then a
/// generic authentication error.
pub fn check_authenticated(state: Option<&RequestAuthState>, message: Option<&str>) -> ApiResult<()> {
    if state.is_some_and(RequestAuthState::is_authenticated) {
        return Ok(());
    }
    if let Some(message) = message.filter(|message| !message.is_empty()) {
        return Err(ApiError::authentication(message));
    }
    Err(state
        .and_then(|state| state.error_detail.clone())
        .unwrap_or_else(|| ApiError::authentication("")))
}

#[derive(Debug, Clone, Default)]
pub struct RequireAuthentication {
    message: Option<String>,
}

impl RequireAuthentication {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}

/// `route_layer(middleware::from_fn_with_state(RequireAuthentication::new(), require_authentication))`
pub async fn require_authentication(
    State(guard): State<RequireAuthentication>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let state = req.extensions().get::<RequestAuthState>();
    if let Err(error) = check_authenticated(state, guard.message.as_deref()) {
        debug!(path = %req.uri().path(), sub_code = error.sub_code(), "authentication required");
        return Err(error);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_auth::Claims;
    use common_http_errors::{AuthSubCode, ErrorKind};

    #[test]
    fn authenticated_state_passes() {
        let state = RequestAuthState::default().with_user(Claims::with_id("u-1"));
        assert!(check_authenticated(Some(&state), Some("ignored")).is_ok());
    }

    #[test]
    fn explicit_message_beats_stored_error() {
        let state = RequestAuthState::default()
            .with_error(ApiError::authentication("expired").with_sub_code(AuthSubCode::Expired));
        let error = check_authenticated(Some(&state), Some("Sign in first")).unwrap_err();
        assert_eq!(error.message(), "Sign in first");
        assert_eq!(error.sub_code(), 0);
    }

    #[test]
    fn stored_error_is_reraised_unchanged() {
        let stored = ApiError::authentication("Invalid refreshToken").with_sub_code(AuthSubCode::InvalidRefreshPayload);
        let state = RequestAuthState::default().with_error(stored);
        let error = check_authenticated(Some(&state), None).unwrap_err();
        assert_eq!(error.sub_code(), 3);
        assert_eq!(error.message(), "Invalid refreshToken");
    }

    #[test]
    fn generic_error_without_state() {
        let error = check_authenticated(None, None).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Authentication);
        assert_eq!(error.message(), ErrorKind::Authentication.default_message());

        let idless = RequestAuthState::default().with_user(Claims::new());
        assert!(check_authenticated(Some(&idless), Some("")).is_err());
    }
}
