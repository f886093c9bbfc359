use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use common_auth::{set_tokens_to_response, TokenService, UserProvider};
use common_observability::RefreshOutcome;
use tracing::{debug, warn};

use crate::pipeline::{tag_identity, AuthPipeline};
use crate::state::RequestAuthState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOptions {
    /// Renew on every request, not only after the access token expired.
    pub force_refresh_even_if_not_expired: bool,
}

impl RefreshOptions {
    pub fn forced() -> Self {
        Self {
            force_refresh_even_if_not_expired: true,
        }
    }
}

pub fn should_refresh(state: &RequestAuthState, options: RefreshOptions) -> bool {
    !state.refresh_attempted && (options.force_refresh_even_if_not_expired || state.access_expired())
}

/// Exchanges the refresh token when the state calls for it.
///
/// A failed renewal replaces `error_detail`; a successful one replaces the user
/// and clears it. Returns the state unchanged when no renewal is due.
pub async fn refresh<P>(
    mut state: RequestAuthState,
    tokens: &TokenService,
    provider: &P,
    options: RefreshOptions,
) -> RequestAuthState
where
    P: UserProvider + ?Sized,
{
    if !should_refresh(&state, options) {
        return state;
    }
    state.refresh_attempted = true;

    let refresh_token = state.refresh_token.clone().unwrap_or_default();
    match tokens.renew_access_token(&refresh_token, provider).await {
        Ok((token, user)) => {
            debug!(user = user.id_string().unwrap_or_default(), "access token renewed");
            state.renewed(token, user)
        }
        Err(error) => {
            warn!(
                sub_code = error.sub_code(),
                status = error.status().as_u16(),
                reason = error.message(),
                "access token renewal failed"
            );
            state.with_error(error)
        }
    }
}

/// `middleware::from_fn_with_state(pipeline, refresh_request)`, layered inside
/// `authenticate_request`. Writes the renewed token to the response headers and
/// the access cookie.
pub async fn refresh_request(
    State(pipeline): State<AuthPipeline>,
    mut req: Request,
    next: Next,
) -> Response {
    let state = req
        .extensions_mut()
        .remove::<RequestAuthState>()
        .unwrap_or_default();
    let due = should_refresh(&state, pipeline.refresh);
    let state = refresh(state, &pipeline.tokens, pipeline.provider.as_ref(), pipeline.refresh).await;

    if due {
        if let Some(metrics) = &pipeline.metrics {
            metrics.refresh(match state.new_access_token {
                Some(_) => RefreshOutcome::Renewed,
                None => RefreshOutcome::Failed,
            });
        }
    }

    let domain = state
        .new_access_token
        .as_ref()
        .and_then(|_| pipeline.domains.resolve(req.headers()));
    req.extensions_mut().insert(state.clone());

    let mut response = next.run(req).await;
    if let Some(token) = state.new_access_token.as_deref() {
        if let Err(error) = set_tokens_to_response(
            response.headers_mut(),
            Some(token),
            None,
            pipeline.tokens.config(),
            domain,
        ) {
            response = error.into_response();
        }
    }
    tag_identity(&mut response, &state);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_auth::{Claims, JwtConfig};
    use common_http_errors::{ApiError, AuthSubCode, ErrorKind};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn service() -> TokenService {
        TokenService::new(JwtConfig::new("refresh-secret").unwrap()).unwrap()
    }

    fn expired_state(refresh_token: Option<String>) -> RequestAuthState {
        RequestAuthState {
            refresh_token,
            error_detail: Some(ApiError::authentication("expired").with_sub_code(AuthSubCode::Expired)),
            ..RequestAuthState::default()
        }
    }

    fn directory(calls: Arc<AtomicUsize>) -> impl Fn(Value) -> Option<Claims> + Send + Sync {
        move |id: Value| {
            calls.fetch_add(1, Ordering::SeqCst);
            let mut user = Claims::with_id(id);
            user.insert("name", "Grace");
            Some(user)
        }
    }

    #[tokio::test]
    async fn expired_access_is_renewed() {
        let tokens = service();
        let pair = tokens.generate_token_pair(&Claims::with_id("u-2")).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let state = refresh(
            expired_state(Some(pair.refresh)),
            &tokens,
            &directory(calls.clone()),
            RefreshOptions::default(),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(state.error_detail.is_none());
        assert_eq!(state.user.as_ref().unwrap().get("name"), Some(&json!("Grace")));
        let renewed = tokens.verify_token(state.new_access_token.as_deref().unwrap(), false).unwrap();
        assert_eq!(renewed.id(), Some(&json!("u-2")));
    }

    #[tokio::test]
    async fn nothing_happens_without_expiry_or_force() {
        let tokens = service();
        let calls = Arc::new(AtomicUsize::new(0));
        let invalid = RequestAuthState::default().with_error(ApiError::authentication("bad"));

        let state = refresh(invalid, &tokens, &directory(calls.clone()), RefreshOptions::default()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!state.refresh_attempted);
        assert_eq!(state.error_detail.unwrap().message(), "bad");
    }

    #[tokio::test]
    async fn forced_refresh_without_token_records_missing_input() {
        let tokens = service();
        let calls = Arc::new(AtomicUsize::new(0));
        let state = refresh(
            RequestAuthState::default(),
            &tokens,
            &directory(calls.clone()),
            RefreshOptions::forced(),
        )
        .await;

        let error = state.error_detail.unwrap();
        assert_eq!(error.kind(), ErrorKind::Authentication);
        assert_eq!(error.sub_code(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_renewal_overwrites_earlier_error() {
        let tokens = service();
        let calls = Arc::new(AtomicUsize::new(0));
        let state = refresh(
            expired_state(Some("forged.refresh.token".into())),
            &tokens,
            &directory(calls.clone()),
            RefreshOptions::default(),
        )
        .await;

        let error = state.error_detail.unwrap();
        assert_eq!(error.sub_code(), 0);
        assert_eq!(error.message(), common_auth::tokens::TOKEN_INVALID);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn a_request_is_refreshed_at_most_once() {
        let tokens = service();
        let pair = tokens.generate_token_pair(&Claims::with_id("u-3")).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = directory(calls.clone());

        let once = refresh(
            RequestAuthState {
                refresh_token: Some(pair.refresh),
                ..RequestAuthState::default()
            },
            &tokens,
            &provider,
            RefreshOptions::forced(),
        )
        .await;
        let twice = refresh(once, &tokens, &provider, RefreshOptions::forced()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(twice.new_access_token.is_some());
    }
}
