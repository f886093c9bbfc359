use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use common_auth::set_tokens_to_response;
use common_http_errors::{metrics as error_metrics, ApiError, ApiResult, Envelope};
use common_security::{AuthState, CurrentUser};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    #[serde(default)]
    pub id: Value,
}

pub async fn health() -> &'static str {
    "ok"
}

/// Issues a token pair for a directory user. Credentials are checked upstream.
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SessionRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = body.map_err(|rejection| ApiError::validation(rejection.body_text()))?;
    if request.id.is_null() {
        return Err(ApiError::validation("id is required")
            .with_reason(json!({ "id": "must be provided" })));
    }

    let user = state
        .directory
        .find(&request.id)
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let pair = state.tokens.generate_token_pair(&user)?;

    let mut response = Envelope::created(json!({
        "accessToken": pair.access,
        "refreshToken": pair.refresh,
        "user": user.clone().into_value(),
    }))
    .into_response();
    let domain = state.pipeline.domains.resolve(&headers);
    set_tokens_to_response(
        response.headers_mut(),
        Some(&pair.access),
        Some(&pair.refresh),
        state.tokens.config(),
        domain,
    )?;
    info!(user = user.id_string().unwrap_or_default(), "session issued");
    Ok(response)
}

pub async fn me(CurrentUser(user): CurrentUser, AuthState(auth): AuthState) -> Envelope<Value> {
    Envelope::ok(json!({
        "user": user.into_value(),
        "newAccessToken": auth.new_access_token,
    }))
}

pub async fn reports() -> Envelope<Value> {
    Envelope::ok(json!([
        { "id": "q1", "title": "First quarter" },
        { "id": "q2", "title": "Second quarter" },
    ]))
}

pub async fn admin(CurrentUser(user): CurrentUser) -> Envelope<Value> {
    Envelope::ok(json!({ "operator": user.id() }))
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> ApiResult<Response> {
    let mut text = error_metrics::render();
    text.push_str(&state.metrics.render()?);
    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )
        .body(Body::from(text))
        .map_err(|err| ApiError::custom(err.to_string()))
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("Route {} not found", uri.path()))
}
