use axum::body::to_bytes;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common_http_errors::{ApiError, AuthSubCode, Envelope, ErrorData, EnvelopeStatus};
use serde_json::json;

#[test]
fn variants_render_with_kind_status_and_code() {
    let cases = [
        (ApiError::validation(""), StatusCode::BAD_REQUEST, "validation_error"),
        (ApiError::authentication(""), StatusCode::UNAUTHORIZED, "authentication_error"),
        (ApiError::authorization(""), StatusCode::FORBIDDEN, "authorization_error"),
        (ApiError::not_found(""), StatusCode::NOT_FOUND, "not_found_error"),
        (ApiError::conflict(""), StatusCode::CONFLICT, "conflict_error"),
        (ApiError::custom(""), StatusCode::INTERNAL_SERVER_ERROR, "custom_error"),
    ];
    for (err, status, code) in cases {
        let resp = err.into_response();
        assert_eq!(resp.status(), status);
        assert_eq!(resp.headers().get("X-Error-Code").unwrap(), code);
        assert!(resp.extensions().get::<ApiError>().is_some());
    }
}

#[tokio::test]
async fn validation_reason_is_carried_in_data() {
    let err = ApiError::validation("Invalid request data")
        .with_reason(json!([{"field": "email", "msg": "must be an email"}]));
    let resp = err.into_response();
    let bytes = to_bytes(resp.into_body(), 1024 * 8).await.unwrap();
    let body: Envelope<ErrorData> = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(body.status, EnvelopeStatus::Fail);
    assert_eq!(body.status_code, 400);
    assert_eq!(body.sub_code, Some(0));
    assert_eq!(body.message, "Invalid request data");
    assert_eq!(body.data.reason.unwrap()[0]["field"], "email");
    assert!(body.data.stack_trace.is_none());
}

#[tokio::test]
async fn refresh_payload_sub_code_survives_rendering() {
    let err = ApiError::authentication("Invalid refreshToken: supplied token is invalid")
        .with_sub_code(AuthSubCode::InvalidRefreshPayload);
    let bytes = to_bytes(err.into_response().into_body(), 1024 * 8)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("\"subCode\":3"), "unexpected body: {}", text);
}
