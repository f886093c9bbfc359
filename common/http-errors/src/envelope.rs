use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "FAIL")]
    Fail,
}

/// JSON body shared by every success and failure response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub status: EnvelopeStatus,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_code: Option<u16>,
    pub data: T,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    pub reason: Option<Value>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

impl<T> Envelope<T> {
    pub fn success(status: StatusCode, data: T, message: impl Into<String>) -> Self {
        Self {
            status: EnvelopeStatus::Ok,
            status_code: status.as_u16(),
            sub_code: None,
            data,
            message: message.into(),
        }
    }

    pub fn ok(data: T) -> Self {
        Self::success(StatusCode::OK, data, "Ok")
    }

    pub fn created(data: T) -> Self {
        Self::success(StatusCode::CREATED, data, "New resource has been created")
    }

    pub fn fail(status: StatusCode, sub_code: u16, data: T, message: impl Into<String>) -> Self {
        Self {
            status: EnvelopeStatus::Fail,
            status_code: status.as_u16(),
            sub_code: Some(sub_code),
            data,
            message: message.into(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}
