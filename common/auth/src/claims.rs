use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use common_http_errors::ApiError;

pub const ISSUED_AT: &str = "iat";
pub const EXPIRES_AT: &str = "exp";
pub const ID: &str = "id";

/// Arbitrary claim fields of a user, plus the reserved `iat`/`exp` once signed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims identifying only `id`, as carried by refresh tokens.
    pub fn with_id(id: impl Into<Value>) -> Self {
        let mut claims = Self::new();
        claims.insert(ID, id);
        claims
    }

    /// Captures any serializable user as claims. The value must serialize to an object.
    pub fn from_serializable<T: Serialize>(user: &T) -> Result<Self, ApiError> {
        match serde_json::to_value(user) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(_) => Err(ApiError::validation("user claims must be a JSON object")),
            Err(err) => Err(ApiError::custom(err.to_string())),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The identity claim, ignoring `null`.
    pub fn id(&self) -> Option<&Value> {
        self.0.get(ID).filter(|value| !value.is_null())
    }

    /// The identity rendered as plain text (strings unquoted).
    pub fn id_string(&self) -> Option<String> {
        self.id().map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp(ISSUED_AT)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp(EXPIRES_AT)
    }

    pub fn strip_timestamps(&mut self) {
        self.0.remove(ISSUED_AT);
        self.0.remove(EXPIRES_AT);
    }

    pub fn without_timestamps(mut self) -> Self {
        self.strip_timestamps();
        self
    }

    /// Entries of a string-list claim. Non-string entries are skipped.
    pub fn string_list(&self, key: &str) -> Vec<&str> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.0
            .get(key)
            .and_then(Value::as_i64)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

impl TryFrom<Value> for Claims {
    type Error = ApiError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(ApiError::validation("user claims must be a JSON object")),
        }
    }
}

/// Access and refresh tokens issued together for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}
