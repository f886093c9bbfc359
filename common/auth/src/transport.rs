use std::collections::HashMap;

use axum::extract::Query;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::{HeaderMap, HeaderValue, Uri};

use crate::config::TokenKeys;

pub const REFRESH_TOKEN_HEADER: &str = "X-REFRESH-TOKEN";

/// Token material found on a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestTokens {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

impl RequestTokens {
    /// Looks up both tokens with the precedence query key, then header, then cookie.
    pub fn from_parts(headers: &HeaderMap, uri: &Uri, keys: &TokenKeys) -> Self {
        let query = query_params(uri);
        let access = query
            .get(&keys.access)
            .and_then(|value| non_empty(value))
            .or_else(|| header_token(headers, AUTHORIZATION.as_str()))
            .or_else(|| cookie_value(headers, &keys.access));
        let refresh = query
            .get(&keys.refresh)
            .and_then(|value| non_empty(value))
            .or_else(|| header_token(headers, REFRESH_TOKEN_HEADER))
            .or_else(|| cookie_value(headers, &keys.refresh));
        Self { access, refresh }
    }
}

fn query_params(uri: &Uri) -> HashMap<String, String> {
    Query::<HashMap<String, String>>::try_from_uri(uri)
        .map(|Query(params)| params)
        .unwrap_or_default()
}

/// `Bearer <token>` from the named header.
pub fn header_token(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| parse_bearer(value))
}

fn parse_bearer(value: &HeaderValue) -> Option<String> {
    let raw = value.to_str().ok()?.trim();
    let (scheme, token) = raw.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    non_empty(token)
}

/// Value of the named cookie across every `Cookie` header.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .and_then(|(_, value)| non_empty(value.trim().trim_matches('"')))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}
