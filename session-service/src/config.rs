use std::env;
use std::net::IpAddr;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use common_auth::{parse_bool, JwtConfig};
use regex::Regex;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: IpAddr,
    pub port: u16,
    pub jwt: JwtConfig,
    pub force_refresh: bool,
    pub include_stack_trace: bool,
    pub log_json: bool,
    pub cors_allowed_origins: Vec<HeaderValue>,
    pub cors_allowed_origin_patterns: Vec<Regex>,
}

impl ServiceConfig {
    /// Exact allow-list match or any pattern match.
    pub fn origin_allowed(&self, origin: &HeaderValue) -> bool {
        if self.cors_allowed_origins.contains(origin) {
            return true;
        }
        let Ok(origin) = origin.to_str() else {
            return false;
        };
        self.cors_allowed_origin_patterns
            .iter()
            .any(|pattern| pattern.is_match(origin))
    }
}

pub fn load_config() -> Result<ServiceConfig> {
    load_config_from(|key| env::var(key).ok())
}

pub fn load_config_from<F>(lookup: F) -> Result<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let jwt = JwtConfig::from_vars(&lookup).context("Failed to load token configuration")?;
    let flag = |key: &str| lookup(key).map(|value| parse_bool(&value)).unwrap_or(false);

    let host = lookup("HOST")
        .unwrap_or_else(|| "0.0.0.0".to_string())
        .parse::<IpAddr>()
        .context("Failed to parse HOST")?;
    let port = match lookup("PORT") {
        Some(value) => value.trim().parse::<u16>().context("Failed to parse PORT")?,
        None => 8085,
    };

    let origins = lookup("CORS_ALLOWED_ORIGINS").unwrap_or_else(|| "http://localhost:3000".to_string());
    let cors_allowed_origins = parse_origins(&origins)?;
    let cors_allowed_origin_patterns = match lookup("CORS_ALLOWED_ORIGIN_PATTERNS") {
        Some(value) => parse_origin_patterns(&value)?,
        None => Vec::new(),
    };

    Ok(ServiceConfig {
        host,
        port,
        jwt,
        force_refresh: flag("AUTH_FORCE_REFRESH"),
        include_stack_trace: flag("ERRORS_INCLUDE_STACK_TRACE"),
        log_json: flag("LOG_JSON"),
        cors_allowed_origins,
        cors_allowed_origin_patterns,
    })
}

fn parse_origins(value: &str) -> Result<Vec<HeaderValue>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            HeaderValue::from_str(origin)
                .with_context(|| format!("Invalid CORS origin '{origin}'"))
        })
        .collect()
}

fn parse_origin_patterns(value: &str) -> Result<Vec<Regex>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
        .map(|pattern| {
            Regex::new(pattern).with_context(|| format!("Invalid CORS origin pattern '{pattern}'"))
        })
        .collect()
}
