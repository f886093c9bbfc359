use std::net::IpAddr;

use axum::http::header::{AUTHORIZATION, ORIGIN, REFERER, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Uri};
use chrono::{DateTime, Duration, Utc};
use common_http_errors::{ApiError, ApiResult};
use tracing::debug;

use crate::config::{CookieSameSite, JwtConfig};
use crate::transport::REFRESH_TOKEN_HEADER;

/// Derives the domain token cookies are scoped to.
pub trait CookieDomainResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Option<String>;
}

/// Origin, then Referer, then the configured application URL, reduced to its base domain.
#[derive(Debug, Clone, Default)]
pub struct OriginDomainResolver {
    app_url: Option<String>,
}

impl OriginDomainResolver {
    pub fn new(app_url: Option<String>) -> Self {
        Self { app_url }
    }

    pub fn from_config(config: &JwtConfig) -> Self {
        Self::new(config.cookies.app_url.clone())
    }
}

impl CookieDomainResolver for OriginDomainResolver {
    fn resolve(&self, headers: &HeaderMap) -> Option<String> {
        let header = |name| {
            headers
                .get(name)
                .and_then(|value: &HeaderValue| value.to_str().ok())
                .filter(|value| !value.trim().is_empty() && *value != "null")
        };
        header(ORIGIN)
            .or_else(|| header(REFERER))
            .or(self.app_url.as_deref())
            .and_then(base_domain)
    }
}

/// `https://api.shop.example.com/x` becomes `example.com`. IP literals and
/// single-label hosts are returned unchanged.
pub fn base_domain(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let host = match trimmed.parse::<Uri>() {
        Ok(uri) => uri.host().map(str::to_owned),
        Err(_) => None,
    }
    .or_else(|| {
        let authority = trimmed.split('/').next()?;
        let host = authority.split(':').next()?;
        (!host.is_empty()).then(|| host.to_owned())
    })?;
    let host = host.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase();

    if host.parse::<IpAddr>().is_ok() {
        return Some(host);
    }
    let labels: Vec<&str> = host.split('.').filter(|label| !label.is_empty()).collect();
    if labels.len() > 2 {
        return Some(labels[labels.len() - 2..].join("."));
    }
    Some(host)
}

#[derive(Debug, Clone)]
pub struct CookieOptions {
    pub domain: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub same_site: CookieSameSite,
    pub secure: bool,
}

impl CookieOptions {
    pub fn from_config(config: &JwtConfig, domain: Option<String>) -> ApiResult<Self> {
        let expires_at = Duration::try_days(config.cookies.life_days)
            .and_then(|life| Utc::now().checked_add_signed(life))
            .ok_or_else(|| ApiError::custom("Failed to set cookie: lifetime out of range"))?;
        Ok(Self {
            domain,
            expires_at,
            same_site: config.cookies.same_site,
            secure: config.cookies.secure,
        })
    }
}

/// Appends `Set-Cookie` headers to a response header map.
pub struct CookieWriter<'a> {
    headers: &'a mut HeaderMap,
}

impl<'a> CookieWriter<'a> {
    pub fn new(headers: &'a mut HeaderMap) -> Self {
        Self { headers }
    }

    pub fn set(&mut self, name: &str, value: &str, options: &CookieOptions) {
        let cookie = set_cookie_value(name, value, options);
        match HeaderValue::from_str(&cookie) {
            Ok(header) => {
                self.headers.append(SET_COOKIE, header);
            }
            Err(err) => debug!(error = %err, cookie = name, "skipping unencodable cookie"),
        }
    }
}

pub fn set_cookie_value(name: &str, value: &str, options: &CookieOptions) -> String {
    let mut cookie = format!("{name}={value}; Path=/");
    if let Some(domain) = &options.domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    cookie.push_str("; Expires=");
    cookie.push_str(&options.expires_at.format("%a, %d %b %Y %H:%M:%S GMT").to_string());
    cookie.push_str("; SameSite=");
    cookie.push_str(options.same_site.as_str());
    if options.secure || options.same_site == CookieSameSite::None {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Writes whichever tokens are given as cookies and as bearer headers.
pub fn set_tokens_to_response(
    headers: &mut HeaderMap,
    access: Option<&str>,
    refresh: Option<&str>,
    config: &JwtConfig,
    domain: Option<String>,
) -> ApiResult<()> {
    let options = CookieOptions::from_config(config, domain)?;
    if let Some(token) = access {
        CookieWriter::new(headers).set(&config.keys.access, token, &options);
        insert_bearer(headers, AUTHORIZATION.as_str(), token);
    }
    if let Some(token) = refresh {
        CookieWriter::new(headers).set(&config.keys.refresh, token, &options);
        insert_bearer(headers, REFRESH_TOKEN_HEADER, token);
    }
    Ok(())
}

fn insert_bearer(headers: &mut HeaderMap, name: &'static str, token: &str) {
    match HeaderValue::from_str(&format!("Bearer {token}")) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(err) => debug!(error = %err, header = name, "skipping unencodable token header"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn base_domain_keeps_last_two_labels() {
        assert_eq!(base_domain("https://api.shop.example.com/login").as_deref(), Some("example.com"));
        assert_eq!(base_domain("https://example.com").as_deref(), Some("example.com"));
        assert_eq!(base_domain("http://localhost:3000").as_deref(), Some("localhost"));
        assert_eq!(base_domain("http://127.0.0.1:8080/x").as_deref(), Some("127.0.0.1"));
        assert_eq!(base_domain("app.Example.org").as_deref(), Some("example.org"));
        assert!(base_domain("").is_none());
    }

    #[test]
    fn resolver_prefers_origin_then_referer_then_app_url() {
        let resolver = OriginDomainResolver::new(Some("https://www.fallback.io".to_string()));
        let mut headers = HeaderMap::new();
        assert_eq!(resolver.resolve(&headers).as_deref(), Some("fallback.io"));

        headers.insert(REFERER, HeaderValue::from_static("https://docs.referer.dev/page"));
        assert_eq!(resolver.resolve(&headers).as_deref(), Some("referer.dev"));

        headers.insert(ORIGIN, HeaderValue::from_static("https://app.origin.com"));
        assert_eq!(resolver.resolve(&headers).as_deref(), Some("origin.com"));

        assert!(OriginDomainResolver::default().resolve(&HeaderMap::new()).is_none());
    }

    #[test]
    fn set_cookie_value_formats_attributes() {
        let options = CookieOptions {
            domain: Some("example.com".to_string()),
            expires_at: Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap(),
            same_site: CookieSameSite::Lax,
            secure: false,
        };
        assert_eq!(
            set_cookie_value("accessToken", "abc", &options),
            "accessToken=abc; Path=/; Domain=example.com; Expires=Wed, 02 Jan 2030 03:04:05 GMT; SameSite=Lax"
        );
    }

    #[test]
    fn tokens_are_written_as_cookies_and_headers() {
        let config = JwtConfig::new("secret").unwrap();
        let mut headers = HeaderMap::new();
        set_tokens_to_response(&mut headers, Some("a.b.c"), Some("r.s.t"), &config, None).unwrap();

        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer a.b.c");
        assert_eq!(headers.get(REFRESH_TOKEN_HEADER).unwrap(), "Bearer r.s.t");
        let cookies: Vec<&str> = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("accessToken=a.b.c; Path=/"));
        assert!(cookies[1].starts_with("refreshToken=r.s.t; Path=/"));
    }

    #[test]
    fn unrepresentable_cookie_lifetime_writes_nothing() {
        let mut config = JwtConfig::new("secret").unwrap();
        config.cookies.life_days = 999_999_999;
        let mut headers = HeaderMap::new();
        let err = set_tokens_to_response(&mut headers, Some("a.b.c"), None, &config, None).unwrap_err();
        assert_eq!(err.status().as_u16(), 500);
        assert!(headers.is_empty());
    }
}
