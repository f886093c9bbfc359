use std::env;
use std::fmt;

use chrono::Duration;

use crate::error::{AuthError, AuthResult};

pub const DEFAULT_ACCESS_TOKEN_KEY: &str = "accessToken";
pub const DEFAULT_REFRESH_TOKEN_KEY: &str = "refreshToken";
/// Upper bound for token lifespans and the cookie lifetime.
pub const MAX_LIFETIME_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieSameSite {
    Lax,
    Strict,
    None,
}

impl CookieSameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            CookieSameSite::Lax => "Lax",
            CookieSameSite::Strict => "Strict",
            CookieSameSite::None => "None",
        }
    }

    pub fn parse(value: &str) -> AuthResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lax" => Ok(CookieSameSite::Lax),
            "strict" => Ok(CookieSameSite::Strict),
            "none" => Ok(CookieSameSite::None),
            other => Err(AuthError::InvalidSameSite(other.to_string())),
        }
    }
}

/// Names under which tokens are looked up in the query string and cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenKeys {
    pub access: String,
    pub refresh: String,
}

impl Default for TokenKeys {
    fn default() -> Self {
        Self {
            access: DEFAULT_ACCESS_TOKEN_KEY.to_string(),
            refresh: DEFAULT_REFRESH_TOKEN_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub life_days: i64,
    pub same_site: CookieSameSite,
    pub secure: bool,
    /// Fallback source for the cookie domain when a request has no Origin/Referer.
    pub app_url: Option<String>,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            life_days: 14,
            same_site: CookieSameSite::Lax,
            secure: false,
            app_url: None,
        }
    }
}

/// Process-wide token configuration. Built once at startup and shared read-only.
#[derive(Clone)]
pub struct JwtConfig {
    secret: String,
    pub access_lifespan: Duration,
    pub refresh_lifespan: Duration,
    pub activation_lifespan: Duration,
    /// Allowable clock skew in seconds when validating `exp`.
    pub leeway_seconds: u64,
    pub keys: TokenKeys,
    pub cookies: CookieSettings,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_lifespan", &self.access_lifespan)
            .field("refresh_lifespan", &self.refresh_lifespan)
            .field("activation_lifespan", &self.activation_lifespan)
            .field("leeway_seconds", &self.leeway_seconds)
            .field("keys", &self.keys)
            .field("cookies", &self.cookies)
            .finish()
    }
}

impl JwtConfig {
    /// Defaults: 1 hour access, 7 day refresh, 6 hour activation, no leeway.
    pub fn new(secret: impl Into<String>) -> AuthResult<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(AuthError::MissingSecret);
        }
        Ok(Self {
            secret,
            access_lifespan: Duration::hours(1),
            refresh_lifespan: Duration::days(7),
            activation_lifespan: Duration::hours(6),
            leeway_seconds: 0,
            keys: TokenKeys::default(),
            cookies: CookieSettings::default(),
        })
    }

    pub fn from_env() -> AuthResult<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    pub fn from_vars<F>(lookup: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).and_then(|value| normalize_optional(&value));

        let mut config = Self::new(var("APP_KEY").unwrap_or_default())?;

        if let Some(value) = var("ACCESS_TOKEN_LIFESPAN") {
            config.access_lifespan = parse_lifespan(&value)?;
        }
        if let Some(value) = var("REFRESH_TOKEN_LIFESPAN") {
            config.refresh_lifespan = parse_lifespan(&value)?;
        }
        if let Some(value) = var("ACTIVATION_TOKEN_LIFESPAN") {
            config.activation_lifespan = parse_lifespan(&value)?;
        }
        if let Some(value) = var("JWT_LEEWAY_SECONDS") {
            config.leeway_seconds = value
                .parse()
                .map_err(|_| AuthError::InvalidLeeway(value.clone()))?;
        }
        if let Some(value) = var("ACCESS_TOKEN_KEY") {
            config.keys.access = value;
        }
        if let Some(value) = var("REFRESH_TOKEN_KEY") {
            config.keys.refresh = value;
        }
        if let Some(value) = var("COOKIE_LIFE") {
            let days: i64 = value
                .parse()
                .map_err(|_| AuthError::InvalidCookieLife(value.clone()))?;
            // Zero keeps the default, like an unset value.
            if !(0..=MAX_LIFETIME_DAYS).contains(&days) {
                return Err(AuthError::InvalidCookieLife(value));
            }
            if days > 0 {
                config.cookies.life_days = days;
            }
        }
        if let Some(value) = var("AUTH_COOKIE_SAMESITE") {
            config.cookies.same_site = CookieSameSite::parse(&value)?;
        }
        if let Some(value) = var("AUTH_COOKIE_SECURE") {
            config.cookies.secure = parse_bool(&value);
        }
        config.cookies.app_url = var("APP_URL");

        Ok(config)
    }

    pub fn secret(&self) -> &[u8] {
        self.secret.as_bytes()
    }

    pub fn with_access_lifespan(mut self, lifespan: Duration) -> Self {
        self.access_lifespan = lifespan;
        self
    }

    pub fn with_refresh_lifespan(mut self, lifespan: Duration) -> Self {
        self.refresh_lifespan = lifespan;
        self
    }

    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    pub fn with_keys(mut self, keys: TokenKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_app_url(mut self, url: impl Into<String>) -> Self {
        self.cookies.app_url = Some(url.into());
        self
    }
}

/// Parses lifespans such as `90`, `15m`, `1h`, `7d`, `2w`. A bare number is seconds.
/// Values beyond `MAX_LIFETIME_DAYS` are rejected.
pub fn parse_lifespan(value: &str) -> AuthResult<Duration> {
    let trimmed = value.trim();
    let invalid = || AuthError::InvalidLifespan(value.to_string());
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let amount: i64 = digits.parse().map_err(|_| invalid())?;
    let duration = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "s" | "sec" | "secs" | "seconds" => Duration::try_seconds(amount),
        "m" | "min" | "mins" | "minutes" => Duration::try_minutes(amount),
        "h" | "hr" | "hrs" | "hours" => Duration::try_hours(amount),
        "d" | "day" | "days" => Duration::try_days(amount),
        "w" | "week" | "weeks" => Duration::try_weeks(amount),
        _ => None,
    };
    duration
        .filter(|d| *d > Duration::zero() && *d <= Duration::days(MAX_LIFETIME_DAYS))
        .ok_or_else(invalid)
}

pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
