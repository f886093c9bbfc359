use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// Startup-time configuration failures. These abort the process; request-time
/// failures are reported as `common_http_errors::ApiError` instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("APP_KEY environment variable is required!")]
    MissingSecret,
    #[error("invalid token lifespan '{0}': expected <number>[s|m|h|d|w]")]
    InvalidLifespan(String),
    #[error("invalid cookie lifetime '{0}': expected a whole number of days")]
    InvalidCookieLife(String),
    #[error("invalid leeway '{0}': expected a whole number of seconds")]
    InvalidLeeway(String),
    #[error("unsupported cookie same-site policy '{0}'. Use Lax, Strict, or None.")]
    InvalidSameSite(String),
}
