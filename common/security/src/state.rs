use common_auth::{Claims, RequestTokens};
use common_http_errors::{ApiError, AuthSubCode};

/// Per-request authentication state, threaded through the pipeline stages and
/// carried in the request extensions.
#[derive(Debug, Clone, Default)]
pub struct RequestAuthState {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<Claims>,
    pub error_detail: Option<ApiError>,
    pub new_access_token: Option<String>,
    pub refresh_attempted: bool,
}

impl RequestAuthState {
    pub fn new(tokens: RequestTokens) -> Self {
        Self {
            access_token: tokens.access,
            refresh_token: tokens.refresh,
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user: Claims) -> Self {
        self.user = Some(user);
        self.error_detail = None;
        self
    }

    pub fn with_error(mut self, error: ApiError) -> Self {
        self.error_detail = Some(error);
        self
    }

    pub fn renewed(mut self, token: String, user: Claims) -> Self {
        self.new_access_token = Some(token);
        self.with_user(user)
    }

    /// A user carrying an `id` is present.
    pub fn is_authenticated(&self) -> bool {
        self.user.as_ref().and_then(Claims::id).is_some()
    }

    pub fn user_id(&self) -> Option<String> {
        self.user.as_ref().and_then(Claims::id_string)
    }

    pub fn access_expired(&self) -> bool {
        self.error_detail
            .as_ref()
            .is_some_and(|error| error.is_authentication(AuthSubCode::Expired))
    }
}
