use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

use common_http_errors::{ApiError, ApiResult, AuthSubCode};

use crate::claims::{Claims, TokenPair, EXPIRES_AT, ISSUED_AT};
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::provider::UserProvider;

pub const TOKEN_NOT_FOUND: &str = "Unauthorized: token not found!";
pub const TOKEN_EXPIRED: &str = "Unauthorized: Supplied token has expired!";
pub const TOKEN_INVALID: &str = "Unauthorized: Supplied token is invalid!";
pub const REFRESH_TOKEN_MISSING: &str = "Invalid arguments: provide user and refresh token";
pub const REFRESH_PAYLOAD_INVALID: &str = "Invalid refreshToken: supplied token is invalid";
pub const REFRESH_USER_MISSING: &str = "Unable to refresh token: could not read user detail";

/// Signs, verifies and renews HS256 bearer tokens with the process-wide secret.
#[derive(Clone)]
pub struct TokenService {
    config: Arc<JwtConfig>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(config: JwtConfig) -> AuthResult<Self> {
        Self::from_shared(Arc::new(config))
    }

    pub fn from_shared(config: Arc<JwtConfig>) -> AuthResult<Self> {
        if config.secret().is_empty() {
            return Err(AuthError::MissingSecret);
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_seconds;
        // Claims are arbitrary user fields; only `exp` is enforced.
        validation.validate_aud = false;

        Ok(Self {
            encoding: EncodingKey::from_secret(config.secret()),
            decoding: DecodingKey::from_secret(config.secret()),
            validation,
            config,
        })
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Signs `claims` with the access lifespan.
    pub fn make_token(&self, claims: &Claims) -> ApiResult<String> {
        self.make_token_with(claims, self.config.access_lifespan)
    }

    pub fn make_activation_token(&self, claims: &Claims) -> ApiResult<String> {
        self.make_token_with(claims, self.config.activation_lifespan)
    }

    /// Signs `claims` valid for `lifespan` from now. Existing `iat`/`exp` are replaced.
    pub fn make_token_with(&self, claims: &Claims, lifespan: Duration) -> ApiResult<String> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(lifespan)
            .ok_or_else(|| ApiError::custom("Failed to sign token: lifespan out of range"))?;
        let mut signed = claims.clone();
        signed.insert(ISSUED_AT, now.timestamp());
        signed.insert(EXPIRES_AT, expires_at.timestamp());

        encode(&Header::new(Algorithm::HS256), &signed, &self.encoding)
            .map_err(|err| ApiError::custom(format!("Failed to sign token: {err}")))
    }

    pub fn verify_token(&self, token: &str, include_timestamps: bool) -> ApiResult<Claims> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ApiError::authentication(TOKEN_NOT_FOUND));
        }

        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|err| {
            match err.kind() {
                JwtErrorKind::ExpiredSignature => ApiError::authentication(TOKEN_EXPIRED)
                    .with_sub_code(AuthSubCode::Expired),
                _ => ApiError::authentication(TOKEN_INVALID),
            }
        })?;

        let mut claims = data.claims;
        if !include_timestamps {
            claims.strip_timestamps();
        }
        debug!(user = claims.id_string().unwrap_or_default(), "verified token");
        Ok(claims)
    }

    /// Access token with the full user, refresh token with only its `id`.
    pub fn generate_token_pair(&self, user: &Claims) -> ApiResult<TokenPair> {
        let id = user
            .id()
            .cloned()
            .ok_or_else(|| ApiError::validation("user id is required to issue tokens"))?;
        let access = self.make_token(&user.clone().without_timestamps())?;
        let refresh = self.make_token_with(&Claims::with_id(id), self.config.refresh_lifespan)?;
        Ok(TokenPair { access, refresh })
    }

    /// Exchanges a refresh token for a new access token of the current user.
    ///
    /// Verification and payload checks run before `provider` is consulted, so a
    /// tampered token never triggers a lookup.
    pub async fn renew_access_token<P>(
        &self,
        refresh_token: &str,
        provider: &P,
    ) -> ApiResult<(String, Claims)>
    where
        P: UserProvider + ?Sized,
    {
        if refresh_token.trim().is_empty() {
            return Err(ApiError::authentication(REFRESH_TOKEN_MISSING)
                .with_sub_code(AuthSubCode::MissingRefreshInput));
        }

        let decoded = self.verify_token(refresh_token, false)?;
        let id = decoded.id().cloned().ok_or_else(|| {
            ApiError::authentication(REFRESH_PAYLOAD_INVALID)
                .with_sub_code(AuthSubCode::InvalidRefreshPayload)
        })?;

        let user = match provider.get_user(id).await {
            Ok(Some(user)) => user,
            Ok(None) => return Err(ApiError::custom(REFRESH_USER_MISSING)),
            Err(err) => return Err(ApiError::normalize(err)),
        };

        let token = self.make_token(&user.clone().without_timestamps())?;
        debug!(user = user.id_string().unwrap_or_default(), "renewed access token");
        Ok((token, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use common_http_errors::ErrorKind;
    use futures::future::FutureExt;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service() -> TokenService {
        TokenService::new(JwtConfig::new("unit-test-secret").unwrap()).unwrap()
    }

    fn user() -> Claims {
        Claims::try_from(json!({
            "id": "u-1",
            "name": "Ada",
            "privilegeList": ["admin", "reports:read"]
        }))
        .unwrap()
    }

    fn tamper(token: &str) -> String {
        let parts: Vec<&str> = token.split('.').collect();
        let payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let mut value: Value = serde_json::from_slice(&payload).unwrap();
        value["privilegeList"] = json!(["super_admin"]);
        let forged = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&value).unwrap());
        format!("{}.{}.{}", parts[0], forged, parts[2])
    }

    fn counting_provider(calls: &AtomicUsize) -> impl Fn(Value) -> Option<Claims> + Send + Sync + '_ {
        move |_id| {
            calls.fetch_add(1, Ordering::SeqCst);
            Some(user())
        }
    }

    #[test]
    fn round_trip_preserves_claims() {
        let service = service();
        let token = service.make_token(&user()).unwrap();

        let with_timestamps = service.verify_token(&token, true).unwrap();
        assert!(with_timestamps.issued_at().is_some());
        let lifetime = with_timestamps.expires_at().unwrap() - with_timestamps.issued_at().unwrap();
        assert_eq!(lifetime, Duration::hours(1));

        let without = service.verify_token(&token, false).unwrap();
        assert_eq!(without, user());
    }

    #[test]
    fn expired_tokens_report_sub_code_one() {
        let service = service();
        let token = service.make_token_with(&user(), Duration::minutes(-5)).unwrap();
        let err = service.verify_token(&token, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.sub_code(), 1);
        assert_eq!(err.message(), TOKEN_EXPIRED);
    }

    #[test]
    fn tampered_tokens_report_sub_code_zero() {
        let service = service();
        let token = service.make_token(&user()).unwrap();
        let err = service.verify_token(&tamper(&token), true).unwrap_err();
        assert_eq!(err.sub_code(), 0);
        assert_eq!(err.message(), TOKEN_INVALID);

        // An expired token with a broken signature is invalid, not expired.
        let expired = service.make_token_with(&user(), Duration::minutes(-5)).unwrap();
        let err = service.verify_token(&tamper(&expired), true).unwrap_err();
        assert_eq!(err.sub_code(), 0);
    }

    #[test]
    fn foreign_secret_and_garbage_are_invalid() {
        let other = TokenService::new(JwtConfig::new("another-secret").unwrap()).unwrap();
        let token = other.make_token(&user()).unwrap();
        let service = service();
        assert_eq!(service.verify_token(&token, true).unwrap_err().message(), TOKEN_INVALID);
        assert_eq!(service.verify_token("not-a-jwt", true).unwrap_err().sub_code(), 0);
    }

    #[test]
    fn empty_token_is_not_found() {
        let err = service().verify_token("  ", true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.sub_code(), 0);
        assert_eq!(err.message(), TOKEN_NOT_FOUND);
    }

    #[test]
    fn leeway_accepts_recently_expired_tokens() {
        let service =
            TokenService::new(JwtConfig::new("unit-test-secret").unwrap().with_leeway(600)).unwrap();
        let token = service.make_token_with(&user(), Duration::minutes(-1)).unwrap();
        assert!(service.verify_token(&token, false).is_ok());
    }

    #[test]
    fn token_pair_refresh_carries_only_id() {
        let service = service();
        let pair = service.generate_token_pair(&user()).unwrap();

        let access = service.verify_token(&pair.access, false).unwrap();
        assert_eq!(access, user());

        let refresh = service.verify_token(&pair.refresh, true).unwrap();
        let lifetime = refresh.expires_at().unwrap() - refresh.issued_at().unwrap();
        assert_eq!(lifetime, Duration::days(7));
        assert_eq!(refresh.without_timestamps().into_value(), json!({"id": "u-1"}));
    }

    #[test]
    fn token_pair_requires_id() {
        let anonymous = Claims::try_from(json!({"name": "nobody"})).unwrap();
        let err = service().generate_token_pair(&anonymous).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn renew_with_empty_refresh_token_is_sub_code_two() {
        let calls = AtomicUsize::new(0);
        let err = service()
            .renew_access_token("", &counting_provider(&calls))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.sub_code(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn renew_never_looks_up_tampered_tokens() {
        let service = service();
        let refresh = service.generate_token_pair(&user()).unwrap().refresh;
        let calls = AtomicUsize::new(0);
        let err = service
            .renew_access_token(&tamper(&refresh), &counting_provider(&calls))
            .await
            .unwrap_err();
        assert_eq!(err.sub_code(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let expired = service
            .make_token_with(&Claims::with_id("u-1"), Duration::minutes(-1))
            .unwrap();
        let err = service
            .renew_access_token(&expired, &counting_provider(&calls))
            .await
            .unwrap_err();
        assert_eq!(err.sub_code(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn renew_without_id_is_sub_code_three() {
        let service = service();
        let token = service
            .make_token(&Claims::try_from(json!({"name": "ghost"})).unwrap())
            .unwrap();
        let calls = AtomicUsize::new(0);
        let err = service
            .renew_access_token(&token, &counting_provider(&calls))
            .await
            .unwrap_err();
        assert_eq!(err.sub_code(), 3);
        assert_eq!(err.message(), REFRESH_PAYLOAD_INVALID);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn renew_with_vanished_user_is_server_error() {
        let service = service();
        let refresh = service.generate_token_pair(&user()).unwrap().refresh;
        let err = service
            .renew_access_token(&refresh, &|_id: Value| None::<Claims>)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Custom);
        assert_eq!(err.status().as_u16(), 500);
        assert_eq!(err.message(), REFRESH_USER_MISSING);
    }

    #[tokio::test]
    async fn renew_with_failing_lookup_keeps_its_message() {
        let service = service();
        let refresh = service.generate_token_pair(&user()).unwrap().refresh;
        let provider = |_id: Value| -> Result<Option<Claims>, std::io::Error> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "directory offline"))
        };
        let err = service.renew_access_token(&refresh, &provider).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Custom);
        assert_eq!(err.message(), "directory offline");
    }

    #[tokio::test]
    async fn renew_signs_the_looked_up_user_once() {
        let service = service();
        let refresh = service.generate_token_pair(&user()).unwrap().refresh;
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let provider = move |id: Value| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                let mut fresh = Claims::with_id(id);
                fresh.insert("privilegeList", json!(["admin", "audit"]));
                Some(fresh)
            }
            .boxed()
        };

        let (token, renewed) = service.renew_access_token(&refresh, &provider).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(renewed.id(), Some(&json!("u-1")));

        let decoded = service.verify_token(&token, false).unwrap();
        assert_eq!(decoded.string_list("privilegeList"), vec!["admin", "audit"]);
    }

    #[test]
    fn out_of_range_lifespan_is_an_error_not_a_panic() {
        let err = service()
            .make_token_with(&user(), Duration::weeks(1_000_000_000))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Custom);
        assert_eq!(err.status().as_u16(), 500);
    }

    #[test]
    fn activation_tokens_use_their_own_lifespan() {
        let service = service();
        let token = service.make_activation_token(&Claims::with_id(5)).unwrap();
        let claims = service.verify_token(&token, true).unwrap();
        assert_eq!(
            claims.expires_at().unwrap() - claims.issued_at().unwrap(),
            Duration::hours(6)
        );
    }
}
