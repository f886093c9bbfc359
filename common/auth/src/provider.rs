use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::claims::Claims;
use crate::deferred::Deferred;

pub type LookupError = Box<dyn std::error::Error + Send + Sync>;
pub type LookupResult = Result<Option<Claims>, LookupError>;
pub type UserLookup = Deferred<LookupResult>;

/// Resolves the current state of a user from the identity carried by a refresh token.
///
/// Implemented for any `Fn(Value) -> R` where `R` is a plain `Option<Claims>`,
/// a `Result<Option<Claims>, E>`, or a boxed future of either.
pub trait UserProvider: Send + Sync {
    fn get_user(&self, id: Value) -> UserLookup;
}

impl<F, R> UserProvider for F
where
    F: Fn(Value) -> R + Send + Sync,
    R: Into<UserLookup>,
{
    fn get_user(&self, id: Value) -> UserLookup {
        (self)(id).into()
    }
}

impl From<Option<Claims>> for UserLookup {
    fn from(value: Option<Claims>) -> Self {
        Deferred::Ready(Ok(value))
    }
}

impl<E> From<Result<Option<Claims>, E>> for UserLookup
where
    E: Into<LookupError>,
{
    fn from(value: Result<Option<Claims>, E>) -> Self {
        Deferred::Ready(value.map_err(Into::into))
    }
}

impl From<BoxFuture<'static, Option<Claims>>> for UserLookup {
    fn from(value: BoxFuture<'static, Option<Claims>>) -> Self {
        Deferred::Pending(value.map(Ok).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn named(id: &Value) -> Claims {
        let mut claims = Claims::with_id(id.clone());
        claims.insert("name", "ada");
        claims
    }

    #[tokio::test]
    async fn sync_closures_are_providers() {
        let provider = |id: Value| Some(named(&id));
        let user = provider.get_user(json!(1)).await.unwrap().unwrap();
        assert_eq!(user.get("name"), Some(&json!("ada")));
    }

    #[tokio::test]
    async fn async_closures_are_providers() {
        let provider = |id: Value| {
            async move {
                tokio::task::yield_now().await;
                Some(named(&id))
            }
            .boxed()
        };
        let lookup = provider.get_user(json!("u-9"));
        assert!(!lookup.is_ready());
        let user = lookup.await.unwrap().unwrap();
        assert_eq!(user.id(), Some(&json!("u-9")));
    }

    #[tokio::test]
    async fn fallible_providers_surface_errors() {
        let provider = |_id: Value| -> Result<Option<Claims>, std::io::Error> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "directory offline"))
        };
        let err = provider.get_user(json!(1)).await.unwrap_err();
        assert_eq!(err.to_string(), "directory offline");
    }
}
