use std::future::{Future, IntoFuture};

use futures::future::{ready, BoxFuture, Either, FutureExt, Ready};

/// A value that is either already available or still being computed.
///
/// Callbacks handed to the pipeline return this so the pipeline can `.await`
/// them uniformly, whether the caller answered synchronously or not.
pub enum Deferred<T> {
    Ready(T),
    Pending(BoxFuture<'static, T>),
}

impl<T: Send + 'static> Deferred<T> {
    pub fn ready(value: T) -> Self {
        Deferred::Ready(value)
    }

    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Deferred::Pending(future.boxed())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Deferred::Ready(_))
    }

    pub fn map<U, F>(self, f: F) -> Deferred<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self {
            Deferred::Ready(value) => Deferred::Ready(f(value)),
            Deferred::Pending(future) => Deferred::Pending(future.map(f).boxed()),
        }
    }
}

impl<T> From<BoxFuture<'static, T>> for Deferred<T> {
    fn from(value: BoxFuture<'static, T>) -> Self {
        Deferred::Pending(value)
    }
}

impl<T> IntoFuture for Deferred<T> {
    type Output = T;
    type IntoFuture = Either<Ready<T>, BoxFuture<'static, T>>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Deferred::Ready(value) => Either::Left(ready(value)),
            Deferred::Pending(future) => Either::Right(future),
        }
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Deferred::Ready(_) => f.write_str("Deferred::Ready(..)"),
            Deferred::Pending(_) => f.write_str("Deferred::Pending(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_and_pending_resolve_the_same_way() {
        let now = Deferred::ready(3);
        assert!(now.is_ready());
        assert_eq!(now.await, 3);

        let later = Deferred::pending(async {
            tokio::task::yield_now().await;
            4
        });
        assert!(!later.is_ready());
        assert_eq!(later.await, 4);
    }

    #[tokio::test]
    async fn map_applies_to_both_forms() {
        assert_eq!(Deferred::ready(2).map(|v| v * 10).await, 20);
        assert_eq!(Deferred::pending(async { 2 }).map(|v| v + 1).await, 3);
    }
}
