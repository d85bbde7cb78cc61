//! Opaque fetch functions.
//!
//! The engine never talks to a transport itself. Every loader, prefetch and
//! registry entry is handed a `Fetcher<T>`: a shared closure that produces a
//! fresh future each time it is called.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;

/// A clonable, thread-safe asynchronous fetch function.
pub type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// Build a `Fetcher` from an async closure.
///
/// ```
/// use stageload_core::fetcher;
///
/// let leases = fetcher(|| async { anyhow::Ok(vec!["unit 4B".to_string()]) });
/// # let _ = leases;
/// ```
pub fn fetcher<T, F, Fut>(f: F) -> Fetcher<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Erase the payload type of a fetcher by converting its output to JSON.
pub fn erase<T>(inner: Fetcher<T>) -> Fetcher<Value>
where
    T: Serialize + Send + 'static,
{
    Arc::new(move || {
        let fut = inner();
        async move {
            let value = fut.await?;
            anyhow::Ok(serde_json::to_value(value)?)
        }
        .boxed()
    })
}
