//! One-time engine construction.
//!
//! [`LazyEngine`] wraps the build procedure of a client's engine. The first
//! caller of [`get`](LazyEngine::get) runs it; callers arriving while that
//! build is in flight wait for it instead of starting their own; every later
//! caller gets the same [`Arc`]. A build that fails is not remembered, so
//! the next caller tries again.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::OnceCell;

use crate::engine::Engine;
use crate::error::ClientError;

type BuildFn = Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn Engine>, ClientError>> + Send + Sync>;

pub struct LazyEngine {
    cell: OnceCell<Arc<dyn Engine>>,
    build: BuildFn,
}

impl LazyEngine {
    pub fn new<F, Fut>(build: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Engine>, ClientError>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            build: Box::new(move || Box::pin(build())),
        }
    }

    /// The engine, building it first if nobody has yet.
    pub async fn get(&self) -> Result<Arc<dyn Engine>, ClientError> {
        self.cell.get_or_try_init(|| (self.build)()).await.cloned()
    }

    pub fn is_built(&self) -> bool {
        self.cell.initialized()
    }
}

impl fmt::Debug for LazyEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyEngine")
            .field("built", &self.is_built())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;
    use soapflow::{FetchError, Metadata};

    struct Stub(Metadata);

    #[async_trait]
    impl Engine for Stub {
        async fn call(&self, _operation: &str, _args: Vec<Value>) -> Result<Value, ClientError> {
            Ok(Value::Null)
        }

        fn metadata(&self) -> &Metadata {
            &self.0
        }
    }

    fn counting(builds: Arc<AtomicUsize>) -> LazyEngine {
        LazyEngine::new(move || {
            let builds = Arc::clone(&builds);
            async move {
                builds.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Arc::new(Stub(Metadata::default())) as Arc<dyn Engine>)
            }
        })
    }

    #[tokio::test]
    async fn concurrent_first_access_builds_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let lazy = Arc::new(counting(Arc::clone(&builds)));
        assert!(!lazy.is_built());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lazy = Arc::clone(&lazy);
                tokio::spawn(async move { lazy.get().await.unwrap() })
            })
            .collect();
        let mut engines = Vec::new();
        for handle in handles {
            engines.push(handle.await.unwrap());
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(lazy.is_built());
        assert!(engines.iter().all(|e| Arc::ptr_eq(e, &engines[0])));
    }

    #[tokio::test]
    async fn later_calls_reuse_the_engine() {
        let builds = Arc::new(AtomicUsize::new(0));
        let lazy = counting(Arc::clone(&builds));
        let first = lazy.get().await.unwrap();
        let second = lazy.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_build_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let lazy = LazyEngine::new(move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ClientError::Fetch(FetchError::NotFound("mem://calc".into())))
                } else {
                    Ok(Arc::new(Stub(Metadata::default())) as Arc<dyn Engine>)
                }
            }
        });

        assert!(lazy.get().await.is_err());
        assert!(!lazy.is_built());
        assert!(lazy.get().await.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
