//! Request coalescer — the read side of C4 (spec §4.3). An in-flight map of
//! `id -> shared_future<result>`; concurrent readers for the same id attach
//! to the same future, and the first caller drives the backend fetch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use uuid::Uuid;

use crate::error::BrainyError;

/// Clone-able error wrapper: `Shared`'s output must be `Clone`, and
/// `BrainyError` isn't (it wraps `anyhow::Error`), so every attached caller
/// gets an `Arc` to the same underlying error.
#[derive(Debug, Clone)]
pub struct CoalescedError(pub Arc<BrainyError>);

impl std::fmt::Display for CoalescedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for CoalescedError {}

impl From<BrainyError> for CoalescedError {
    fn from(e: BrainyError) -> Self {
        CoalescedError(Arc::new(e))
    }
}

type SharedResult<T> = Result<T, CoalescedError>;
type InFlight<T> = Shared<BoxFuture<'static, SharedResult<T>>>;

pub struct RequestCoalescer<T: Clone + Send + Sync + 'static> {
    in_flight: Mutex<HashMap<Uuid, InFlight<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Default for RequestCoalescer<T> {
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> RequestCoalescer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    /// Attaches to an in-flight fetch for `id`, or starts one via `fetch` if
    /// none is running. `fetch` is only invoked by whichever caller observes
    /// no existing entry — never called speculatively by attaching callers.
    pub async fn get_or_fetch<F, Fut>(&self, id: Uuid, fetch: F) -> SharedResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BrainyError>> + Send + 'static,
    {
        let shared = {
            let mut guard = self.in_flight.lock().unwrap();
            if let Some(existing) = guard.get(&id) {
                existing.clone()
            } else {
                let boxed: BoxFuture<'static, SharedResult<T>> =
                    async move { fetch().await.map_err(CoalescedError::from) }.boxed();
                let shared = boxed.shared();
                guard.insert(id, shared.clone());
                shared
            }
        };

        let result = shared.await;
        self.in_flight.lock().unwrap().remove(&id);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_fetches_for_same_id_share_one_backend_call() {
        let coalescer: Arc<RequestCoalescer<i32>> = Arc::new(RequestCoalescer::new());
        let call_count = Arc::new(AtomicUsize::new(0));
        let id = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coalescer = coalescer.clone();
            let call_count = call_count.clone();
            handles.push(tokio::spawn(async move {
                coalescer
                    .get_or_fetch(id, || {
                        let call_count = call_count.clone();
                        async move {
                            call_count.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(42)
                        }
                    })
                    .await
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), 42);
        }
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn entry_is_removed_after_resolution() {
        let coalescer: RequestCoalescer<i32> = RequestCoalescer::new();
        let id = Uuid::new_v4();
        coalescer.get_or_fetch(id, || async { Ok(1) }).await.unwrap();
        assert_eq!(coalescer.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn errors_are_shared_across_attached_callers() {
        let coalescer: Arc<RequestCoalescer<i32>> = Arc::new(RequestCoalescer::new());
        let id = Uuid::new_v4();
        let a = coalescer.clone();
        let b = coalescer.clone();
        let (ra, rb) = tokio::join!(
            a.get_or_fetch(id, || async {
                Err(BrainyError::InvalidInput("boom".into()))
            }),
            b.get_or_fetch(id, || async { Ok(99) })
        );
        assert!(ra.is_err());
        assert!(rb.is_err());
    }
}
