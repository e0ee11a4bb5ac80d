//! Time-bounded single-flight cache
//!
//! Holds one value with an expiry and at most one refresh in flight.
//! Callers arriving during a refresh attach to the in-flight future
//! instead of starting their own.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::Result;

type SharedRefresh<T> = Shared<BoxFuture<'static, Result<T>>>;

struct CacheState<T> {
    value: Option<(T, Instant)>,
    in_flight: Option<SharedRefresh<T>>,
}

pub struct SingleFlightCache<T: Clone> {
    ttl: Duration,
    state: Mutex<CacheState<T>>,
}

impl<T> SingleFlightCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState {
                value: None,
                in_flight: None,
            }),
        }
    }

    /// Return the cached value, or run `refresh` if it has expired.
    ///
    /// `refresh` is only invoked when no other refresh is in flight.
    /// Errors are shared with every waiting caller but never cached.
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let pending = {
            let mut state = self.state.lock().await;

            if let Some((value, expires_at)) = &state.value {
                if Instant::now() < *expires_at {
                    return Ok(value.clone());
                }
            }

            match &state.in_flight {
                Some(pending) => pending.clone(),
                None => {
                    let pending = refresh().boxed().shared();
                    state.in_flight = Some(pending.clone());
                    pending
                }
            }
        };

        let result = pending.clone().await;

        let mut state = self.state.lock().await;
        let is_current = state
            .in_flight
            .as_ref()
            .map_or(false, |current| current.ptr_eq(&pending));
        if is_current {
            state.in_flight = None;
            if let Ok(value) = &result {
                state.value = Some((value.clone(), Instant::now() + self.ttl));
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MarketDataError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_refresh(
        calls: &Arc<AtomicUsize>,
    ) -> impl Future<Output = Result<usize>> + Send + 'static {
        let calls = calls.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_refresh() {
        let cache = Arc::new(SingleFlightCache::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b, c) = tokio::join!(
            cache.get_or_refresh(|| counting_refresh(&calls)),
            cache.get_or_refresh(|| counting_refresh(&calls)),
            cache.get_or_refresh(|| counting_refresh(&calls)),
        );

        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (1, 1, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_value_expires_after_ttl() {
        let cache = SingleFlightCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(cache.get_or_refresh(|| counting_refresh(&calls)).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.get_or_refresh(|| counting_refresh(&calls)).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.get_or_refresh(|| counting_refresh(&calls)).await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_not_cached() {
        let cache: SingleFlightCache<usize> = SingleFlightCache::new(Duration::from_secs(60));

        let err = cache
            .get_or_refresh(|| async { Err(MarketDataError::ConnectionTimeout) })
            .await;
        assert_eq!(err, Err(MarketDataError::ConnectionTimeout));

        let ok = cache.get_or_refresh(|| async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
    }
}
