//! Rate source trait and test double.

use async_trait::async_trait;
use ratefeed_common::{ExchangeRate, SourceKind};

use crate::error::SourceResult;

/// A place rates can be fetched from.
///
/// Implementations never report an empty list as success; "no rows" is
/// [`SourceError::NotFound`](crate::SourceError::NotFound).
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Which ranked source this is.
    fn kind(&self) -> SourceKind;

    /// Fetch the latest snapshot this source knows about.
    async fn fetch(&self) -> SourceResult<Vec<ExchangeRate>>;
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockRateSource;

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::sync::Notify;

    use super::*;
    use crate::error::SourceError;

    /// Scripted rate source for tests.
    ///
    /// Counts calls and the highest number of concurrent fetches it has seen.
    pub struct MockRateSource {
        kind: SourceKind,
        result: Mutex<SourceResult<Vec<ExchangeRate>>>,
        delay: Mutex<Option<Duration>>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        called: Notify,
    }

    impl MockRateSource {
        /// A source that returns the given rows.
        pub fn succeeding(kind: SourceKind, rates: Vec<ExchangeRate>) -> Self {
            Self::with_result(kind, Ok(rates))
        }

        /// A source that fails with the given error.
        pub fn failing(kind: SourceKind, error: SourceError) -> Self {
            Self::with_result(kind, Err(error))
        }

        fn with_result(kind: SourceKind, result: SourceResult<Vec<ExchangeRate>>) -> Self {
            Self {
                kind,
                result: Mutex::new(result),
                delay: Mutex::new(None),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                called: Notify::new(),
            }
        }

        /// Make every fetch take this long.
        pub fn with_delay(self, delay: Duration) -> Self {
            *self.delay.lock() = Some(delay);
            self
        }

        /// Change what subsequent fetches return.
        pub fn set_result(&self, result: SourceResult<Vec<ExchangeRate>>) {
            *self.result.lock() = result;
        }

        /// Number of fetches started so far.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Fetches running right now.
        pub fn in_flight(&self) -> usize {
            self.in_flight.load(Ordering::SeqCst)
        }

        /// Highest number of fetches observed running at once.
        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        /// Wait until at least `n` fetches have started.
        pub async fn wait_for_calls(&self, n: usize) {
            loop {
                let notified = self.called.notified();
                if self.calls() >= n {
                    return;
                }
                notified.await;
            }
        }
    }

    #[async_trait]
    impl RateSource for MockRateSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn fetch(&self) -> SourceResult<Vec<ExchangeRate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            self.called.notify_waiters();

            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.result.lock().clone()
        }
    }
}
