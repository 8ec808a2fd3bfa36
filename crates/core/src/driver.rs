//! Bounded concurrency driver
//!
//! Runs one async operation per item with at most N in flight on the
//! current task. A finished slot is refilled from the queue immediately.
//! The first failure stops new work from being issued; operations already
//! in flight are allowed to finish and are not undone.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;

use crate::error::{Error, Result};
use crate::progress::{ProgressFn, ProgressState, Throttle};

/// Outcome of a successful [`run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items completed
    pub count: u64,
    /// Bytes reported by the completed items
    pub total_bytes: u64,
}

/// Run `per_item` over `items` with at most `concurrency` futures in flight
///
/// Each item resolves to the number of bytes it moved. A `concurrency` of 0
/// is treated as 1. On failure the first error is returned wrapped in
/// [`Error::Batch`] with the number of items that completed.
pub async fn run<T, F, Fut>(items: Vec<T>, concurrency: usize, per_item: F) -> Result<RunSummary>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<u64>>,
{
    let concurrency = concurrency.max(1);
    let queued = items.len();
    let mut queue = items.into_iter();
    let mut in_flight: FuturesUnordered<Fut> = queue.by_ref().take(concurrency).map(&per_item).collect();

    let mut summary = RunSummary::default();
    let mut first_error: Option<Error> = None;

    while let Some(result) = in_flight.next().await {
        match result {
            Ok(bytes) => {
                summary.count += 1;
                summary.total_bytes += bytes;
            }
            Err(e) if first_error.is_none() => {
                tracing::debug!(error = %e, in_flight = in_flight.len(), "stopping after first failure");
                first_error = Some(e);
            }
            Err(e) => {
                tracing::debug!(error = %e, "further failure while draining");
            }
        }

        if first_error.is_none()
            && let Some(item) = queue.next()
        {
            in_flight.push(per_item(item));
        }
    }

    match first_error {
        Some(source) => Err(Error::Batch {
            completed: summary.count,
            source: Box::new(source),
        }),
        None => {
            tracing::debug!(items = queued, bytes = summary.total_bytes, concurrency, "batch complete");
            Ok(summary)
        }
    }
}

/// Merges per-item byte progress into one throttled callback
///
/// `total` is fixed up front from the job list. Each item gets its own
/// callback through [`Self::item_callback`]; only the growth of each item's
/// `loaded` is added to the running sum.
pub struct ProgressAggregator {
    total: Option<u64>,
    loaded: AtomicU64,
    callback: Option<ProgressFn>,
    throttle: Mutex<Throttle>,
}

impl ProgressAggregator {
    pub fn new(total: Option<u64>, callback: Option<ProgressFn>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            total,
            loaded: AtomicU64::new(0),
            callback,
            throttle: Mutex::new(Throttle::new(interval)),
        })
    }

    /// Running sum of bytes across items
    pub fn loaded(&self) -> u64 {
        self.loaded.load(Ordering::Relaxed)
    }

    /// Callback to hand to one item's transfer, `None` when nobody listens
    pub fn item_callback(self: &Arc<Self>) -> Option<ProgressFn> {
        self.callback.as_ref()?;
        let aggregator = Arc::clone(self);
        let seen = AtomicU64::new(0);
        Some(Arc::new(move |state: ProgressState| {
            let previous = seen.fetch_max(state.loaded, Ordering::Relaxed);
            if state.loaded > previous {
                aggregator.add(state.loaded - previous);
            }
        }))
    }

    /// Count bytes of an item that reports no progress of its own
    pub fn add(&self, bytes: u64) {
        let loaded = self.loaded.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let ready = self
            .throttle
            .lock()
            .map(|mut t| t.ready())
            .unwrap_or(true);
        if ready {
            self.emit(loaded);
        }
    }

    /// Unthrottled final report
    pub fn finish(&self) {
        self.emit(self.loaded());
    }

    fn emit(&self, loaded: u64) {
        if let Some(callback) = &self.callback {
            callback(ProgressState {
                loaded,
                total: self.total,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[tokio::test]
    async fn test_run_sums_bytes() {
        let summary = run(vec![1u64, 2, 3, 4], 2, |n| async move { Ok(n * 10) })
            .await
            .unwrap();
        assert_eq!(summary, RunSummary { count: 4, total_bytes: 100 });
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_sequential() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let summary = run((0..5).collect::<Vec<u64>>(), 0, |_| {
            let active = active.clone();
            let peak = peak.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(1)
            }
        })
        .await
        .unwrap();
        assert_eq!(summary.count, 5);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_error_stops_issuing() {
        let started = Arc::new(AtomicUsize::new(0));
        let err = run((0..10).collect::<Vec<u64>>(), 1, |n| {
            let started = started.clone();
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                if n == 3 {
                    Err(Error::Store(format!("item {n} failed")))
                } else {
                    Ok(1)
                }
            }
        })
        .await
        .unwrap_err();

        assert_eq!(started.load(Ordering::SeqCst), 4);
        match err {
            Error::Batch { completed, source } => {
                assert_eq!(completed, 3);
                assert!(matches!(*source, Error::Store(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_input() {
        let summary = run(Vec::<u64>::new(), 4, |_| async { Ok(1) }).await.unwrap();
        assert_eq!(summary, RunSummary::default());
    }

    #[test]
    fn test_aggregator_sums_deltas() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressFn = Arc::new(move |s: ProgressState| sink.lock().unwrap().push(s));
        let aggregator = ProgressAggregator::new(Some(300), Some(callback), Duration::ZERO);

        let a = aggregator.item_callback().unwrap();
        let b = aggregator.item_callback().unwrap();
        a(ProgressState { loaded: 50, total: Some(100) });
        b(ProgressState { loaded: 120, total: Some(200) });
        a(ProgressState { loaded: 100, total: Some(100) });
        // repeated final report of an item adds nothing
        a(ProgressState { loaded: 100, total: Some(100) });
        b(ProgressState { loaded: 200, total: Some(200) });
        aggregator.finish();

        assert_eq!(aggregator.loaded(), 300);
        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0].loaded <= w[1].loaded));
        assert_eq!(seen.last().copied(), Some(ProgressState { loaded: 300, total: Some(300) }));
    }

    #[test]
    fn test_aggregator_without_listener() {
        let aggregator = ProgressAggregator::new(None, None, Duration::ZERO);
        assert!(aggregator.item_callback().is_none());
        aggregator.add(10);
        assert_eq!(aggregator.loaded(), 10);
    }
}
