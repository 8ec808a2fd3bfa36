//! Byte progress reporting
//!
//! Progress is a plain synchronous callback. Callers never see more than
//! one call per throttle interval, plus one final call when a transfer
//! completes.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, ReadBuf};

/// Default minimum spacing between two progress callbacks
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Bytes moved so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressState {
    /// Bytes transferred; never decreases within one job
    pub loaded: u64,

    /// Expected bytes, `None` when indeterminate (compressed streams)
    pub total: Option<u64>,
}

impl ProgressState {
    /// Completed fraction in `[0, 1]` when the total is known
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.loaded as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// Progress callback
pub type ProgressFn = Arc<dyn Fn(ProgressState) + Send + Sync>;

/// Rate limiter for progress callbacks
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether a callback may fire now; records the firing when it may
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL)
    }
}

/// [`AsyncRead`] adapter counting the bytes read through it
pub struct ProgressReader<R> {
    inner: R,
    callback: ProgressFn,
    throttle: Throttle,
    loaded: u64,
    total: Option<u64>,
    finished: bool,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, total: Option<u64>, callback: ProgressFn, interval: Duration) -> Self {
        Self {
            inner,
            callback,
            throttle: Throttle::new(interval),
            loaded: 0,
            total,
            finished: false,
        }
    }

    /// Bytes read so far
    pub fn loaded(&self) -> u64 {
        self.loaded
    }

    fn report(&mut self, force: bool) {
        if force || self.throttle.ready() {
            (self.callback)(ProgressState {
                loaded: self.loaded,
                total: self.total,
            });
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let before = buf.filled().len();
        let wanted = buf.remaining() > 0;

        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;

        let read = (buf.filled().len() - before) as u64;
        if read > 0 {
            this.loaded += read;
            this.report(false);
        } else if wanted && !this.finished {
            this.finished = true;
            this.report(true);
        }
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::io::AsyncReadExt;

    use super::*;

    fn recorder() -> (ProgressFn, Arc<Mutex<Vec<ProgressState>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressFn = Arc::new(move |state: ProgressState| sink.lock().unwrap().push(state));
        (callback, seen)
    }

    #[test]
    fn test_fraction() {
        let state = ProgressState {
            loaded: 50,
            total: Some(200),
        };
        assert_eq!(state.fraction(), Some(0.25));
        assert_eq!(ProgressState::default().fraction(), None);
        let empty = ProgressState {
            loaded: 0,
            total: Some(0),
        };
        assert_eq!(empty.fraction(), Some(1.0));
    }

    #[test]
    fn test_throttle() {
        let mut throttle = Throttle::new(Duration::from_secs(3600));
        assert!(throttle.ready());
        assert!(!throttle.ready());

        let mut open = Throttle::new(Duration::ZERO);
        assert!(open.ready());
        assert!(open.ready());
    }

    #[tokio::test]
    async fn test_reader_reports_final_state() {
        let data = vec![7u8; 10_000];
        let (callback, seen) = recorder();
        let mut reader = ProgressReader::new(
            &data[..],
            Some(10_000),
            callback,
            Duration::from_secs(3600),
        );

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out.len(), 10_000);
        assert_eq!(reader.loaded(), 10_000);

        let seen = seen.lock().unwrap();
        // first chunk passes the throttle, the rest is coalesced into the final call
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen.last().copied(),
            Some(ProgressState {
                loaded: 10_000,
                total: Some(10_000)
            })
        );
        assert!(seen.windows(2).all(|w| w[0].loaded <= w[1].loaded));
    }
}
