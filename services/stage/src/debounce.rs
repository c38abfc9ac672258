//! Coalescing of bursty requests into a single run.
//!
//! Every request restarts a quiet-period timer. When the timer survives the
//! quiet period, the most recently requested action runs once and every
//! caller that joined the cycle receives its result. Requests arriving while
//! an action runs open the next cycle, which waits for the running action to
//! finish. Runs never overlap and a running action is never cancelled.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::{watch, Mutex};
use tracing::trace;

type Action<T> = Box<dyn FnOnce() -> BoxFuture<'static, T> + Send>;

struct Pending<T> {
    action: Action<T>,
    result: watch::Sender<Option<T>>,
}

struct Cycle<T> {
    generation: u64,
    pending: Option<Pending<T>>,
}

/// Debounces async actions that produce a `T`.
pub struct Debouncer<T> {
    quiet: Duration,
    cycle: Arc<Mutex<Cycle<T>>>,
    /// Held for the whole of a run.
    run: Arc<Mutex<()>>,
}

impl<T> Debouncer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            cycle: Arc::new(Mutex::new(Cycle {
                generation: 0,
                pending: None,
            })),
            run: Arc::new(Mutex::new(())),
        }
    }

    /// Request `action` and wait for the cycle it joined to finish.
    ///
    /// Returns `None` if the action panicked.
    pub async fn request<F, Fut>(&self, action: F) -> Option<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let action: Action<T> = Box::new(move || action().boxed());

        let (generation, mut rx) = {
            let mut cycle = self.cycle.lock().await;
            cycle.generation += 1;
            let rx = match cycle.pending.as_mut() {
                Some(pending) => {
                    pending.action = action;
                    pending.result.subscribe()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    cycle.pending = Some(Pending { action, result: tx });
                    rx
                }
            };
            (cycle.generation, rx)
        };
        trace!(generation, "Debounced request queued");

        let cycle = Arc::clone(&self.cycle);
        let run = Arc::clone(&self.run);
        let quiet = self.quiet;
        tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let _running = run.lock().await;
            let pending = {
                let mut cycle = cycle.lock().await;
                if cycle.generation != generation {
                    return;
                }
                cycle.pending.take()
            };
            if let Some(Pending { action, result }) = pending {
                trace!(generation, "Running debounced action");
                let value = action().await;
                let _ = result.send(Some(value));
            }
        });

        let result = rx.wait_for(Option::is_some).await;
        result.ok().and_then(|value| (*value).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_once_with_latest_action() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(300)));
        let runs = Arc::new(AtomicUsize::new(0));

        let request = |value: u32| {
            let debouncer = Arc::clone(&debouncer);
            let runs = Arc::clone(&runs);
            async move {
                debouncer
                    .request(move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        value
                    })
                    .await
            }
        };

        let (a, b, c) = tokio::join!(request(1), request(2), request(3));

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!((a, b, c), (Some(3), Some(3), Some(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_run_separately() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let runs = Arc::new(AtomicUsize::new(0));

        for expected in 1..=2 {
            let counter = Arc::clone(&runs);
            let result = debouncer
                .request(move || async move { counter.fetch_add(1, Ordering::SeqCst) + 1 })
                .await;
            assert_eq!(result, Some(expected));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_during_run_waits_for_it() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(300)));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let started = tokio::time::Instant::now();

        let request = |value: u32| {
            let debouncer = Arc::clone(&debouncer);
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            async move {
                debouncer
                    .request(move || async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_in_flight.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(1000)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        value
                    })
                    .await
            }
        };

        let first = tokio::spawn(request(1));
        // The first run is in progress from 300ms to 1300ms.
        tokio::time::sleep(Duration::from_millis(400)).await;
        let second = request(2).await;

        assert_eq!(first.await.unwrap(), Some(1));
        assert_eq!(second, Some(2));
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() >= Duration::from_millis(2300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_during_quiet_period_delays_run() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(300)));
        let started = tokio::time::Instant::now();

        let first = tokio::spawn({
            let debouncer = Arc::clone(&debouncer);
            async move { debouncer.request(|| async { "first" }).await }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        let second = debouncer.request(|| async { "second" }).await;

        assert_eq!(second, Some("second"));
        assert_eq!(first.await.unwrap(), Some("second"));
        assert!(started.elapsed() >= Duration::from_millis(500));
    }
}
