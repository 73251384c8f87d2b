//! Trailing-window debouncer around a shared promise.
//!
//! Every `trigger()` inside the window resets the timer and returns the same
//! promise; one task invocation settles all of them.
//!
//! ```text
//! trigger ─┐  trigger ─┐   trigger ─┐
//!          ▼           ▼            ▼
//!     [reset]     [reset]      [reset] ── window ──▶ task() ──▶ settle all
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::{Deferred, Promise};
use crate::error::{Error, Result};

type TaskFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;
type Task<T> = Arc<dyn Fn() -> TaskFuture<T> + Send + Sync>;

/// Coalesces bursts of calls into a single task invocation.
///
/// Requires a tokio runtime: timers and task futures run on spawned tasks.
pub struct Debounce<T> {
    /// `None` means "run immediately" (negative window)
    window: Option<Duration>,
    task: Task<T>,
    state: Arc<Mutex<Cycle<T>>>,
}

struct Cycle<T> {
    deferred: Option<Deferred<T>>,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every reset; a timer only fires for its own epoch
    epoch: u64,
}

impl<T> Debounce<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a debouncer with a window in milliseconds.
    ///
    /// A negative window disables debouncing: `task` runs inside `trigger()`.
    pub fn new<F, Fut>(window_ms: i64, task: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let window = u64::try_from(window_ms).ok().map(Duration::from_millis);
        let task: Task<T> = Arc::new(move || Box::pin(task()) as TaskFuture<T>);
        Self {
            window,
            task,
            state: Arc::new(Mutex::new(Cycle {
                deferred: None,
                timer: None,
                epoch: 0,
            })),
        }
    }

    /// Reset the window and return the promise shared by this cycle.
    pub fn trigger(&self) -> Promise<T> {
        let Some(window) = self.window else {
            let deferred = Deferred::new();
            settle(deferred.clone(), (self.task)());
            return deferred.promise();
        };

        let mut cycle = self.state.lock();
        let deferred = cycle.deferred.get_or_insert_with(Deferred::new).clone();
        if let Some(timer) = cycle.timer.take() {
            timer.abort();
        }
        cycle.epoch += 1;

        let epoch = cycle.epoch;
        let state = Arc::clone(&self.state);
        let task = Arc::clone(&self.task);
        cycle.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let deferred = {
                let mut cycle = state.lock();
                if cycle.epoch != epoch {
                    return;
                }
                cycle.timer = None;
                cycle.deferred.take()
            };
            if let Some(deferred) = deferred {
                settle(deferred, task());
            }
        }));

        deferred.promise()
    }

    /// The promise of the open cycle, if any trigger is waiting.
    pub fn pending(&self) -> Option<Promise<T>> {
        self.state.lock().deferred.as_ref().map(Deferred::promise)
    }
}

impl<T> Drop for Debounce<T> {
    fn drop(&mut self) {
        if let Some(timer) = self.state.lock().timer.take() {
            timer.abort();
        }
    }
}

/// Drive `future` on its own task so a panic still settles `deferred`.
fn settle<T>(deferred: Deferred<T>, future: TaskFuture<T>)
where
    T: Clone + Send + Sync + 'static,
{
    let handle = tokio::spawn(future);
    tokio::spawn(async move {
        match handle.await {
            Ok(Ok(value)) => deferred.resolve(value),
            Ok(Err(error)) => deferred.reject(error),
            Err(_) => deferred.reject(Error::Task("debounced task panicked".into())),
        };
    });
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting(window_ms: i64) -> (Debounce<usize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let debounce = Debounce::new(window_ms, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(n) }
        });
        (debounce, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_call() {
        let (debounce, calls) = counting(100);

        let mut promises = Vec::new();
        for _ in 0..5 {
            promises.push(debounce.trigger());
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0, "window kept resetting");

        for promise in promises {
            assert_eq!(promise.wait().await, Ok(1));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_cycle_after_fire() {
        let (debounce, calls) = counting(50);

        assert_eq!(debounce.trigger().wait().await, Ok(1));
        assert!(debounce.pending().is_none());
        assert_eq!(debounce.trigger().wait().await, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_negative_window_runs_synchronously() {
        let (debounce, calls) = counting(-1);

        let promise = debounce.trigger();
        // Invoked inside trigger(), before any await
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(promise.wait().await, Ok(1));
        assert_eq!(debounce.trigger().wait().await, Ok(2));
        assert!(debounce.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_rejects_shared_promise_then_recovers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let debounce = Debounce::new(10, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(Error::task("first run fails"))
                } else {
                    Ok(n)
                }
            }
        });

        let a = debounce.trigger();
        let b = debounce.trigger();
        assert_eq!(a.wait().await, Err(Error::Task("first run fails".into())));
        assert_eq!(b.wait().await, Err(Error::Task("first run fails".into())));
        assert_eq!(debounce.trigger().wait().await, Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_exposes_open_cycle() {
        let (debounce, _calls) = counting(100);
        assert!(debounce.pending().is_none());
        let promise = debounce.trigger();
        let pending = debounce.pending().expect("cycle open");
        assert_eq!(pending.wait().await, promise.wait().await);
    }
}
