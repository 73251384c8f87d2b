//! Manually settled future shared by many observers.
//!
//! A [`Deferred`] is the producer side, a [`Promise`] the observer side.
//! Settlement is single-shot: the first `resolve`, `reject` or `forward`
//! wins. `forward` settles a deferred with *another* promise, so observers
//! keep waiting until that promise settles. This is how a stale build hands
//! its waiters over to the follow-up build without cancelling anything.
//!
//! Backed by a `tokio::sync::watch` channel, so late observers still see the
//! settled value and dropped producers are detected instead of hanging.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{Error, Result};

enum Slot<T> {
    Pending,
    Settled(Result<T>),
    Forwarded(Promise<T>),
}

/// Producer side of a shared future.
pub struct Deferred<T> {
    tx: Arc<watch::Sender<Slot<T>>>,
}

/// Observer side of a [`Deferred`]. Cheap to clone.
pub struct Promise<T> {
    rx: watch::Receiver<Slot<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T: Clone> Deferred<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Slot::Pending);
        Self { tx: Arc::new(tx) }
    }

    /// A new observer handle.
    pub fn promise(&self) -> Promise<T> {
        Promise {
            rx: self.tx.subscribe(),
        }
    }

    /// Settle with a value. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Slot::Settled(Ok(value)))
    }

    /// Settle with an error. Returns `false` if already settled.
    pub fn reject(&self, error: Error) -> bool {
        self.settle(Slot::Settled(Err(error)))
    }

    /// Settle with whatever `promise` eventually settles with.
    pub fn forward(&self, promise: Promise<T>) -> bool {
        self.settle(Slot::Forwarded(promise))
    }

    pub fn is_settled(&self) -> bool {
        !matches!(*self.tx.borrow(), Slot::Pending)
    }

    /// Whether `other` is a handle to the same deferred.
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }

    fn settle(&self, slot: Slot<T>) -> bool {
        self.tx.send_if_modified(move |current| {
            if matches!(current, Slot::Pending) {
                *current = slot;
                true
            } else {
                false
            }
        })
    }
}

impl<T: Clone> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Promise<T> {
    /// An already resolved promise.
    pub fn resolved(value: T) -> Self {
        let (_tx, rx) = watch::channel(Slot::Settled(Ok(value)));
        Self { rx }
    }

    /// An already rejected promise.
    pub fn rejected(error: Error) -> Self {
        let (_tx, rx) = watch::channel(Slot::Settled(Err(error)));
        Self { rx }
    }

    /// Wait for settlement, following forwarded promises to the end.
    pub async fn wait(self) -> Result<T> {
        let mut current = self;
        loop {
            let next = {
                let slot = current
                    .rx
                    .wait_for(|slot| !matches!(slot, Slot::Pending))
                    .await
                    .map_err(|_| Error::Abandoned)?;
                match &*slot {
                    Slot::Settled(result) => return result.clone(),
                    Slot::Forwarded(promise) => promise.clone(),
                    Slot::Pending => continue,
                }
            };
            current = next;
        }
    }

    /// Non-blocking peek. `None` while still pending.
    pub fn try_get(&self) -> Option<Result<T>> {
        let mut current = self.clone();
        loop {
            let next = match &*current.rx.borrow() {
                Slot::Pending => {
                    // Producer gone without settling
                    return current
                        .rx
                        .has_changed()
                        .is_err()
                        .then_some(Err(Error::Abandoned));
                }
                Slot::Settled(result) => return Some(result.clone()),
                Slot::Forwarded(promise) => promise.clone(),
            };
            current = next;
        }
    }

    pub fn is_settled(&self) -> bool {
        self.try_get().is_some()
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = matches!(*self.tx.borrow(), Slot::Pending);
        f.debug_struct("Deferred").field("pending", &pending).finish()
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = matches!(*self.rx.borrow(), Slot::Pending);
        f.debug_struct("Promise").field("pending", &pending).finish()
    }
}
