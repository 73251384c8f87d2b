//! Build lifecycle notifications.
//!
//! One [`Events`] hub is shared by every coordinator of a registry.
//! Callbacks run on the task that produced the event, never under a
//! coordinator lock.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleEvent {
    /// First build of a batch started (ms since epoch).
    Start { file: PathBuf, time: u64 },
    /// The batch delivered a fresh artifact.
    Done { file: PathBuf, start: u64, end: u64 },
    /// The coordinator quiesced and released its backend.
    Stop { file: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Done,
    Stop,
}

impl BundleEvent {
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Start { .. } => EventKind::Start,
            Self::Done { .. } => EventKind::Done,
            Self::Stop { .. } => EventKind::Stop,
        }
    }
}

type Callback = Arc<dyn Fn(&BundleEvent) + Send + Sync>;

/// Subscriber list for [`BundleEvent`]s.
#[derive(Clone, Default)]
pub struct Events {
    listeners: Arc<Mutex<Vec<(EventKind, Callback)>>>,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` for every future event of `kind`.
    pub fn on<F>(&self, kind: EventKind, callback: F)
    where
        F: Fn(&BundleEvent) + Send + Sync + 'static,
    {
        self.listeners.lock().push((kind, Arc::new(callback)));
    }

    pub(crate) fn emit(&self, event: &BundleEvent) {
        let kind = event.kind();
        // Snapshot so callbacks may subscribe without deadlocking
        let matching: Vec<Callback> = self
            .listeners
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in matching {
            callback(event);
        }
    }
}

impl std::fmt::Debug for Events {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Events")
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
