//! In-memory backend for coordinator tests.
//!
//! Builds block on a semaphore until the test releases them, so tests can
//! interleave `dirty()` / `write()` with a build that is still running.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use super::{Backend, BackendFactory, BuildFailure, BuildOptions, OutputFile};

#[derive(Debug, Clone)]
pub(crate) enum Mode {
    Ok,
    Fail(String),
    Panic,
    /// Only the code file, no map
    Single,
    BadMap,
}

pub(crate) struct Shared {
    gate: Semaphore,
    pub calls: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub contexts: AtomicUsize,
    pub disposed: AtomicUsize,
    /// Entry file contents as each rebuild saw them
    inputs: Mutex<Vec<String>>,
    mode: Mutex<Mode>,
}

#[derive(Clone)]
pub(crate) struct FakeFactory {
    pub shared: Arc<Shared>,
}

impl FakeFactory {
    /// Builds wait for [`FakeFactory::release`].
    pub fn gated() -> Self {
        Self::with_permits(0)
    }

    /// Builds complete immediately.
    pub fn open() -> Self {
        Self::with_permits(Semaphore::MAX_PERMITS / 2)
    }

    fn with_permits(permits: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                gate: Semaphore::new(permits),
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                contexts: AtomicUsize::new(0),
                disposed: AtomicUsize::new(0),
                inputs: Mutex::new(Vec::new()),
                mode: Mutex::new(Mode::Ok),
            }),
        }
    }

    /// Let `n` waiting (or future) builds finish.
    pub fn release(&self, n: usize) {
        self.shared.gate.add_permits(n);
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.shared.mode.lock() = mode;
    }

    pub fn calls(&self) -> usize {
        self.shared.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.shared.max_active.load(Ordering::SeqCst)
    }

    pub fn contexts(&self) -> usize {
        self.shared.contexts.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> usize {
        self.shared.disposed.load(Ordering::SeqCst)
    }

    /// What each rebuild read from its entry file, in call order.
    pub fn inputs(&self) -> Vec<String> {
        self.shared.inputs.lock().clone()
    }
}

pub(crate) struct FakeBackend {
    shared: Arc<Shared>,
    entry: String,
    path: Option<PathBuf>,
}

impl BackendFactory for FakeFactory {
    type Backend = FakeBackend;

    async fn context(&self, options: &BuildOptions) -> Result<FakeBackend, BuildFailure> {
        self.shared.contexts.fetch_add(1, Ordering::SeqCst);
        let path = match &options.entry {
            Some(super::BuildInput::Path(path)) => Some(path.clone()),
            _ => None,
        };
        Ok(FakeBackend {
            shared: Arc::clone(&self.shared),
            entry: path.as_ref().map_or_else(|| "stdin".into(), |p| p.display().to_string()),
            path,
        })
    }
}

impl Backend for FakeBackend {
    async fn rebuild(&mut self) -> Result<Vec<OutputFile>, BuildFailure> {
        let n = self.shared.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let active = self.shared.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_active.fetch_max(active, Ordering::SeqCst);
        if let Some(path) = &self.path {
            let input = std::fs::read_to_string(path).unwrap_or_default();
            self.shared.inputs.lock().push(input);
        }

        if let Ok(permit) = self.shared.gate.acquire().await {
            permit.forget();
        }
        self.shared.active.fetch_sub(1, Ordering::SeqCst);

        let code = OutputFile::new("/out/entry.js", format!("build {n} of {}", self.entry));
        let mode = self.shared.mode.lock().clone();
        match mode {
            Mode::Ok => Ok(vec![
                OutputFile::new(
                    "/out/entry.js.map",
                    r#"{"version":3,"sources":["../src/entry.ts"],"mappings":"AAAA"}"#,
                ),
                code,
            ]),
            Mode::Fail(message) => Err(BuildFailure::Message(message)),
            Mode::Panic => panic!("backend exploded"),
            Mode::Single => Ok(vec![code]),
            Mode::BadMap => Ok(vec![OutputFile::new(PathBuf::from("/out/entry.js.map"), "not json"), code]),
        }
    }

    async fn dispose(&mut self) {
        self.shared.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Yield to spawned tasks until `cond` holds.
pub(crate) async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..10_000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
