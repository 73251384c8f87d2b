//! Per-entry build coordinator.
//!
//! A [`Bundle`] tracks whether its entry is stale and guarantees that at
//! most one backend build runs at a time, however often it is invalidated.
//! Readers get a promise that settles with the newest artifact: a build
//! that finishes after another `dirty()` never reaches them, its waiters
//! are forwarded to the follow-up build instead.
//!
//! ```text
//!            dirty()                  write()
//!   Clean ───────────▶ Dirty ────────────────────▶ Building
//!     ▲                  ▲                            │  │ dirty()
//!     │   same generation│ stale: forward + rebuild   │  ▼
//!     └──────────────────┼────────────────────── BuildingDirty
//!                        └────────────────────────────┘
//! ```
//!
//! A fresh coordinator starts `Dirty`: nothing has been built yet.

mod artifact;
mod events;
#[cfg(test)]
mod tests;

pub use artifact::Artifact;
pub use events::{BundleEvent, EventKind, Events};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{Backend, BackendFactory, BuildFailure, BuildOptions, OutputFile};
use crate::debug;
use crate::logger::Log;
use crate::sourcemap::SourceMap;
use crate::sync::{Deferred, Promise};

/// Observable coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleState {
    Clean,
    Dirty,
    Building,
    /// Invalidated while a build was running; the result will be discarded.
    BuildingDirty,
    Stopped,
}

/// Build coordinator for one entry. Cheap to clone; clones share state.
pub struct Bundle<F: BackendFactory> {
    inner: Arc<Inner<F>>,
}

impl<F: BackendFactory> Clone for Bundle<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<F: BackendFactory> {
    file: PathBuf,
    options: BuildOptions,
    factory: Arc<F>,
    log: Arc<dyn Log>,
    events: Events,
    state: Mutex<State>,
    /// Created on the first build, disposed once by `stop()`
    context: tokio::sync::Mutex<Option<F::Backend>>,
}

struct State {
    dirty: bool,
    in_flight: bool,
    /// Bumped whenever `dirty()` opens a new pending future
    generation: u64,
    pending: Deferred<Artifact>,
    /// Active build attempts
    builds: usize,
    /// Start time of the open batch; a batch spans stale rebuilds
    batch_start: Option<u64>,
    /// Map of the last successful build, for error translation
    sourcemap: Arc<SourceMap>,
    /// Completion of the first `stop()` call
    stopping: Option<Deferred<()>>,
    stopped: bool,
}

/// What a finished build attempt produced.
struct Built {
    artifact: Artifact,
    /// Backend output was unpacked, as opposed to a placeholder
    succeeded: bool,
}

impl<F: BackendFactory> Bundle<F> {
    /// Coordinator for `file`. `options` must already name the entry.
    pub fn new(
        file: PathBuf,
        options: BuildOptions,
        factory: Arc<F>,
        log: Arc<dyn Log>,
        events: Events,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                file,
                options,
                factory,
                log,
                events,
                state: Mutex::new(State {
                    dirty: true,
                    in_flight: false,
                    generation: 0,
                    pending: Deferred::new(),
                    builds: 0,
                    batch_start: None,
                    sourcemap: Arc::new(SourceMap::empty()),
                    stopping: None,
                    stopped: false,
                }),
                context: tokio::sync::Mutex::new(None),
            }),
        }
    }

    pub fn file(&self) -> &Path {
        &self.inner.file
    }

    /// Mark the current artifact stale.
    ///
    /// Opens a new pending future unless one is already open. Ignored once
    /// `stop()` has been called.
    pub fn dirty(&self) {
        let mut state = self.inner.state.lock();
        if state.stopping.is_some() {
            debug!("bundle"; "ignoring dirty() on stopped {}", self.inner.file.display());
            return;
        }
        if state.dirty {
            return;
        }
        state.dirty = true;
        state.generation += 1;
        state.pending = Deferred::new();
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().dirty
    }

    /// Start a build if the entry is stale and none is running.
    ///
    /// Always returns the current pending promise. While a build is running
    /// this never issues another one: a stale result triggers the follow-up
    /// build itself.
    pub fn write(&self) -> Promise<Artifact> {
        let mut state = self.inner.state.lock();
        if state.stopping.is_some() {
            debug!("bundle"; "ignoring write() on stopped {}", self.inner.file.display());
        } else if state.dirty && !state.in_flight {
            Inner::start(&self.inner, &mut state);
        }
        state.pending.promise()
    }

    /// Promise of the newest artifact. Settled once a build has caught up
    /// with every `dirty()` issued so far.
    pub fn read(&self) -> Promise<Artifact> {
        self.inner.state.lock().pending.promise()
    }

    pub fn state(&self) -> BundleState {
        let state = self.inner.state.lock();
        match (state.stopped, state.in_flight, state.dirty) {
            (true, _, _) => BundleState::Stopped,
            (false, true, true) => BundleState::BuildingDirty,
            (false, true, false) => BundleState::Building,
            (false, false, true) => BundleState::Dirty,
            (false, false, false) => BundleState::Clean,
        }
    }

    /// Number of build attempts currently running (0 or 1).
    pub fn builds(&self) -> usize {
        self.inner.state.lock().builds
    }

    /// Source map of the last successful build.
    pub fn sourcemap(&self) -> Arc<SourceMap> {
        Arc::clone(&self.inner.state.lock().sourcemap)
    }

    /// Wait for outstanding work, then release the backend.
    ///
    /// Concurrent and repeated calls all wait for the same completion; the
    /// backend is disposed exactly once.
    pub async fn stop(&self) {
        let (completion, owner) = {
            let mut state = self.inner.state.lock();
            match &state.stopping {
                Some(done) => (done.promise(), false),
                None => {
                    let done = Deferred::new();
                    state.stopping = Some(done.clone());
                    // Nobody else will build an entry that is owed a build now
                    if state.dirty && !state.in_flight {
                        Inner::start(&self.inner, &mut state);
                    }
                    (done.promise(), true)
                }
            }
        };

        if owner {
            self.inner.quiesce().await;
        } else {
            let _ = completion.wait().await;
        }
    }
}

impl<F: BackendFactory> Inner<F> {
    /// Transition to `Building` and spawn the build. Caller holds the lock.
    fn start(this: &Arc<Self>, state: &mut State) {
        state.dirty = false;
        state.in_flight = true;
        state.builds += 1;

        let start_event = match state.batch_start {
            Some(_) => None,
            None => {
                let time = events::now_ms();
                state.batch_start = Some(time);
                Some(BundleEvent::Start {
                    file: this.file.clone(),
                    time,
                })
            }
        };

        let generation = state.generation;
        let deferred = state.pending.clone();
        let inner = Arc::clone(this);
        tokio::spawn(async move {
            // Emitted here so `start` always precedes `done`
            if let Some(event) = start_event {
                inner.events.emit(&event);
            }
            let built = inner.build().await;
            inner.complete(generation, deferred, built);
        });
    }

    /// Settle one build attempt against the generation it started under.
    fn complete(self: &Arc<Self>, generation: u64, deferred: Deferred<Artifact>, built: Built) {
        let done_event = {
            let mut state = self.state.lock();
            state.builds -= 1;
            state.in_flight = false;
            if built.succeeded {
                state.sourcemap = Arc::clone(&built.artifact.map);
            }

            if state.generation == generation {
                let start = state.batch_start.take().unwrap_or_else(events::now_ms);
                Some(BundleEvent::Done {
                    file: self.file.clone(),
                    start,
                    end: events::now_ms(),
                })
            } else {
                // Stale: hand the waiters to the newest build and issue it
                debug!("bundle"; "discarding stale build of {}", self.file.display());
                deferred.forward(state.pending.promise());
                if state.dirty {
                    Self::start(self, &mut state);
                }
                None
            }
        };

        if let Some(event) = done_event {
            self.events.emit(&event);
            deferred.resolve(built.artifact);
        }
    }

    /// Run the backend on its own task so a panic becomes a placeholder.
    async fn build(self: &Arc<Self>) -> Built {
        let inner = Arc::clone(self);
        let outcome = tokio::spawn(async move { inner.rebuild().await }).await;

        let failure = match outcome {
            Ok(Ok(outputs)) if outputs.len() < 2 => {
                return Built {
                    artifact: Artifact::placeholder("No output files."),
                    succeeded: false,
                };
            }
            Ok(Ok(outputs)) => match artifact::unpack(&self.file, outputs) {
                Ok(artifact) => {
                    return Built {
                        artifact,
                        succeeded: true,
                    };
                }
                Err(failure) => failure.to_string(),
            },
            Ok(Err(failure)) => failure.to_string(),
            Err(_) => "build panicked".to_owned(),
        };

        self.log.error(&failure);
        Built {
            artifact: Artifact::placeholder(&failure),
            succeeded: false,
        }
    }

    async fn rebuild(&self) -> Result<Vec<OutputFile>, BuildFailure> {
        let mut context = self.context.lock().await;
        if context.is_none() {
            *context = Some(self.factory.context(&self.options).await?);
        }
        match context.as_mut() {
            Some(backend) => backend.rebuild().await,
            None => Err(BuildFailure::Message("build context unavailable".into())),
        }
    }

    /// Second half of `stop()`, run by the first caller only.
    async fn quiesce(&self) {
        // dirty() is ignored from here on, so the pending promise is final
        let pending = self.state.lock().pending.promise();
        let _ = pending.wait().await;

        if let Some(mut backend) = self.context.lock().await.take() {
            backend.dispose().await;
        }

        let completion = {
            let mut state = self.state.lock();
            state.stopped = true;
            state.stopping.clone()
        };

        self.events.emit(&BundleEvent::Stop {
            file: self.file.clone(),
        });
        if let Some(done) = completion {
            done.resolve(());
        }
    }
}
