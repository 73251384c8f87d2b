//! Registry of bundle coordinators keyed by entry path.
//!
//! Entries can be announced as *potential* (known, but no backend context
//! allocated) and are materialized into a [`Bundle`] on first `get`. Every
//! coordinator shares the registry's options, factory, log and event hub.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::task::JoinSet;

use crate::backend::{BackendFactory, BuildOptions};
use crate::bundle::{Artifact, Bundle, BundleEvent, EventKind, Events};
use crate::logger::Log;
use crate::sourcemap::SourceMap;
use crate::sync::Promise;

/// Read-only view of which keys have source maps, used by error translation.
pub trait SourceMapLookup: Send + Sync {
    /// Whether `key` is a known entry (materialized or potential).
    fn has(&self, key: &Path) -> bool;

    /// Map of the last successful build of `key`. `None` for entries that
    /// were never materialized. Never materializes anything.
    fn sourcemap(&self, key: &Path) -> Option<Arc<SourceMap>>;
}

/// Lazily populated map from entry path to coordinator.
pub struct BundlerMap<F: BackendFactory> {
    options: BuildOptions,
    factory: Arc<F>,
    log: Arc<dyn Log>,
    events: Events,
    entries: Mutex<Entries<F>>,
}

struct Entries<F: BackendFactory> {
    potentials: FxHashSet<PathBuf>,
    bundlers: FxHashMap<PathBuf, Bundle<F>>,
    /// Keys compiled from a different file (`a.test.ts` served as `a.test.js`)
    sources: FxHashMap<PathBuf, PathBuf>,
}

impl<F: BackendFactory> BundlerMap<F> {
    pub fn new(options: BuildOptions, factory: F, log: Arc<dyn Log>) -> Self {
        Self {
            options,
            factory: Arc::new(factory),
            log,
            events: Events::new(),
            entries: Mutex::new(Entries {
                potentials: FxHashSet::default(),
                bundlers: FxHashMap::default(),
                sources: FxHashMap::default(),
            }),
        }
    }

    /// Register `key` without allocating a backend. No-op if materialized.
    pub fn add_potential(&self, key: impl Into<PathBuf>) {
        let key = key.into();
        let mut entries = self.entries.lock();
        if !entries.bundlers.contains_key(&key) {
            entries.potentials.insert(key);
        }
    }

    /// Like [`add_potential`](Self::add_potential), but the entry is built
    /// from `source` while still being served under `key`.
    ///
    /// Only affects coordinators materialized afterwards.
    pub fn add_source(&self, key: impl Into<PathBuf>, source: impl Into<PathBuf>) {
        let (key, source) = (key.into(), source.into());
        let mut entries = self.entries.lock();
        if entries.bundlers.contains_key(&key) {
            return;
        }
        if source != key {
            entries.sources.insert(key.clone(), source);
        }
        entries.potentials.insert(key);
    }

    pub fn has(&self, key: &Path) -> bool {
        let entries = self.entries.lock();
        entries.bundlers.contains_key(key) || entries.potentials.contains(key)
    }

    /// The coordinator for `key`, created on first use.
    pub fn get(&self, key: &Path) -> Bundle<F> {
        let mut entries = self.entries.lock();
        if let Some(bundle) = entries.bundlers.get(key) {
            return bundle.clone();
        }

        let source = entries.sources.get(key).map_or(key, PathBuf::as_path);
        let bundle = Bundle::new(
            key.to_path_buf(),
            self.options.for_entry(source),
            Arc::clone(&self.factory),
            Arc::clone(&self.log),
            self.events.clone(),
        );
        entries.potentials.remove(key);
        entries.bundlers.insert(key.to_path_buf(), bundle.clone());
        bundle
    }

    /// Materialized coordinator for `key`, if any.
    pub fn bundle(&self, key: &Path) -> Option<Bundle<F>> {
        self.entries.lock().bundlers.get(key).cloned()
    }

    /// Build `key` if stale and return its newest artifact.
    pub fn read(&self, key: &Path) -> Promise<Artifact> {
        let bundle = self.get(key);
        if bundle.is_dirty() {
            bundle.write();
        }
        bundle.read()
    }

    /// Mark every materialized coordinator stale.
    pub fn dirty(&self) {
        for bundle in self.snapshot() {
            bundle.dirty();
        }
    }

    /// Stop every coordinator concurrently; returns once all are quiesced.
    pub async fn stop(&self) {
        let mut set = JoinSet::new();
        for bundle in self.snapshot() {
            set.spawn(async move { bundle.stop().await });
        }
        while let Some(result) = set.join_next().await {
            if let Err(e) = result {
                self.log.error(&format!("stopping bundle failed: {e}"));
            }
        }
    }

    /// Subscribe to lifecycle events of every coordinator.
    pub fn on<C>(&self, kind: EventKind, callback: C)
    where
        C: Fn(&BundleEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, callback);
    }

    /// Every known key, materialized or potential, sorted.
    pub fn keys(&self) -> Vec<PathBuf> {
        let entries = self.entries.lock();
        let mut keys: Vec<PathBuf> = entries
            .bundlers
            .keys()
            .chain(entries.potentials.iter())
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Number of materialized coordinators.
    pub fn len(&self) -> usize {
        self.entries.lock().bundlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clones of every coordinator, so no registry lock is held while they run.
    fn snapshot(&self) -> Vec<Bundle<F>> {
        self.entries.lock().bundlers.values().cloned().collect()
    }
}

impl<F: BackendFactory> SourceMapLookup for BundlerMap<F> {
    fn has(&self, key: &Path) -> bool {
        BundlerMap::has(self, key)
    }

    fn sourcemap(&self, key: &Path) -> Option<Arc<SourceMap>> {
        self.bundle(key).map(|bundle| bundle.sourcemap())
    }
}

impl<F: BackendFactory> SourceMapLookup for Bundle<F> {
    fn has(&self, key: &Path) -> bool {
        self.file() == key
    }

    fn sourcemap(&self, key: &Path) -> Option<Arc<SourceMap>> {
        (self.file() == key).then(|| Bundle::sourcemap(self))
    }
}
