//! Test session: turns test files into served bundles.
//!
//! Two modes, picked by `bundle.single_bundle`:
//!
//! ```text
//! single:    a.test.ts ─┐
//!            b.test.ts ─┼─▶ entry point ──(debounce)──▶ one bundle
//!            c.test.ts ─┘
//!
//! per-file:  a.test.ts ──▶ bundle served as a.test.js
//!            b.test.ts ──▶ bundle served as b.test.js
//! ```
//!
//! The session owns the registry, the entry point, the cache of artifacts
//! already handed to the HTTP server and the error formatter. After
//! [`Session::stop`] every entry is refused.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tokio::task::JoinSet;

use crate::backend::{BackendFactory, BuildOptions, Format};
use crate::bundle::{Artifact, BundleEvent, EventKind};
use crate::cache::KeyedCache;
use crate::config::BundleConfig;
use crate::entry::TestEntryPoint;
use crate::error::{Error, Result};
use crate::format_error::{ErrorFormatter, create_format_error};
use crate::logger::{Log, format_time};
use crate::registry::{BundlerMap, SourceMapLookup};
use crate::sync::Debounce;
use crate::utils::path::{absolutize, fs::with_js_extension};
use crate::debug;

use super::path::localize_urls;
use super::scan::scan_tests;

/// Outcome of a [`Session::refresh`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    /// Test files found under the base path
    pub files: usize,
    /// Bundles that came back as failure placeholders
    pub failed: Vec<PathBuf>,
}

/// Host of a registry for one test run.
pub struct Session<F: BackendFactory> {
    settings: BundleConfig,
    format: Format,
    registry: Arc<BundlerMap<F>>,
    entry: Arc<Mutex<TestEntryPoint>>,
    /// Debounced single-bundle build; `None` in per-file mode
    single: Option<Debounce<Artifact>>,
    served: KeyedCache<PathBuf, Artifact>,
    formatter: ErrorFormatter,
    /// Keys included by the runner page
    scripts: Mutex<BTreeSet<PathBuf>>,
    stopped: Arc<AtomicBool>,
    log: Arc<dyn Log>,
}

impl<F: BackendFactory> Session<F> {
    /// Session with its entry point in the system temp dir.
    ///
    /// `settings` must be normalized (absolute paths).
    pub fn new(
        settings: BundleConfig,
        options: BuildOptions,
        factory: F,
        log: Arc<dyn Log>,
    ) -> io::Result<Arc<Self>> {
        Self::with_entry(settings, options, factory, log, TestEntryPoint::new()?)
    }

    pub fn with_entry(
        settings: BundleConfig,
        options: BuildOptions,
        factory: F,
        log: Arc<dyn Log>,
        entry: TestEntryPoint,
    ) -> io::Result<Arc<Self>> {
        let format = options.format;
        let registry = Arc::new(BundlerMap::new(options, factory, Arc::clone(&log)));
        let stopped = Arc::new(AtomicBool::new(false));

        let mut scripts = BTreeSet::new();
        if settings.single_bundle {
            // Exists before the first build, so the runner page can include it
            entry.touch()?;
            registry.add_potential(entry.file());
            scripts.insert(entry.file().to_path_buf());
        }

        let entry = Arc::new(Mutex::new(entry));
        let single = settings.single_bundle.then(|| {
            single_bundle_build(
                settings.bundle_delay,
                Arc::clone(&registry),
                Arc::clone(&entry),
                Arc::clone(&stopped),
            )
        });

        log_lifecycle(&registry, settings.single_bundle, Arc::clone(&log));

        let lookup: Arc<dyn SourceMapLookup> = registry.clone();
        let formatter = create_format_error(lookup, settings.base_path.clone(), None);

        Ok(Arc::new(Self {
            settings,
            format,
            registry,
            entry,
            single,
            served: KeyedCache::new(),
            formatter,
            scripts: Mutex::new(scripts),
            stopped,
            log,
        }))
    }

    pub fn registry(&self) -> &Arc<BundlerMap<F>> {
        &self.registry
    }

    pub fn settings(&self) -> &BundleConfig {
        &self.settings
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Whether every test goes into the one entry-point bundle.
    pub fn is_single(&self) -> bool {
        self.single.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Register a test file and wait for a bundle that includes it.
    ///
    /// Single mode adds it to the entry point and waits for the debounced
    /// bundle. Per-file mode builds it as its own entry, served under the
    /// same path with a `.js` extension.
    pub async fn preprocess(&self, file: &Path) -> Result<Artifact> {
        if self.is_stopped() {
            return Err(Error::Stopped);
        }

        let source = absolutize(file, &self.settings.base_path);
        match &self.single {
            Some(single) => {
                // On disk before dirty(): a stale build starts its follow-up
                // as soon as it finishes, without waiting for the debounce
                let key = {
                    let mut entry = self.entry.lock();
                    entry.add_file(&source);
                    entry.write().map_err(Error::task)?;
                    entry.file().to_path_buf()
                };
                self.registry.get(&key).dirty();
                let artifact = single.trigger().wait().await?;
                self.served.set(key, artifact.clone());
                Ok(artifact)
            }
            None => {
                let key = with_js_extension(&source);
                self.registry.add_source(&key, &source);
                self.registry.get(&key).dirty();
                self.scripts.lock().insert(key.clone());
                let artifact = self.registry.read(&key).wait().await?;
                self.served.set(key, artifact.clone());
                Ok(artifact)
            }
        }
    }

    /// Rescan the base path and preprocess every test file.
    pub async fn refresh(self: &Arc<Self>) -> RefreshReport {
        if self.is_stopped() {
            return RefreshReport::default();
        }

        self.served.clear();
        let files = scan_tests(&self.settings);
        debug!("bundle"; "refreshing {} test files", files.len());

        let mut set = JoinSet::new();
        for file in &files {
            let session = Arc::clone(self);
            let file = file.clone();
            set.spawn(async move {
                let outcome = session.preprocess(&file).await;
                (file, outcome)
            });
        }

        let mut failed = FxHashSet::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(artifact))) if !artifact.is_placeholder() => {}
                Ok((file, Ok(_))) => {
                    failed.insert(self.bundle_key(&file));
                }
                Ok((file, Err(Error::Stopped))) => {
                    debug!("bundle"; "session stopped before {}", file.display());
                }
                Ok((file, Err(e))) => {
                    self.log.error(&format!("{}: {e}", file.display()));
                    // Requests waiting on this bundle get the failure
                    let key = self.bundle_key(&file);
                    self.served.set(key.clone(), Artifact::placeholder(&e.to_string()));
                    failed.insert(key);
                }
                Err(e) => self.log.error(&format!("refresh task failed: {e}")),
            }
        }

        let mut failed: Vec<PathBuf> = failed.into_iter().collect();
        failed.sort();
        RefreshReport {
            files: files.len(),
            failed,
        }
    }

    /// Artifact last handed out for `key`, or `None` if it is not a known
    /// bundle.
    ///
    /// Waits for the next [`preprocess`](Self::preprocess) of `key` when none
    /// has finished yet, and again when a refresh clears the cache meanwhile.
    pub async fn artifact(&self, key: &Path) -> Result<Option<Artifact>> {
        if !self.registry.has(key) {
            return Ok(None);
        }

        let cache_key = key.to_path_buf();
        loop {
            if self.is_stopped() {
                // Never materialize anything after stop
                return match self.registry.bundle(key) {
                    Some(bundle) => bundle.read().wait().await.map(Some),
                    None => Ok(None),
                };
            }
            match self.served.get(&cache_key).wait().await {
                Ok(artifact) => return Ok(Some(artifact)),
                Err(e) if e.is_retryable() => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Bundles the runner page includes, in path order.
    pub fn scripts(&self) -> Vec<PathBuf> {
        self.scripts.lock().iter().cloned().collect()
    }

    /// Rewrite bundle locations in `message` to original sources.
    ///
    /// Bundle URLs from browser stack traces are mapped to keys first.
    pub fn format_error(&self, message: &str) -> String {
        self.formatter.format(&localize_urls(message, &self.settings.base_path))
    }

    /// Log an error the runner page caught in the browser.
    pub fn report_error(&self, message: &str) {
        self.log.error(self.format_error(message).trim_end());
    }

    /// Refuse new work, quiesce every bundle, then remove the entry point.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        // Wake requests waiting on the cache; they fall back to the registry
        self.served.clear();
        self.registry.stop().await;
        if let Err(e) = self.entry.lock().remove() {
            self.log.error(&format!("removing entry point failed: {e}"));
        }
    }

    /// Key under which `file` is served.
    fn bundle_key(&self, file: &Path) -> PathBuf {
        if self.is_single() {
            self.entry.lock().file().to_path_buf()
        } else {
            with_js_extension(&absolutize(file, &self.settings.base_path))
        }
    }
}

/// Debounced build of the entry point. `preprocess` keeps the file current.
fn single_bundle_build<F: BackendFactory>(
    delay: i64,
    registry: Arc<BundlerMap<F>>,
    entry: Arc<Mutex<TestEntryPoint>>,
    stopped: Arc<AtomicBool>,
) -> Debounce<Artifact> {
    Debounce::new(delay, move || {
        let registry = Arc::clone(&registry);
        let entry = Arc::clone(&entry);
        let stopped = Arc::clone(&stopped);
        async move {
            if stopped.load(Ordering::SeqCst) {
                return Err(Error::Stopped);
            }
            let key = entry.lock().file().to_path_buf();
            registry.get(&key).write().wait().await
        }
    })
}

/// Bundles between the first `start` and the matching `done`.
#[derive(Default)]
struct Batch {
    pending: FxHashSet<PathBuf>,
    start: u64,
}

/// `Compiling...` / `Compiling done (..)` lines from lifecycle events.
fn log_lifecycle<F: BackendFactory>(registry: &BundlerMap<F>, single: bool, log: Arc<dyn Log>) {
    let batch = Arc::new(Mutex::new(Batch::default()));

    registry.on(EventKind::Start, {
        let batch = Arc::clone(&batch);
        let log = Arc::clone(&log);
        move |event| {
            let BundleEvent::Start { file, time } = event else {
                return;
            };
            let message = {
                let mut batch = batch.lock();
                let message = if single {
                    batch.start = *time;
                    Some(format!("Compiling to {}...", file.display()))
                } else if batch.pending.is_empty() {
                    batch.start = *time;
                    Some("Compiling...".to_owned())
                } else {
                    None
                };
                batch.pending.insert(file.clone());
                message
            };
            if let Some(message) = message {
                log.info(&message);
            }
        }
    });

    registry.on(EventKind::Done, {
        let batch = Arc::clone(&batch);
        move |event| {
            let BundleEvent::Done { file, end, .. } = event else {
                return;
            };
            let message = {
                let mut batch = batch.lock();
                batch.pending.remove(file);
                (single || batch.pending.is_empty()).then(|| {
                    format!("Compiling done ({})", format_time(end.saturating_sub(batch.start)))
                })
            };
            if let Some(message) = message {
                log.info(&message);
            }
        }
    });

    registry.on(EventKind::Stop, move |_| batch.lock().pending.clear());
}
