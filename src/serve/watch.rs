//! File watcher driving session refreshes.
//!
//! ```text
//! notify ──(crossbeam)──▶ bridge thread ──(tokio mpsc)──▶ filter ──▶ Debounce(100ms) ──▶ refresh()
//!                             ▲
//!                 Ctrl+C ─────┘ shutdown: stop forwarding
//! ```
//!
//! The watcher starts before the initial refresh, so changes made while the
//! first bundles build are not lost.

use std::path::Path;
use std::sync::Arc;

use crossbeam::channel::{self, Receiver};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::backend::BackendFactory;
use crate::config::BundleConfig;
use crate::error::Error;
use crate::logger::{status_error, status_success};
use crate::sync::{Debounce, Promise};
use crate::{debug, log};

use super::session::{RefreshReport, Session};

/// Quiet period after the last change before rebundling.
pub const WATCH_DEBOUNCE_MS: i64 = 100;

/// Keeps the underlying watcher alive. Dropping it stops watching.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

/// Watch the session's base path on `runtime` until `shutdown` fires.
pub fn watch<F: BackendFactory>(
    session: Arc<Session<F>>,
    runtime: &Handle,
    shutdown: Receiver<()>,
) -> notify::Result<FileWatcher> {
    let (notify_tx, notify_rx) = channel::unbounded();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = notify_tx.send(res);
    })?;
    watcher.watch(&session.settings().base_path, RecursiveMode::Recursive)?;

    let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);

    // notify is sync-only: forward events into the runtime
    std::thread::spawn(move || {
        loop {
            channel::select! {
                recv(notify_rx) -> result => match result {
                    Ok(Ok(event)) => {
                        if async_tx.blocking_send(event).is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Ok(Err(e)) => log!("watch"; "notify error: {}", e),
                    Err(_) => break,
                },
                recv(shutdown) -> _ => {
                    debug!("watch"; "shutdown, no longer forwarding changes");
                    break;
                }
            }
        }
    });

    runtime.spawn(async move {
        let refresh = {
            let session = Arc::clone(&session);
            Debounce::new(WATCH_DEBOUNCE_MS, move || {
                let session = Arc::clone(&session);
                async move { Ok(session.refresh().await) }
            })
        };

        while let Some(event) = async_rx.recv().await {
            if session.is_stopped() {
                break;
            }
            if !is_relevant(&event, session.settings()) {
                continue;
            }
            debug!("watch"; "{:?} {:?}", event.kind, event.paths);

            // Report once per cycle, not once per event
            let fresh = refresh.pending().is_none();
            let promise = refresh.trigger();
            if fresh {
                tokio::spawn(report(promise));
            }
        }
    });

    Ok(FileWatcher { _watcher: watcher })
}

/// Whether `event` should rebundle: a create or content change of a file
/// that is neither ignored nor an editor temp file.
pub fn is_relevant(event: &notify::Event, settings: &BundleConfig) -> bool {
    let changed = match event.kind {
        EventKind::Create(_) => true,
        EventKind::Modify(modify) => !matches!(modify, notify::event::ModifyKind::Metadata(_)),
        _ => false,
    };

    changed
        && event
            .paths
            .iter()
            .any(|path| !is_temp_file(path) && !settings.is_ignored(path))
}

fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bak" | "swp" | "swo" | "tmp") || name.ends_with('~')
}

async fn report(promise: Promise<RefreshReport>) {
    match promise.wait().await {
        Ok(report) if report.failed.is_empty() => {
            status_success(&format!("rebundled {} test files", report.files));
        }
        Ok(report) => {
            let detail = report
                .failed
                .iter()
                .map(|key| format!("  {}", key.display()))
                .collect::<Vec<_>>()
                .join("\n");
            status_error(
                &format!("{} of {} bundles failed", report.failed.len(), report.files),
                &detail,
            );
        }
        Err(Error::Stopped) => {}
        Err(e) => status_error("rebundle failed", &e.to_string()),
    }
}
