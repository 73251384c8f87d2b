//! Ctrl+C handling for both commands.
//!
//! ```text
//! Ctrl+C (1st) ── nothing registered ──▶ exit(0)
//!              └─ server registered ───▶ stop watcher, unblock request loop
//! Ctrl+C (2nd) ────────────────────────▶ exit(130)
//! ```
//!
//! After the request loop returns, `main` stops the session, which removes
//! the entry point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crossbeam::channel::Sender;
use tiny_http::Server;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Parts of a running `serve` the handler has to wake.
struct Serving {
    server: Arc<Server>,
    stop_watcher: Sender<()>,
}

static SERVING: OnceLock<Serving> = OnceLock::new();

/// Install the Ctrl+C handler. Call once, before anything blocks.
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(on_interrupt)
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))
}

fn on_interrupt() {
    if INTERRUPTED.swap(true, Ordering::SeqCst) {
        std::process::exit(130);
    }

    let Some(serving) = SERVING.get() else {
        std::process::exit(0);
    };
    crate::log!("serve"; "shutting down...");
    // The watcher may already be gone
    let _ = serving.stop_watcher.send(());
    serving.server.unblock();
}

/// Hand the bound server to the handler. Only the first registration counts.
pub fn register_server(server: Arc<Server>, stop_watcher: Sender<()>) {
    let _ = SERVING.set(Serving { server, stop_watcher });
}

/// Whether Ctrl+C has been pressed.
pub fn is_shutdown() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}
