//! Test server: serves bundles on demand and rebundles on change.
//!
//! ```text
//! GET /                      → runner page, one <script> per bundle
//! GET /base/<rel>[.map]      → bundle under the base path
//! GET /absolute/<abs>[.map]  → bundle anywhere else (the entry point)
//! POST /error                → browser error, logged with original locations
//! anything else              → 404
//! ```

pub mod lifecycle;
mod path;
mod response;
mod scan;
pub mod session;
pub mod watch;

pub use path::{Target, resolve_key, url_for};
pub use scan::scan_tests;
pub use session::{RefreshReport, Session};

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam::channel::{self, Receiver};
use tiny_http::{Method, Request, Server};
use tokio::runtime::Handle;

use crate::backend::BackendFactory;
use crate::bundle::Artifact;
use crate::config::ServeConfig;
use crate::error::Error;
use crate::logger::{status_error, status_success};
use crate::utils::path::route::strip_query;
use crate::{debug, log};

/// Request handler threads; builds block a handler, not the accept loop.
const REQUEST_THREADS: usize = 4;

/// Where the runner page posts uncaught errors.
pub const ERROR_ROUTE: &str = "/error";

/// Larger error reports are truncated.
const MAX_ERROR_REPORT: u64 = 64 * 1024;

/// Bound server ready to accept requests
pub struct BoundServer<F: BackendFactory> {
    server: Arc<Server>,
    addr: SocketAddr,
    session: Arc<Session<F>>,
    runtime: Handle,
    watch: bool,
    shutdown_rx: Receiver<()>,
}

/// Bind the HTTP server without starting the request loop.
///
/// Registers it with the Ctrl+C handler, so a shutdown unblocks the loop.
pub fn bind_server<F: BackendFactory>(
    config: &ServeConfig,
    session: Arc<Session<F>>,
    runtime: Handle,
) -> Result<BoundServer<F>> {
    let (server, addr) = lifecycle::bind_with_retry(config.interface, config.port)?;
    let server = Arc::new(server);

    let (shutdown_tx, shutdown_rx) = channel::unbounded::<()>();
    crate::core::register_server(Arc::clone(&server), shutdown_tx);

    log!("serve"; "http://{}", addr);

    Ok(BoundServer {
        server,
        addr,
        session,
        runtime,
        watch: config.watch,
        shutdown_rx,
    })
}

impl<F: BackendFactory> BoundServer<F> {
    /// Get the bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start watching, run the initial refresh in the background, then
    /// serve until shutdown (blocking).
    pub fn run(self) -> Result<()> {
        let watcher = if self.watch {
            let base = self.session.settings().base_path.display().to_string();
            let watcher = watch::watch(Arc::clone(&self.session), &self.runtime, self.shutdown_rx.clone())
                .with_context(|| format!("Failed to watch {base}"))?;
            debug!("watch"; "watching {}", base);
            Some(watcher)
        } else {
            None
        };

        let session = Arc::clone(&self.session);
        self.runtime.spawn(async move {
            let report = session.refresh().await;
            if report.failed.is_empty() {
                status_success(&format!("bundled {} test files", report.files));
            } else {
                status_error(
                    &format!("{} of {} bundles failed", report.failed.len(), report.files),
                    "",
                );
            }
        });

        run_request_loop(&self.server, &self.session, &self.runtime)?;
        drop(watcher);
        Ok(())
    }
}

fn run_request_loop<F: BackendFactory>(
    server: &Server,
    session: &Arc<Session<F>>,
    runtime: &Handle,
) -> Result<()> {
    // Requests may wait for a build; a pool keeps other requests moving
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(REQUEST_THREADS)
        .build()
        .context("failed to create request thread pool")?;

    for request in server.incoming_requests() {
        let session = Arc::clone(session);
        let runtime = runtime.clone();
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &session, &runtime) {
                log!("serve"; "request error: {e}");
            }
        });
    }
    Ok(())
}

/// What a request resolves to.
#[derive(Debug)]
enum Reply {
    Runner,
    /// Error report accepted
    Reported,
    Code(Artifact),
    Map(Artifact),
    NotFound,
    Unavailable,
    Failed(Error),
}

/// Handle a single HTTP request
fn handle_request<F: BackendFactory>(
    mut request: Request,
    session: &Session<F>,
    runtime: &Handle,
) -> Result<()> {
    let reply = if crate::core::is_shutdown() {
        Reply::Unavailable
    } else if request.method() == &Method::Post && strip_query(request.url()) == ERROR_ROUTE {
        accept_error_report(request.as_reader(), session)
    } else if !matches!(request.method(), Method::Get | Method::Head) {
        Reply::NotFound
    } else {
        runtime.block_on(route(request.url(), session))
    };

    match reply {
        Reply::Runner => response::respond_runner(
            request,
            &session.scripts(),
            &session.settings().base_path,
            session.format(),
        ),
        Reply::Reported => response::respond_no_content(request),
        Reply::Code(artifact) => response::respond_code(request, &artifact),
        Reply::Map(artifact) => response::respond_map(request, &artifact),
        Reply::NotFound => response::respond_not_found(request),
        Reply::Unavailable => response::respond_unavailable(request),
        Reply::Failed(error) => response::respond_error(request, &error),
    }
}

/// Log the error report in `body` through the session's formatter.
fn accept_error_report<F: BackendFactory>(body: impl Read, session: &Session<F>) -> Reply {
    let mut bytes = Vec::new();
    match body.take(MAX_ERROR_REPORT).read_to_end(&mut bytes) {
        Ok(_) => {
            session.report_error(&String::from_utf8_lossy(&bytes));
            Reply::Reported
        }
        Err(e) => Reply::Failed(Error::task(e)),
    }
}

/// Resolve `url` against the session, waiting for its bundle if needed.
async fn route<F: BackendFactory>(url: &str, session: &Session<F>) -> Reply {
    if matches!(strip_query(url), "/" | "/index.html") {
        return Reply::Runner;
    }

    let Some(Target { key, map }) = resolve_key(url, &session.settings().base_path) else {
        return Reply::NotFound;
    };

    match session.artifact(&key).await {
        Ok(Some(artifact)) if map => Reply::Map(artifact),
        Ok(Some(artifact)) => Reply::Code(artifact),
        Ok(None) => Reply::NotFound,
        Err(e) => Reply::Failed(e),
    }
}
