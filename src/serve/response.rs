//! HTTP response handlers.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::backend::Format;
use crate::bundle::Artifact;

use super::ERROR_ROUTE;
use super::path::url_for;

mod mime {
    pub const HTML: &str = "text/html; charset=utf-8";
    pub const PLAIN: &str = "text/plain; charset=utf-8";
    pub const JAVASCRIPT: &str = "text/javascript; charset=utf-8";
    pub const JSON: &str = "application/json";
}

/// Respond with the bundle code.
pub fn respond_code(request: Request, artifact: &Artifact) -> Result<()> {
    send_body(request, 200, mime::JAVASCRIPT, artifact.code.to_vec())
}

/// Respond with the bundle's source map as pretty JSON.
pub fn respond_map(request: Request, artifact: &Artifact) -> Result<()> {
    let body = artifact.map.to_json_pretty();
    send_body(request, 200, mime::JSON, body.into_bytes())
}

/// Respond with a page that loads every bundle.
pub fn respond_runner(
    request: Request,
    scripts: &[PathBuf],
    base_path: &Path,
    format: Format,
) -> Result<()> {
    let body = runner_page(scripts, base_path, format);
    send_body(request, 200, mime::HTML, body.into_bytes())
}

/// Respond with 204 after an error report.
pub fn respond_no_content(request: Request) -> Result<()> {
    request.respond(Response::empty(StatusCode(204)))?;
    Ok(())
}

/// Respond with 404 (unknown bundle or foreign URL).
pub fn respond_not_found(request: Request) -> Result<()> {
    send_body(request, 404, mime::PLAIN, b"404 Not Found".to_vec())
}

/// Respond with 503 Service Unavailable (server shutting down).
pub fn respond_unavailable(request: Request) -> Result<()> {
    send_body(request, 503, mime::PLAIN, b"503 Service Unavailable".to_vec())
}

/// Respond with 500 when a bundle could not be read at all.
pub fn respond_error(request: Request, error: &crate::error::Error) -> Result<()> {
    let body = format!("500 Internal Server Error\n\n{error}");
    send_body(request, 500, mime::PLAIN, body.into_bytes())
}

/// Posts uncaught errors and rejections to [`ERROR_ROUTE`]. Runs before
/// any bundle so load-time failures are caught too.
fn error_reporter() -> String {
    format!(
        r#"  <script>
    (function () {{
      function report(text) {{
        fetch("{ERROR_ROUTE}", {{ method: "POST", body: String(text), keepalive: true }});
      }}
      window.addEventListener("error", function (e) {{
        report(e.error && e.error.stack
          ? e.error.stack
          : e.message + "\n    at " + e.filename + ":" + e.lineno + ":" + e.colno);
      }});
      window.addEventListener("unhandledrejection", function (e) {{
        report(e.reason && e.reason.stack ? e.reason.stack : e.reason);
      }});
    }})();
  </script>
"#
    )
}

/// HTML page with one `<script>` per bundle.
///
/// `esm` bundles are loaded as modules, everything else as classic scripts.
pub fn runner_page(scripts: &[PathBuf], base_path: &Path, format: Format) -> String {
    let kind = match format {
        Format::Esm => " type=\"module\"",
        _ => "",
    };
    let tags: String = scripts
        .iter()
        .map(|key| format!("  <script{kind} src=\"{}\"></script>\n", url_for(key, base_path)))
        .collect();

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n  <meta charset=\"utf-8\">\n  <title>rebundle</title>\n{}</head>\n<body>\n{tags}</body>\n</html>\n",
        error_reporter()
    )
}

fn is_head_request(request: &Request) -> bool {
    request.method() == &Method::Head
}

fn send_body(request: Request, status: u16, content_type: &'static str, body: Vec<u8>) -> Result<()> {
    if is_head_request(&request) {
        let response = Response::empty(StatusCode(status))
            .with_header(make_header("Content-Type", content_type));
        request.respond(response)?;
        return Ok(());
    }

    let response = Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(make_header("Content-Type", content_type))
        .with_header(make_header("Cache-Control", "no-cache"));
    request.respond(response)?;
    Ok(())
}

fn make_header(key: &'static str, value: &'static str) -> Header {
    // Static ASCII names and values are always valid headers
    Header::from_bytes(key, value).unwrap()
}
