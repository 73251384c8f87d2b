//! One-shot `build` command.
//!
//! Bundles every test entry once and writes code and map next to each other:
//!
//! ```text
//! per-file:  <base>/src/a.test.ts  →  <output>/src/a.test.js + a.test.js.map
//! single:    every test            →  <output>/bundle.js     + bundle.js.map
//! ```
//!
//! Failed bundles are reported through the error formatter, so locations
//! point at the original sources.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinSet;

use crate::backend::BackendFactory;
use crate::bundle::Artifact;
use crate::logger::ProgressLine;
use crate::serve::{Session, scan_tests};
use crate::{debug, log};

/// Output name of the single bundle (its entry point name is random).
pub const SINGLE_BUNDLE_NAME: &str = "bundle.js";

/// Outcome of [`build_tests`].
#[derive(Debug, Default)]
pub struct BuildSummary {
    /// Code files written, in key order
    pub written: Vec<PathBuf>,
    /// Bundles whose build failed
    pub failed: usize,
}

/// Bundle every test under the base path into `output`.
pub async fn build_tests<F: BackendFactory>(
    session: &Arc<Session<F>>,
    output: &Path,
    quiet: bool,
) -> Result<BuildSummary> {
    let files = scan_tests(session.settings());
    if files.is_empty() {
        log!("build"; "no test files under {}", session.settings().base_path.display());
        return Ok(BuildSummary::default());
    }

    let progress = (!quiet).then(|| Arc::new(ProgressLine::new("bundle", files.len())));
    let mut set = JoinSet::new();
    for file in files {
        let session = Arc::clone(session);
        let progress = progress.clone();
        set.spawn(async move {
            let outcome = session.preprocess(&file).await;
            if let Some(progress) = progress {
                progress.inc();
            }
            (file, outcome)
        });
    }
    while let Some(joined) = set.join_next().await {
        let (file, outcome) = joined.context("bundle task failed")?;
        if let Err(e) = outcome {
            log!("error"; "{}: {e}", file.display());
        }
    }
    if let Some(progress) = progress.and_then(|p| Arc::try_unwrap(p).ok()) {
        progress.finish();
    }

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {}", output.display()))?;

    let mut summary = BuildSummary::default();
    for key in session.scripts() {
        let Some(artifact) = session.artifact(&key).await? else {
            continue;
        };
        if let Some(failure) = artifact.failure() {
            eprint!("{}", session.format_error(failure));
            summary.failed += 1;
            continue;
        }

        let target = output.join(output_name(&key, &session.settings().base_path, session.is_single()));
        write_artifact(&target, &artifact)?;
        debug!("build"; "wrote {}", target.display());
        summary.written.push(target);
    }

    Ok(summary)
}

/// Path of `key`'s code file relative to the output directory.
fn output_name(key: &Path, base_path: &Path, single: bool) -> PathBuf {
    if single {
        return PathBuf::from(SINGLE_BUNDLE_NAME);
    }
    match key.strip_prefix(base_path) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => key.file_name().map_or_else(|| PathBuf::from(SINGLE_BUNDLE_NAME), PathBuf::from),
    }
}

/// Write `<target>` and `<target>.map`.
fn write_artifact(target: &Path, artifact: &Artifact) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(target, &artifact.code)
        .with_context(|| format!("Failed to write {}", target.display()))?;

    let mut map_path = target.as_os_str().to_owned();
    map_path.push(".map");
    let map_path = PathBuf::from(map_path);
    fs::write(&map_path, artifact.map.to_json_pretty())
        .with_context(|| format!("Failed to write {}", map_path.display()))?;
    Ok(())
}
