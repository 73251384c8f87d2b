//! Compiler backend capability.
//!
//! The bundle coordinator never compiles anything itself. It asks a
//! [`BackendFactory`] for one long-lived [`Backend`] context per entry and
//! calls [`Backend::rebuild`] whenever the entry is stale.
//!
//! ```text
//! BackendFactory::context(options) ──▶ Backend ──rebuild()──▶ [map, code]
//!                                         └──dispose() once on stop
//! ```

pub mod esbuild;
#[cfg(test)]
pub(crate) mod fake;
mod options;

pub use options::{BuildInput, BuildOptions, Format, Platform, SourcemapMode};

use std::future::Future;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// One file produced by a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl OutputFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// Why a build produced no usable output.
///
/// Never reaches readers: the coordinator turns it into a placeholder
/// artifact that reports the message in the browser.
#[derive(Debug, Error)]
pub enum BuildFailure {
    /// Compiler diagnostics.
    #[error("{0}")]
    Message(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The compiler executable could not be located.
    #[error("{0}")]
    MissingExecutable(String),

    /// The map output is not valid source map JSON.
    #[error("invalid source map `{}`: {reason}", path.display())]
    InvalidMap { path: PathBuf, reason: String },
}

impl BuildFailure {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// A live compiler context for one entry.
pub trait Backend: Send + 'static {
    /// Rebuild the entry. Outputs are `[map, code]` in that order.
    fn rebuild(&mut self) -> impl Future<Output = Result<Vec<OutputFile>, BuildFailure>> + Send;

    /// Release compiler resources. Called at most once.
    fn dispose(&mut self) -> impl Future<Output = ()> + Send;
}

/// Creates [`Backend`] contexts on first build of an entry.
pub trait BackendFactory: Send + Sync + 'static {
    type Backend: Backend;

    fn context(
        &self,
        options: &BuildOptions,
    ) -> impl Future<Output = Result<Self::Backend, BuildFailure>> + Send;
}
