//! Build results handed to readers.

use std::path::Path;
use std::sync::Arc;

use crate::backend::{BuildFailure, OutputFile};
use crate::sourcemap::SourceMap;
use crate::utils::path::absolutize;

/// Code and source map of one build. Cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub code: Arc<[u8]>,
    pub map: Arc<SourceMap>,
    /// Build failure this placeholder reports
    failure: Option<Arc<str>>,
}

impl Artifact {
    /// Stand-in served when a build fails: reports `message` in the browser.
    pub fn placeholder(message: &str) -> Self {
        let literal = serde_json::Value::String(message.to_owned()).to_string();
        Self {
            code: Arc::from(format!("console.error({literal})").into_bytes()),
            map: Arc::new(SourceMap::empty()),
            failure: Some(Arc::from(message)),
        }
    }

    pub fn code_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.code)
    }

    /// Whether this is a placeholder rather than real build output.
    pub fn is_placeholder(&self) -> bool {
        self.failure.is_some()
    }

    /// Message of the failed build, for placeholders.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }
}

/// Turn backend outputs `[map, code]` into an artifact for `entry`.
///
/// Map sources become absolute (resolved against the map's directory) and
/// `file` becomes the entry's basename.
pub(super) fn unpack(entry: &Path, mut outputs: Vec<OutputFile>) -> Result<Artifact, BuildFailure> {
    let code = outputs.swap_remove(1);
    let map_file = outputs.swap_remove(0);

    let mut map = SourceMap::from_slice(&map_file.contents).map_err(|e| BuildFailure::InvalidMap {
        path: map_file.path.clone(),
        reason: e.to_string(),
    })?;

    let dir = map_file.path.parent().unwrap_or_else(|| Path::new("/"));
    map.sources = map
        .sources
        .iter()
        .map(|source| {
            absolutize(Path::new(source), dir)
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    map.file = entry
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    Ok(Artifact {
        code: Arc::from(code.contents),
        map: Arc::new(map),
        failure: None,
    })
}
