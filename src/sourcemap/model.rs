use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Version 3 source map.
///
/// Only the fields the bundler rewrites are typed. Everything else is kept in
/// `extra` so serving a map back never drops backend-specific data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mappings: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SourceMap {
    /// Parse a map from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// The `{}` map attached to placeholder artifacts.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this map carries no mapping data at all.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.mappings.is_empty()
    }

    /// Pretty JSON, as served over HTTP.
    pub fn to_json_pretty(&self) -> String {
        // Only string keys and JSON values: serialization cannot fail
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_owned())
    }

    /// `sources[index]` joined with `sourceRoot`, if any.
    pub fn resolved_source(&self, index: usize) -> Option<String> {
        let source = self.sources.get(index)?;
        Some(match self.source_root.as_deref() {
            Some(root) if !root.is_empty() => {
                format!("{}/{}", root.trim_end_matches('/'), source)
            }
            _ => source.clone(),
        })
    }
}
