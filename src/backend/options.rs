//! Compiler options shared by every entry of a registry.
//!
//! Deserialized from the `[build]` config section. Keys this struct does not
//! know are kept in `extra` and handed to the compiler verbatim.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

/// What to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildInput {
    /// An entry file on disk.
    Path(PathBuf),
    /// In-memory source, resolved as if it lived in `resolve_dir`.
    Source {
        contents: String,
        resolve_dir: PathBuf,
        sourcefile: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Browser,
    Node,
    Neutral,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Iife,
    Esm,
    Cjs,
}

/// How the map is emitted. Both modes write a separate `.map` file, which
/// the coordinator requires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourcemapMode {
    #[default]
    External,
    /// Also appends a `sourceMappingURL` comment to the code.
    Linked,
}

impl Platform {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::Node => "node",
            Self::Neutral => "neutral",
        }
    }
}

impl Format {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Iife => "iife",
            Self::Esm => "esm",
            Self::Cjs => "cjs",
        }
    }
}

impl SourcemapMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::External => "external",
            Self::Linked => "linked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub target: String,
    pub platform: Platform,
    pub sourcemap: SourcemapMode,
    pub format: Format,
    pub bundle: bool,
    /// User defines, layered over the `process.env.NODE_ENV` default
    pub define: BTreeMap<String, String>,
    pub plugins: Vec<String>,

    /// Output directory; the backend picks a private one when unset
    #[serde(skip)]
    pub outdir: Option<PathBuf>,

    #[serde(skip)]
    pub entry: Option<BuildInput>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            target: "es2015".into(),
            platform: Platform::default(),
            sourcemap: SourcemapMode::default(),
            format: Format::default(),
            bundle: true,
            define: BTreeMap::new(),
            plugins: Vec::new(),
            outdir: None,
            entry: None,
            extra: BTreeMap::new(),
        }
    }
}

impl BuildOptions {
    /// These options with `key` as the entry file.
    pub fn for_entry(&self, key: &Path) -> Self {
        Self {
            entry: Some(BuildInput::Path(key.to_path_buf())),
            ..self.clone()
        }
    }

    /// Defines passed to the compiler: `process.env.NODE_ENV` from the
    /// environment (or `"development"`), overridden by user defines.
    pub fn effective_define(&self) -> BTreeMap<String, String> {
        let node_env = std::env::var("NODE_ENV").unwrap_or_else(|_| "development".into());
        let mut define = BTreeMap::new();
        define.insert(
            "process.env.NODE_ENV".to_owned(),
            Value::String(node_env).to_string(),
        );
        define.extend(self.define.iter().map(|(k, v)| (k.clone(), v.clone())));
        define
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = BuildOptions::default();
        assert_eq!(options.target, "es2015");
        assert_eq!(options.platform, Platform::Browser);
        assert_eq!(options.format, Format::Iife);
        assert_eq!(options.sourcemap, SourcemapMode::External);
        assert!(options.bundle);
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let options: BuildOptions = toml::from_str(
            r#"
            format = "esm"
            jsx_factory = "h"
            main_fields = ["module", "main"]
            "#,
        )
        .unwrap();
        assert_eq!(options.format, Format::Esm);
        assert_eq!(options.extra["jsx_factory"], Value::String("h".into()));
        assert!(options.extra["main_fields"].is_array());
        assert!(!options.extra.contains_key("format"));
    }

    #[test]
    fn test_user_define_overrides_node_env() {
        let mut options = BuildOptions::default();
        options
            .define
            .insert("process.env.NODE_ENV".into(), "\"test\"".into());
        options.define.insert("DEBUG".into(), "false".into());

        let define = options.effective_define();
        assert_eq!(define["process.env.NODE_ENV"], "\"test\"");
        assert_eq!(define["DEBUG"], "false");
    }

    #[test]
    fn test_for_entry_keeps_options() {
        let options = BuildOptions {
            target: "es2020".into(),
            ..BuildOptions::default()
        };
        let entry = options.for_entry(Path::new("/p/a.test.js"));
        assert_eq!(entry.target, "es2020");
        assert_eq!(
            entry.entry,
            Some(BuildInput::Path(PathBuf::from("/p/a.test.js")))
        );
    }
}
