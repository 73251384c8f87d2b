//! `[bundle]` section configuration.
//!
//! Which files are test entries and how they are grouped into bundles.
//!
//! # Example
//!
//! ```toml
//! [bundle]
//! base_path = "."                      # Root for /base/ URLs and relative error paths
//! files = [".test.ts", ".test.js"]     # Test entry suffixes
//! exclude = ["dist", "fixtures"]       # Ignored prefixes, relative to base_path
//! single_bundle = true                 # One bundle importing every test file
//! bundle_delay = 700                   # Debounce (ms) before a single-bundle build
//! output = "rebundle-out"              # `rebundle build` output directory
//! ```

use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::config::{ConfigDiagnostics, FieldPath};
use crate::utils::path::absolutize;

/// Test entry discovery and bundling settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Project directory scanned for tests. Absolute after loading.
    pub base_path: PathBuf,

    /// File name suffixes that mark a test entry.
    pub files: Vec<String>,

    /// Path prefixes never scanned or watched. Absolute after loading.
    pub exclude: Vec<PathBuf>,

    /// Bundle every test into one file instead of one bundle per test.
    pub single_bundle: bool,

    /// Debounce window for the single bundle. Negative builds immediately.
    pub bundle_delay: i64,

    /// Output directory of the `build` command. Absolute after loading.
    pub output: PathBuf,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            files: [".test.js", ".test.ts", ".spec.js", ".spec.ts"]
                .map(String::from)
                .to_vec(),
            exclude: vec![PathBuf::from("dist")],
            single_bundle: true,
            bundle_delay: 700,
            output: PathBuf::from("rebundle-out"),
        }
    }
}

impl BundleConfig {
    /// Resolve `base_path` and `output` against `root`, `exclude` against
    /// `base_path`. `~` is expanded in `base_path` and `output`.
    pub fn normalize(&mut self, root: &Path) {
        self.base_path = absolutize(&expand_tilde(&self.base_path), root);
        self.output = absolutize(&expand_tilde(&self.output), root);
        self.exclude = self
            .exclude
            .iter()
            .map(|prefix| absolutize(prefix, &self.base_path))
            .collect();
    }

    /// Whether `path`'s file name ends with a test suffix.
    pub fn is_test_file(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.files.iter().any(|suffix| name.ends_with(suffix.as_str()))
    }

    /// Whether `path` is hidden, under `node_modules`, or excluded.
    ///
    /// Only components below `base_path` are checked for dot names, so a
    /// project living in e.g. `~/.work/app` is still scanned.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.base_path).unwrap_or(path);
        let hidden = relative.components().any(|c| match c {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                name.starts_with('.') || name == "node_modules"
            }
            _ => false,
        });

        hidden || self.exclude.iter().any(|prefix| path.starts_with(prefix))
    }

    /// Checks that need the raw, not yet normalized values.
    pub fn validate_paths(&self, diag: &mut ConfigDiagnostics) {
        for prefix in &self.exclude {
            if prefix.is_absolute() {
                diag.error_with_hint(
                    FieldPath::new("bundle.exclude"),
                    format!("`{}` must be relative", prefix.display()),
                    "exclude prefixes are resolved against bundle.base_path",
                );
            }
        }
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.files.is_empty() {
            diag.error_with_hint(
                FieldPath::new("bundle.files"),
                "no test file suffixes configured",
                "e.g. files = [\".test.ts\"]",
            );
        }
        if self.files.iter().any(String::is_empty) {
            diag.error(
                FieldPath::new("bundle.files"),
                "empty suffix would match every file",
            );
        }
        if !self.base_path.is_dir() {
            diag.error(
                FieldPath::new("bundle.base_path"),
                format!("`{}` is not a directory", self.base_path.display()),
            );
        }
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(raw) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    fn normalized(extra: &str) -> BundleConfig {
        let mut bundle = test_parse_config(extra).bundle;
        bundle.normalize(Path::new("/project"));
        bundle
    }

    #[test]
    fn test_bundle_config_defaults() {
        let config = test_parse_config("");
        assert!(config.bundle.single_bundle);
        assert_eq!(config.bundle.bundle_delay, 700);
        assert_eq!(config.bundle.files.len(), 4);
    }

    #[test]
    fn test_normalize_resolves_paths() {
        let bundle = normalized("[bundle]\nbase_path = \"web\"\nexclude = [\"dist\", \"./a/../gen\"]");
        assert_eq!(bundle.base_path, PathBuf::from("/project/web"));
        assert_eq!(bundle.output, PathBuf::from("/project/rebundle-out"));
        assert_eq!(
            bundle.exclude,
            vec![PathBuf::from("/project/web/dist"), PathBuf::from("/project/web/gen")]
        );
    }

    #[test]
    fn test_is_test_file() {
        let bundle = normalized("[bundle]\nfiles = [\".test.ts\"]");
        assert!(bundle.is_test_file(Path::new("/project/src/a.test.ts")));
        assert!(!bundle.is_test_file(Path::new("/project/src/a.ts")));
        assert!(!bundle.is_test_file(Path::new("/project/src/a.test.js")));
    }

    #[test]
    fn test_is_ignored() {
        let bundle = normalized("");
        assert!(bundle.is_ignored(Path::new("/project/node_modules/x/a.test.js")));
        assert!(bundle.is_ignored(Path::new("/project/.cache/a.test.js")));
        assert!(bundle.is_ignored(Path::new("/project/dist/a.test.js")));
        assert!(!bundle.is_ignored(Path::new("/project/src/a.test.js")));
        // Sibling with a shared name prefix is not excluded
        assert!(!bundle.is_ignored(Path::new("/project/distant/a.test.js")));
    }

    #[test]
    fn test_dot_dirs_above_base_are_fine() {
        let mut bundle = test_parse_config("").bundle;
        bundle.normalize(Path::new("/home/u/.work/app"));
        assert!(!bundle.is_ignored(Path::new("/home/u/.work/app/src/a.test.js")));
    }

    #[test]
    fn test_validate_rejects_absolute_exclude() {
        let bundle = test_parse_config("[bundle]\nexclude = [\"/abs\"]").bundle;
        let mut diag = ConfigDiagnostics::new();
        bundle.validate_paths(&mut diag);
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_validate_rejects_empty_files() {
        let mut bundle = test_parse_config("[bundle]\nfiles = []").bundle;
        bundle.normalize(&std::env::temp_dir());
        let mut diag = ConfigDiagnostics::new();
        bundle.validate(&mut diag);
        assert_eq!(diag.error_count(), 1);
    }
}
