//! Generated entry point for single-bundle mode.
//!
//! Every test file is imported from one temp file, so the backend builds a
//! single bundle for the whole suite:
//!
//! ```text
//! /tmp/3f9c2a...-bundle.js
//!   import "../home/u/proj/src/a.test.js";
//!   import "../home/u/proj/src/b.test.js";
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

use crate::utils::hash::random_hex;
use crate::utils::path::{fs::relative_import, normalize};

/// Entry file importing every registered test file.
#[derive(Debug)]
pub struct TestEntryPoint {
    dir: PathBuf,
    file: PathBuf,
    /// Import specifiers in registration order
    imports: Vec<String>,
    seen: FxHashSet<String>,
    /// A file was added since the last `write`
    dirty: bool,
}

impl TestEntryPoint {
    /// Entry point in the system temp dir (symlinks resolved, so relative
    /// imports stay valid for the backend).
    pub fn new() -> io::Result<Self> {
        let dir = fs::canonicalize(std::env::temp_dir())?;
        Ok(Self::in_dir(dir))
    }

    /// Entry point in `dir`, which must be absolute.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = normalize(&dir.into());
        let file = dir.join(format!("{}-bundle.js", random_hex(8)));
        Self {
            dir,
            file,
            imports: Vec::new(),
            seen: FxHashSet::default(),
            dirty: false,
        }
    }

    /// Path of the generated file; the build key of the single bundle.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Register a test file. Returns `false` if it was already imported.
    pub fn add_file(&mut self, file: &Path) -> bool {
        let import = relative_import(&self.dir, &normalize(file));
        if !self.seen.insert(import.clone()) {
            return false;
        }
        self.imports.push(import);
        self.dirty = true;
        true
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Rewrite the file if a test file was added since the last write.
    pub fn write(&mut self) -> io::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let content = self
            .imports
            .iter()
            .map(|import| format!("import \"{import}\";"))
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(&self.file, content)?;
        self.dirty = false;
        Ok(())
    }

    /// Create the file empty, so it exists before the first build.
    pub fn touch(&self) -> io::Result<()> {
        fs::write(&self.file, "")
    }

    /// Remove the generated file. Missing is fine.
    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.file) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry() -> (TempDir, TestEntryPoint) {
        let dir = TempDir::new().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let entry = TestEntryPoint::in_dir(root);
        (dir, entry)
    }

    #[test]
    fn test_file_name() {
        let (dir, entry) = entry();
        let name = entry.file().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("-bundle.js"));
        assert_eq!(name.len(), "-bundle.js".len() + 16);
        assert_eq!(entry.file().parent(), Some(fs::canonicalize(dir.path()).unwrap().as_path()));
    }

    #[test]
    fn test_touch_creates_empty_file() {
        let (_dir, entry) = entry();
        entry.touch().unwrap();
        assert_eq!(fs::read_to_string(entry.file()).unwrap(), "");
    }

    #[test]
    fn test_write_imports_relative_to_dir() {
        let (dir, mut entry) = entry();
        let root = fs::canonicalize(dir.path()).unwrap();

        assert!(entry.add_file(&root.join("src/a.test.js")));
        assert!(entry.add_file(&root.join("src/b.test.js")));
        entry.write().unwrap();

        assert_eq!(
            fs::read_to_string(entry.file()).unwrap(),
            "import \"./src/a.test.js\";\nimport \"./src/b.test.js\";"
        );
        assert!(!entry.is_dirty());
    }

    #[test]
    fn test_add_file_dedupes() {
        let (dir, mut entry) = entry();
        let root = fs::canonicalize(dir.path()).unwrap();

        assert!(entry.add_file(&root.join("a.test.js")));
        entry.write().unwrap();
        assert!(!entry.add_file(&root.join("./x/../a.test.js")));
        assert!(!entry.is_dirty());
    }

    #[test]
    fn test_write_only_when_dirty() {
        let (dir, mut entry) = entry();
        let root = fs::canonicalize(dir.path()).unwrap();

        // Nothing registered: no file written
        entry.write().unwrap();
        assert!(!entry.file().exists());

        entry.add_file(&root.join("a.test.js"));
        entry.write().unwrap();
        fs::write(entry.file(), "changed").unwrap();

        // Clean: left alone
        entry.write().unwrap();
        assert_eq!(fs::read_to_string(entry.file()).unwrap(), "changed");
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (_dir, entry) = entry();
        entry.touch().unwrap();
        entry.remove().unwrap();
        entry.remove().unwrap();
        assert!(!entry.file().exists());
    }
}
