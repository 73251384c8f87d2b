//! Test file discovery under the base path.

use std::path::PathBuf;
use std::sync::Arc;

use jwalk::WalkDir;

use crate::config::BundleConfig;

/// Every test entry below `settings.base_path`, sorted.
///
/// Ignored directories (dot dirs, `node_modules`, excluded prefixes) are
/// pruned before they are read.
pub fn scan_tests(settings: &BundleConfig) -> Vec<PathBuf> {
    let filter = Arc::new(settings.clone());
    let prune = Arc::clone(&filter);

    let mut files: Vec<PathBuf> = WalkDir::new(&settings.base_path)
        .skip_hidden(false)
        .process_read_dir(move |_, _, _, children| {
            children.retain(|entry| {
                entry
                    .as_ref()
                    .map_or(true, |entry| !prune.is_ignored(&entry.path()))
            });
        })
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path())
        .filter(|path| filter.is_test_file(path))
        .collect();

    files.sort();
    files
}
