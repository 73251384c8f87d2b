//! Rewrite generated `file:line:col` references to original positions.
//!
//! Browser stack traces point into bundles. The formatter finds every
//! reference to a known bundle and prefixes the original location:
//!
//! ```text
//! /tmp/x-bundle.js:10:5   ──▶   src/foo.test.ts:3:2 <- /tmp/x-bundle.js:10:5
//! ```
//!
//! Anything it cannot map (unknown file, broken map, unmapped position) is
//! left exactly as it was.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::Mutex;
use regex::{Captures, Regex};
use rustc_hash::FxHashMap;

use crate::registry::SourceMapLookup;
use crate::sourcemap::{SourceMap, SourceMapConsumer};
use crate::utils::path::absolutize;

/// `path[junk]:line:column`, optionally with a Windows drive letter.
static RE_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)((?:\b[A-Z]:)?[^\s#?:(]+)[^\s:]*:(\d+):(\d+)").unwrap()
});

/// Final formatting hook applied to the rewritten message.
pub type UserFormatter = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Consumers keyed by map address. The `Weak` guards against address reuse
/// after a map is superseded and freed.
type ConsumerMemo = FxHashMap<usize, (Weak<SourceMap>, Option<Arc<SourceMapConsumer>>)>;

/// Translates error messages through the latest source maps of a lookup.
pub struct ErrorFormatter {
    lookup: Arc<dyn SourceMapLookup>,
    base_path: PathBuf,
    formatter: Option<UserFormatter>,
    consumers: Mutex<ConsumerMemo>,
}

/// Build a formatter over `lookup`. Relative paths in messages are resolved
/// against `base_path`.
pub fn create_format_error(
    lookup: Arc<dyn SourceMapLookup>,
    base_path: impl Into<PathBuf>,
    formatter: Option<UserFormatter>,
) -> ErrorFormatter {
    ErrorFormatter {
        lookup,
        base_path: base_path.into(),
        formatter,
        consumers: Mutex::new(FxHashMap::default()),
    }
}

impl ErrorFormatter {
    /// Rewrite every mappable location in `message`.
    ///
    /// Without a user formatter the result ends with a newline.
    pub fn format(&self, message: &str) -> String {
        let rewritten = RE_LOCATION.replace_all(message, |caps: &Captures<'_>| {
            self.translate(caps).unwrap_or_else(|| caps[0].to_owned())
        });

        match &self.formatter {
            Some(formatter) => formatter(&rewritten),
            None => format!("{rewritten}\n"),
        }
    }

    fn translate(&self, caps: &Captures<'_>) -> Option<String> {
        let key = absolutize(Path::new(&caps[1]), &self.base_path);
        let line: u32 = caps[2].parse().ok()?;
        let column: u32 = caps[3].parse().ok()?;

        if !self.lookup.has(&key) {
            return None;
        }
        let map = self.lookup.sourcemap(&key)?;
        let consumer = self.consumer(&map)?;
        let original = consumer.original_position_for(line, column.checked_sub(1)?)?;

        Some(format!(
            "{}:{}:{} <- {}:{line}:{column}",
            original.source,
            original.line,
            original.column + 1,
            key.display()
        ))
    }

    /// Decode `map` once per map object; a map that fails to decode stays
    /// failed until it is replaced.
    fn consumer(&self, map: &Arc<SourceMap>) -> Option<Arc<SourceMapConsumer>> {
        let address = Arc::as_ptr(map) as usize;
        let mut consumers = self.consumers.lock();

        if let Some((weak, consumer)) = consumers.get(&address)
            && weak.upgrade().is_some_and(|live| Arc::ptr_eq(&live, map))
        {
            return consumer.clone();
        }

        consumers.retain(|_, (weak, _)| weak.strong_count() > 0);
        let consumer = SourceMapConsumer::new(map).ok().map(Arc::new);
        consumers.insert(address, (Arc::downgrade(map), consumer.clone()));
        consumer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed set of keys; `None` marks a potential (never built) entry.
    #[derive(Default)]
    struct StaticLookup {
        maps: FxHashMap<PathBuf, Option<Arc<SourceMap>>>,
    }

    impl SourceMapLookup for StaticLookup {
        fn has(&self, key: &Path) -> bool {
            self.maps.contains_key(key)
        }

        fn sourcemap(&self, key: &Path) -> Option<Arc<SourceMap>> {
            self.maps.get(key).cloned().flatten()
        }
    }

    fn bar_map() -> Arc<SourceMap> {
        Arc::new(SourceMap {
            version: Some(3),
            sources: vec!["src/bar.ts".into()],
            mappings: ";;;;;;;;;IAEC".into(),
            ..SourceMap::default()
        })
    }

    fn formatter(entries: &[(&str, Option<Arc<SourceMap>>)]) -> ErrorFormatter {
        let lookup = StaticLookup {
            maps: entries
                .iter()
                .map(|(key, map)| (PathBuf::from(key), map.clone()))
                .collect(),
        };
        create_format_error(Arc::new(lookup), "/abs", None)
    }

    #[test]
    fn test_rewrites_known_location() {
        let format = formatter(&[("/abs/path/foo.js", Some(bar_map()))]);
        assert_eq!(
            format.format("/abs/path/foo.js:10:5: boom"),
            "src/bar.ts:3:2 <- /abs/path/foo.js:10:5: boom\n"
        );
    }

    #[test]
    fn test_rewrites_inside_stack_frame() {
        let format = formatter(&[("/abs/path/foo.js", Some(bar_map()))]);
        assert_eq!(
            format.format("Error: boom\n    at it (/abs/path/foo.js?123:10:5)"),
            "Error: boom\n    at it (src/bar.ts:3:2 <- /abs/path/foo.js:10:5)\n"
        );
    }

    #[test]
    fn test_relative_path_joined_to_base() {
        let format = formatter(&[("/abs/path/foo.js", Some(bar_map()))]);
        assert_eq!(
            format.format("path/foo.js:10:5"),
            "src/bar.ts:3:2 <- /abs/path/foo.js:10:5\n"
        );
    }

    #[test]
    fn test_unknown_file_unchanged() {
        let format = formatter(&[("/abs/path/foo.js", Some(bar_map()))]);
        assert_eq!(format.format("/other.js:10:5 boom"), "/other.js:10:5 boom\n");
    }

    #[test]
    fn test_potential_entry_unchanged() {
        let format = formatter(&[("/abs/path/foo.js", None)]);
        assert_eq!(format.format("/abs/path/foo.js:10:5"), "/abs/path/foo.js:10:5\n");
    }

    #[test]
    fn test_unmapped_position_unchanged() {
        let format = formatter(&[("/abs/path/foo.js", Some(bar_map()))]);
        // Line 1 has no segments
        assert_eq!(format.format("/abs/path/foo.js:1:1"), "/abs/path/foo.js:1:1\n");
        // Column 0 has no 0-based counterpart
        assert_eq!(format.format("/abs/path/foo.js:10:0"), "/abs/path/foo.js:10:0\n");
    }

    #[test]
    fn test_broken_map_unchanged() {
        let broken = Arc::new(SourceMap {
            sources: vec!["a.ts".into()],
            mappings: "!!!".into(),
            ..SourceMap::default()
        });
        let format = formatter(&[("/abs/a.js", Some(broken))]);
        assert_eq!(format.format("/abs/a.js:1:1"), "/abs/a.js:1:1\n");
        // Memoized failure, same answer
        assert_eq!(format.format("/abs/a.js:1:1"), "/abs/a.js:1:1\n");
    }

    #[test]
    fn test_user_formatter_replaces_newline() {
        let lookup = StaticLookup {
            maps: [(PathBuf::from("/abs/path/foo.js"), Some(bar_map()))]
                .into_iter()
                .collect(),
        };
        let format = create_format_error(
            Arc::new(lookup),
            "/abs",
            Some(Box::new(|message: &str| format!("[{message}]"))),
        );
        assert_eq!(
            format.format("/abs/path/foo.js:10:5"),
            "[src/bar.ts:3:2 <- /abs/path/foo.js:10:5]"
        );
    }

    #[test]
    fn test_consumer_memoized_per_map() {
        let map = bar_map();
        let format = formatter(&[("/abs/path/foo.js", Some(Arc::clone(&map)))]);
        let first = format.consumer(&map).unwrap();
        let second = format.consumer(&map).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // A different map object gets its own consumer
        let other = bar_map();
        let third = format.consumer(&other).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }
}
