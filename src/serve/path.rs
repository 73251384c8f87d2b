//! Request URL to build key resolution.
//!
//! ```text
//! /absolute/home/u/proj/a.test.js      → /home/u/proj/a.test.js
//! /base/src/a.test.js.map?v=3          → <base>/src/a.test.js   (map)
//! /base/../secret.js                   → None
//! ```

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use regex::{Captures, Regex};

use crate::utils::path::route::{decode_url, strip_query};
use crate::utils::path::{fs::relative, normalize};

const ABSOLUTE: &str = "/absolute";
const BASE: &str = "/base/";

/// Characters escaped when a key is turned back into a URL.
const URL_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// A served bundle URL inside a stack frame, with its `:line:col` suffix.
///
/// Must start a word (line start, whitespace, `(` or Firefox's `@`), so a
/// filesystem path that merely contains `/base/` is left alone.
static RE_FRAME_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)(^|[\s(@])(?:https?://[^/\s]+)?(/base/[^\s?#:()]+|/absolute/(?:[A-Za-z]:)?[^\s?#:()]+)(?:[?#][^\s:()]*)?(:\d+:\d+)",
    )
    .unwrap()
});

/// What a bundle URL asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub key: PathBuf,
    /// `.map` suffix: serve the source map instead of the code
    pub map: bool,
}

/// Resolve `url` to a build key. `None` for URLs outside both roots.
pub fn resolve_key(url: &str, base_path: &Path) -> Option<Target> {
    let decoded = decode_url(strip_query(url))?;

    let (path, map) = match decoded.strip_suffix(".map") {
        Some(code) => (code, true),
        None => (decoded.as_ref(), false),
    };

    let key = if let Some(rel) = path.strip_prefix(BASE) {
        let key = normalize(&base_path.join(rel));
        // `..` must not climb out of the base path
        if !key.starts_with(base_path) {
            return None;
        }
        key
    } else {
        let abs = path.strip_prefix(ABSOLUTE)?;
        let abs = if cfg!(windows) {
            abs.trim_start_matches('/')
        } else {
            abs
        };
        let key = PathBuf::from(abs);
        if !key.is_absolute() {
            return None;
        }
        normalize(&key)
    };

    Some(Target { key, map })
}

/// URL under which `key` is served: `/base/..` inside the base path,
/// `/absolute/..` elsewhere.
pub fn url_for(key: &Path, base_path: &Path) -> String {
    let raw = match key.strip_prefix(base_path) {
        Ok(_) => {
            let rel = relative(base_path, key);
            format!("{BASE}{}", slashed(&rel))
        }
        Err(_) => {
            let abs = slashed(key);
            if abs.starts_with('/') {
                format!("{ABSOLUTE}{abs}")
            } else {
                format!("{ABSOLUTE}/{abs}")
            }
        }
    };
    utf8_percent_encode(&raw, URL_PATH).to_string()
}

/// Replace bundle URLs in a browser stack trace with their build keys.
///
/// ```text
/// at it (http://localhost:9876/base/a.test.js?3f9c:10:5)  →  at it (<base>/a.test.js:10:5)
/// ```
///
/// URLs that do not resolve (escapes, `.map`) stay as they are.
pub fn localize_urls<'a>(message: &'a str, base_path: &Path) -> Cow<'a, str> {
    RE_FRAME_URL.replace_all(message, |caps: &Captures<'_>| {
        match resolve_key(&caps[2], base_path) {
            Some(Target { key, map: false }) => format!("{}{}{}", &caps[1], key.display(), &caps[3]),
            _ => caps[0].to_owned(),
        }
    })
}

fn slashed(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE_DIR: &str = "/home/u/proj";

    fn resolve(url: &str) -> Option<Target> {
        resolve_key(url, Path::new(BASE_DIR))
    }

    #[test]
    fn test_resolve_base() {
        let target = resolve("/base/src/a.test.js?abc123").unwrap();
        assert_eq!(target.key, PathBuf::from("/home/u/proj/src/a.test.js"));
        assert!(!target.map);
    }

    #[test]
    fn test_resolve_map() {
        let target = resolve("/base/src/a.test.js.map").unwrap();
        assert_eq!(target.key, PathBuf::from("/home/u/proj/src/a.test.js"));
        assert!(target.map);
    }

    #[test]
    fn test_resolve_absolute() {
        let target = resolve("/absolute/tmp/3f9c-bundle.js#x").unwrap();
        assert_eq!(target.key, PathBuf::from("/tmp/3f9c-bundle.js"));

        let target = resolve("/absolute/tmp/./x/../my%20b.js.map").unwrap();
        assert_eq!(target.key, PathBuf::from("/tmp/my b.js"));
        assert!(target.map);
    }

    #[test]
    fn test_resolve_rejects_escape_and_foreign() {
        assert_eq!(resolve("/base/../secret.js"), None);
        assert_eq!(resolve("/base/src/../../secret.js"), None);
        assert_eq!(resolve("/favicon.ico"), None);
        assert_eq!(resolve("/absolutely/a.js"), None);
        assert_eq!(resolve("/base/bad%FF.js"), None);
    }

    #[test]
    fn test_localize_urls() {
        let base = Path::new(BASE_DIR);
        assert_eq!(
            localize_urls("at it (http://localhost:9876/absolute/tmp/x-bundle.js?abc:10:5)", base),
            "at it (/tmp/x-bundle.js:10:5)"
        );
        assert_eq!(
            localize_urls("Error: boom\n    at http://127.0.0.1:9876/base/src/a.test.js:3:7", base),
            "Error: boom\n    at /home/u/proj/src/a.test.js:3:7"
        );
        assert_eq!(
            localize_urls("it@/base/src/my%20a.test.js#x:1:2", base),
            "it@/home/u/proj/src/my a.test.js:1:2"
        );
    }

    #[test]
    fn test_localize_urls_leaves_other_text() {
        let base = Path::new(BASE_DIR);
        for message in [
            "/home/u/base/src/a.ts:1:2",
            "at http://localhost:9876/base/../etc/passwd:1:2",
            "at http://localhost:9876/context.html:1:2",
            "/base/src/a.test.js without position",
        ] {
            assert_eq!(localize_urls(message, base), message);
        }
    }

    #[test]
    fn test_url_for() {
        let base = Path::new(BASE_DIR);
        assert_eq!(
            url_for(Path::new("/home/u/proj/src/a b.test.js"), base),
            "/base/src/a%20b.test.js"
        );
        assert_eq!(
            url_for(Path::new("/tmp/3f9c-bundle.js"), base),
            "/absolute/tmp/3f9c-bundle.js"
        );
    }

    #[test]
    fn test_url_for_resolves_back() {
        let base = Path::new(BASE_DIR);
        for key in ["/home/u/proj/src/a b.test.js", "/tmp/x#1.js"] {
            let url = url_for(Path::new(key), base);
            assert_eq!(resolve(&url).unwrap().key, PathBuf::from(key));
        }
    }
}
