//! URL processing utilities.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;

/// Drop the query string and fragment from a request URL.
///
/// # Examples
/// ```ignore
/// assert_eq!(strip_query("/base/a.js.map?v=1"), "/base/a.js.map");
/// assert_eq!(strip_query("/base/a.js#x"), "/base/a.js");
/// ```
#[inline]
pub fn strip_query(url: &str) -> &str {
    url.find(['?', '#']).map_or(url, |pos| &url[..pos])
}

/// Percent-decode a URL path. Invalid UTF-8 yields `None`.
pub fn decode_url(url: &str) -> Option<Cow<'_, str>> {
    percent_decode_str(url).decode_utf8().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_query() {
        assert_eq!(strip_query("/base/a.js.map?v=1"), "/base/a.js.map");
        assert_eq!(strip_query("/base/a.js#frag"), "/base/a.js");
        assert_eq!(strip_query("/base/a.js?x#y"), "/base/a.js");
        assert_eq!(strip_query("/base/a.js"), "/base/a.js");
    }

    #[test]
    fn test_decode_url() {
        assert_eq!(decode_url("/base/my%20file.js").as_deref(), Some("/base/my file.js"));
        assert_eq!(decode_url("/plain").as_deref(), Some("/plain"));
        assert!(decode_url("/bad%FF").is_none());
    }
}
