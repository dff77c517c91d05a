//! Parameter key normalization.

use std::sync::LazyLock;

use regex::Regex;

/// Pattern matching an array-style bracket suffix: `[`, zero or more digits, `]`.
pub const BRACKET_PATTERN: &str = r"\[\d*\]";

static BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(BRACKET_PATTERN).expect("bracket pattern is a valid regex"));

/// Strips every array-style bracket group from a parameter key.
///
/// Query-string and form keys such as `tags[]`, `tags[0]` and `tags[12]` all
/// collapse onto the base key `tags`, so repeated submissions of the same
/// logical parameter merge into one list. Brackets that contain anything other
/// than digits (for example `user[name]`) are left untouched.
///
/// Normalizing is idempotent, and a key without brackets comes back unchanged.
///
/// # Examples
///
/// ```
/// use param_bind::normalize_key;
///
/// assert_eq!(normalize_key("tags[]"), "tags");
/// assert_eq!(normalize_key("tags[12]"), "tags");
/// assert_eq!(normalize_key("matrix[0][1]"), "matrix");
/// assert_eq!(normalize_key("user[name]"), "user[name]");
/// ```
pub fn normalize_key(key: &str) -> String {
    BRACKET_RE.replace_all(key, "").into_owned()
}
