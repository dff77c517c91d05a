//! `application/x-www-form-urlencoded` parsing for query strings and form bodies.

use std::borrow::Cow;

use indexmap::IndexMap;
use percent_encoding::percent_decode;

/// Parsed pairs grouped by raw key, keys in first-appearance order and
/// values in submission order.
pub type Pairs = IndexMap<String, Vec<String>>;

/// Reasons a url-encoded string is rejected by [`parse`].
///
/// Errors report a byte offset rather than the offending text, which is
/// untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlEncodedError {
    /// A `%` not followed by two hex digits.
    #[error("invalid percent-escape at byte {offset}")]
    InvalidEscape {
        /// Byte offset of the `%` in the input.
        offset: usize,
    },
    /// A `;` used as a pair separator.
    #[error("invalid semicolon separator at byte {offset}")]
    Semicolon {
        /// Byte offset of the `;` in the input.
        offset: usize,
    },
}

/// Strictly parses a url-encoded string; the first malformed pair fails the
/// whole input.
///
/// # Errors
///
/// Returns `UrlEncodedError` on a bad percent-escape or a `;` separator.
///
/// # Examples
///
/// ```
/// use param_bind::web::urlencoded;
///
/// let pairs = urlencoded::parse("tags[]=a&tags[]=b&name=k+v").unwrap();
/// assert_eq!(pairs["tags[]"], vec!["a", "b"]);
/// assert_eq!(pairs["name"], vec!["k v"]);
///
/// assert!(urlencoded::parse("bad=%zz").is_err());
/// ```
pub fn parse(input: &str) -> Result<Pairs, UrlEncodedError> {
    let mut pairs = Pairs::new();
    for segment in segments(input) {
        let (key, value) = segment?;
        pairs.entry(key).or_default().push(value);
    }
    Ok(pairs)
}

/// Parses a url-encoded string, silently skipping malformed pairs.
pub fn parse_lenient(input: &str) -> Pairs {
    let mut pairs = Pairs::new();
    for (key, value) in segments(input).filter_map(Result::ok) {
        pairs.entry(key).or_default().push(value);
    }
    pairs
}

fn segments(input: &str) -> impl Iterator<Item = Result<(String, String), UrlEncodedError>> + '_ {
    let mut offset = 0;
    input.split('&').filter_map(move |segment| {
        let start = offset;
        offset += segment.len() + 1;
        if segment.is_empty() {
            return None;
        }
        if let Some(pos) = segment.find(';') {
            return Some(Err(UrlEncodedError::Semicolon { offset: start + pos }));
        }
        let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
        let value_start = start + key.len() + 1;
        Some(decode_component(key, start).and_then(|key| {
            decode_component(value, value_start).map(|value| (key, value))
        }))
    })
}

fn decode_component(raw: &str, start: usize) -> Result<String, UrlEncodedError> {
    let bytes = raw.as_bytes();
    for (i, _) in raw.match_indices('%') {
        let hex = bytes.get(i + 1..i + 3);
        if !hex.is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit)) {
            return Err(UrlEncodedError::InvalidEscape { offset: start + i });
        }
    }
    let spaced: Cow<'_, str> = if raw.contains('+') {
        Cow::Owned(raw.replace('+', " "))
    } else {
        Cow::Borrowed(raw)
    };
    Ok(percent_decode(spaced.as_bytes())
        .decode_utf8_lossy()
        .into_owned())
}
