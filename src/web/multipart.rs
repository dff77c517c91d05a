//! `multipart/form-data` value-field extraction.
//!
//! The body is read part by part through a fixed-size window. File parts are
//! streamed through and discarded; only value fields contribute parameters,
//! and their combined size is bounded by the configured in-memory limit.

use std::collections::HashMap;
use std::io::{self, Read};

use super::urlencoded::Pairs;

/// Bytes requested from the reader per fill.
const READ_CHUNK: usize = 8 * 1024;

/// Upper bound on the header block of a single part.
const MAX_PART_HEADER_BYTES: usize = 8 * 1024;

/// Errors that can occur while reading a multipart body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MultipartError {
    /// Content-Type is not `multipart/form-data`.
    #[error("content type is not multipart/form-data")]
    NotMultipart,
    /// Content-Type has no usable boundary parameter.
    #[error("missing boundary in multipart content type")]
    MissingBoundary,
    /// Value fields exceed the in-memory limit.
    #[error("multipart value fields too large: {size} bytes exceeds limit of {max}")]
    TooLarge {
        /// Bytes of value data seen so far.
        size: usize,
        /// The configured limit.
        max: usize,
    },
    /// A part has no `Content-Disposition` header or no `name`.
    #[error("part without a usable content-disposition")]
    InvalidContentDisposition,
    /// A part header block is not valid UTF-8 or is too long.
    #[error("invalid part headers")]
    InvalidPartHeaders,
    /// The body ended before the closing boundary.
    #[error("unexpected end of multipart body")]
    UnexpectedEof,
    /// Structural error in the body.
    #[error("invalid multipart format: {detail}")]
    InvalidFormat {
        /// What was expected.
        detail: &'static str,
    },
    /// The body stream failed.
    #[error("failed to read multipart body: {kind}")]
    Read {
        /// Kind of the underlying I/O error.
        kind: io::ErrorKind,
    },
}

/// Extracts the boundary from a `multipart/form-data` Content-Type value.
///
/// # Errors
///
/// Returns `NotMultipart` for other media types and `MissingBoundary` when the
/// boundary parameter is absent or empty.
pub fn parse_boundary(content_type: &str) -> Result<String, MultipartError> {
    let mut params = content_type.split(';');
    let media = params.next().unwrap_or_default().trim();
    if !media.eq_ignore_ascii_case("multipart/form-data") {
        return Err(MultipartError::NotMultipart);
    }

    params
        .filter_map(|param| param.trim().split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| unquote(value))
        .filter(|boundary| !boundary.is_empty())
        .ok_or(MultipartError::MissingBoundary)
}

/// Boundary-based reader for multipart value fields.
#[derive(Debug)]
pub struct MultipartParser {
    boundary: Vec<u8>,
    memory_limit: usize,
}

impl MultipartParser {
    /// Creates a parser for `boundary` holding at most `memory_limit` bytes of
    /// value data.
    pub fn new(boundary: &str, memory_limit: usize) -> Self {
        Self {
            boundary: format!("--{boundary}").into_bytes(),
            memory_limit,
        }
    }

    /// Parses every value field of an in-memory body.
    ///
    /// # Errors
    ///
    /// See [`MultipartParser::parse_reader`].
    pub fn parse(&self, body: &[u8]) -> Result<Pairs, MultipartError> {
        self.parse_reader(body)
    }

    /// Parses every value field from a body stream, grouped by field name in
    /// first-appearance order. Reading stops at the closing boundary.
    ///
    /// # Errors
    ///
    /// Returns `MultipartError` on malformed structure, on a failing stream or
    /// when value fields exceed the memory limit.
    pub fn parse_reader<R: Read>(&self, reader: R) -> Result<Pairs, MultipartError> {
        self.parse_stream(&mut Scanner::new(reader))
    }

    fn parse_stream<R: Read>(&self, input: &mut Scanner<R>) -> Result<Pairs, MultipartError> {
        let mut fields = Pairs::new();
        let mut held = 0usize;
        let delimiter = [b"\r\n".as_slice(), self.boundary.as_slice()].concat();

        input.read_until(&self.boundary, |_| Ok(()))?;
        loop {
            let head = input.peek(2)?;
            if head == b"--" {
                break;
            }
            if head != b"\r\n" {
                return Err(if head.len() < 2 {
                    MultipartError::UnexpectedEof
                } else {
                    MultipartError::InvalidFormat {
                        detail: "expected CRLF after boundary",
                    }
                });
            }
            input.consume(2);

            let headers = read_part_headers(input)?;
            let disposition = headers
                .get("content-disposition")
                .ok_or(MultipartError::InvalidContentDisposition)?;
            let (name, is_file) = parse_content_disposition(disposition)?;

            if is_file {
                input.read_until(&delimiter, |_| Ok(()))?;
                continue;
            }

            let max = self.memory_limit;
            let mut data = Vec::new();
            input.read_until(&delimiter, |chunk| {
                held += chunk.len();
                if held > max {
                    return Err(MultipartError::TooLarge { size: held, max });
                }
                data.extend_from_slice(chunk);
                Ok(())
            })?;
            fields
                .entry(name)
                .or_default()
                .push(String::from_utf8_lossy(&data).into_owned());
        }

        Ok(fields)
    }
}

/// Read window over a body stream. Consumed bytes are dropped on each fill, so
/// the buffer stays near `READ_CHUNK` plus one delimiter.
struct Scanner<R> {
    reader: R,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<R: Read> Scanner<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(READ_CHUNK),
            pos: 0,
            eof: false,
        }
    }

    /// Appends the next chunk of input. Returns `false` at end of stream.
    fn fill(&mut self) -> Result<bool, MultipartError> {
        if self.eof {
            return Ok(false);
        }
        self.buf.drain(..self.pos);
        self.pos = 0;

        let start = self.buf.len();
        self.buf.resize(start + READ_CHUNK, 0);
        loop {
            match self.reader.read(&mut self.buf[start..]) {
                Ok(n) => {
                    self.buf.truncate(start + n);
                    self.eof = n == 0;
                    return Ok(n > 0);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    self.buf.truncate(start);
                    return Err(MultipartError::Read { kind: err.kind() });
                }
            }
        }
    }

    /// Returns up to `n` unconsumed bytes, fewer only at end of stream.
    fn peek(&mut self, n: usize) -> Result<&[u8], MultipartError> {
        while self.buf.len() - self.pos < n && self.fill()? {}
        let end = self.buf.len().min(self.pos + n);
        Ok(&self.buf[self.pos..end])
    }

    fn consume(&mut self, n: usize) {
        self.pos += n;
    }

    /// Feeds every byte before `delim` to `sink` and consumes the delimiter.
    fn read_until<F>(&mut self, delim: &[u8], mut sink: F) -> Result<(), MultipartError>
    where
        F: FnMut(&[u8]) -> Result<(), MultipartError>,
    {
        loop {
            let pending = &self.buf[self.pos..];
            if let Some(at) = find(pending, delim) {
                sink(&pending[..at])?;
                self.pos += at + delim.len();
                return Ok(());
            }

            // A delimiter may straddle the next fill.
            let keep = delim.len().saturating_sub(1).min(pending.len());
            let flushed = pending.len() - keep;
            sink(&pending[..flushed])?;
            self.pos += flushed;

            if !self.fill()? {
                return Err(MultipartError::UnexpectedEof);
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn read_part_headers<R: Read>(
    input: &mut Scanner<R>,
) -> Result<HashMap<String, String>, MultipartError> {
    if input.peek(2)? == b"\r\n" {
        input.consume(2);
        return Ok(HashMap::new());
    }

    let mut block = Vec::new();
    input.read_until(b"\r\n\r\n", |chunk| {
        if block.len() + chunk.len() > MAX_PART_HEADER_BYTES {
            return Err(MultipartError::InvalidPartHeaders);
        }
        block.extend_from_slice(chunk);
        Ok(())
    })?;

    let block = std::str::from_utf8(&block).map_err(|_| MultipartError::InvalidPartHeaders)?;
    Ok(block
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect())
}

/// Returns the field name and whether the part is a file upload.
fn parse_content_disposition(value: &str) -> Result<(String, bool), MultipartError> {
    let mut name = None;
    let mut is_file = false;

    for param in value.split(';').skip(1) {
        let Some((key, raw)) = param.trim().split_once('=') else {
            continue;
        };
        if key.eq_ignore_ascii_case("name") {
            name = Some(unquote(raw));
        } else if key.eq_ignore_ascii_case("filename") {
            is_file = true;
        }
    }

    name.map(|name| (name, is_file))
        .ok_or(MultipartError::InvalidContentDisposition)
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(s)
        .to_string()
}
