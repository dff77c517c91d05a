//! Source extractors feeding the shared parameter collector.
//!
//! Sources are always processed in the fixed order of [`Source::ORDER`], so
//! header contributions merge after body, query and form contributions for
//! the same key.

use std::fmt;
use std::io::Read;

use indexmap::IndexMap;

use super::multipart::{self, MultipartError, MultipartParser};
use super::request::{BindRequest, BodyReader};
use super::urlencoded::{self, Pairs};
use crate::collector::{ParamCollector, ParamMap};
use crate::config::BindConfig;
use crate::error::ExtractError;
use crate::key::normalize_key;
use crate::logging::BindLog;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// One input channel of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    /// JSON object body. Keys are taken verbatim.
    Body,
    /// URL query string. Bracket suffixes are stripped from keys.
    Query,
    /// URL-encoded form body and multipart value fields. Bracket suffixes are
    /// stripped from keys.
    Form,
    /// Request headers, keyed by lower-cased name.
    Header,
}

impl Source {
    /// Processing order of the sources.
    pub const ORDER: [Source; 4] = [Source::Body, Source::Query, Source::Form, Source::Header];

    const fn bit(self) -> u8 {
        match self {
            Source::Body => 1,
            Source::Query => 1 << 1,
            Source::Form => 1 << 2,
            Source::Header => 1 << 3,
        }
    }

    /// Lower-case name used in log events.
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Body => "body",
            Source::Query => "query",
            Source::Form => "form",
            Source::Header => "header",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A selection of sources to bind from.
///
/// Selection order is irrelevant: extraction always follows
/// [`Source::ORDER`].
///
/// # Examples
///
/// ```
/// use param_bind::{Source, Sources};
///
/// let sources = Sources::FORM.with(Source::Query);
/// assert!(sources.contains(Source::Form));
/// assert!(sources.contains(Source::Header));
/// assert_eq!(
///     sources.iter().collect::<Vec<_>>(),
///     vec![Source::Query, Source::Form, Source::Header]
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Sources(u8);

impl Sources {
    /// No sources.
    pub const NONE: Sources = Sources(0);
    /// JSON body plus headers.
    pub const JSON: Sources = Sources::NONE.with(Source::Body).with(Source::Header);
    /// Query string plus headers.
    pub const QUERY: Sources = Sources::NONE.with(Source::Query).with(Source::Header);
    /// Form body plus headers.
    pub const FORM: Sources = Sources::NONE.with(Source::Form).with(Source::Header);
    /// Every source.
    pub const ALL: Sources = Sources::JSON.with(Source::Query).with(Source::Form);

    /// Adds a source to the selection.
    #[must_use]
    pub const fn with(self, source: Source) -> Self {
        Sources(self.0 | source.bit())
    }

    /// Whether `source` is selected.
    pub const fn contains(self, source: Source) -> bool {
        self.0 & source.bit() != 0
    }

    /// Selected sources in processing order.
    pub fn iter(self) -> impl Iterator<Item = Source> {
        Source::ORDER.into_iter().filter(move |s| self.contains(*s))
    }

    fn reads_body(self) -> bool {
        self.contains(Source::Body) || self.contains(Source::Form)
    }
}

impl FromIterator<Source> for Sources {
    fn from_iter<I: IntoIterator<Item = Source>>(iter: I) -> Self {
        iter.into_iter().fold(Sources::NONE, Sources::with)
    }
}

/// The request body, read on first use and shared between the body and form
/// extractors.
struct BodyCache {
    reader: Option<BodyReader>,
    buf: Vec<u8>,
}

impl BodyCache {
    fn new(reader: Option<BodyReader>) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Reads the whole body, failing once it grows past `limit` bytes.
    fn bytes(&mut self, limit: usize) -> Result<&[u8], ExtractError> {
        if let Some(reader) = self.reader.take() {
            let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
            reader.take(cap).read_to_end(&mut self.buf)?;
        }
        if self.buf.len() > limit {
            return Err(ExtractError::BodyTooLarge { limit });
        }
        Ok(&self.buf)
    }

    /// Streams a body nobody has read yet, otherwise replays the cached bytes.
    fn parse_multipart(&mut self, parser: &MultipartParser) -> Result<Pairs, MultipartError> {
        match self.reader.take() {
            Some(reader) => parser.parse_reader(reader),
            None => parser.parse(&self.buf),
        }
    }
}

/// Runs every selected extractor against `req`, in processing order.
///
/// When a body-consuming source is selected the body stream is taken from the
/// request and dropped before returning, whatever the outcome.
pub(crate) fn extract(
    req: &mut BindRequest,
    sources: Sources,
    config: &BindConfig,
    log: BindLog<'_>,
) -> Result<ParamCollector, ExtractError> {
    let mut body = BodyCache::new(if sources.reads_body() {
        req.take_body()
    } else {
        None
    });
    let mut collector = ParamCollector::new();

    for source in sources.iter() {
        let keys = match source {
            Source::Body => extract_body(req, &mut body, config, &mut collector, log)?,
            Source::Query => extract_query(req, &mut collector),
            Source::Form => extract_form(req, &mut body, config, &mut collector, log)?,
            Source::Header => extract_headers(req, &mut collector),
        };
        log.extracted(source, keys);
    }

    Ok(collector)
}

fn extract_body(
    req: &BindRequest,
    body: &mut BodyCache,
    config: &BindConfig,
    collector: &mut ParamCollector,
    log: BindLog<'_>,
) -> Result<usize, ExtractError> {
    if let Some(media) = req.media_type() {
        if media == FORM_URLENCODED || media == MULTIPART_FORM_DATA {
            log.skipped(Source::Body, &media);
            return Ok(0);
        }
    }

    let bytes = body.bytes(config.get_max_body_size())?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(0);
    }

    let object: ParamMap = serde_json::from_slice(bytes)?;
    let keys = object.len();
    for (key, value) in object {
        collector.set_json(key, value);
    }
    Ok(keys)
}

fn extract_query(req: &BindRequest, collector: &mut ParamCollector) -> usize {
    set_pairs(collector, urlencoded::parse_lenient(req.query()))
}

fn extract_form(
    req: &BindRequest,
    body: &mut BodyCache,
    config: &BindConfig,
    collector: &mut ParamCollector,
    log: BindLog<'_>,
) -> Result<usize, ExtractError> {
    let method = req.method();
    if !["POST", "PUT", "PATCH"]
        .iter()
        .any(|m| method.eq_ignore_ascii_case(m))
    {
        log.skipped(Source::Form, &method);
        return Ok(0);
    }

    match req.media_type().as_deref() {
        Some(FORM_URLENCODED) => {
            let bytes = body.bytes(config.get_max_body_size())?;
            let pairs = urlencoded::parse(&String::from_utf8_lossy(bytes))?;
            Ok(set_pairs(collector, pairs))
        }
        Some(MULTIPART_FORM_DATA) => {
            let parsed = req
                .content_type()
                .map_or(Err(MultipartError::MissingBoundary), multipart::parse_boundary)
                .and_then(|boundary| {
                    let parser =
                        MultipartParser::new(&boundary, config.get_multipart_memory_limit());
                    body.parse_multipart(&parser)
                });
            match parsed {
                Ok(fields) => Ok(set_pairs(collector, fields)),
                Err(MultipartError::Read { kind }) => Err(ExtractError::Body(kind.into())),
                Err(err) => {
                    log.skipped(Source::Form, &err);
                    Ok(0)
                }
            }
        }
        _ => {
            log.skipped(Source::Form, &"not a form content type");
            Ok(0)
        }
    }
}

fn extract_headers(req: &BindRequest, collector: &mut ParamCollector) -> usize {
    let mut grouped: IndexMap<String, Vec<&str>> = IndexMap::new();
    for (name, value) in req.headers() {
        grouped
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.as_str());
    }

    let keys = grouped.len();
    for (name, values) in grouped {
        collector.set(name, vec![values.join(",")]);
    }
    keys
}

fn set_pairs(collector: &mut ParamCollector, pairs: Pairs) -> usize {
    let keys = pairs.len();
    for (key, values) in pairs {
        collector.set(normalize_key(&key), values);
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::RawValue;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn run(req: &mut BindRequest, sources: Sources) -> Result<ParamCollector, ExtractError> {
        extract(req, sources, &BindConfig::default(), BindLog::new("test"))
    }

    fn scalar(collector: &ParamCollector, key: &str) -> Option<String> {
        collector.get(key).and_then(RawValue::as_scalar).map(str::to_string)
    }

    fn list(collector: &ParamCollector, key: &str) -> Option<Vec<String>> {
        collector.get(key).and_then(RawValue::as_list).map(<[String]>::to_vec)
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        }
    }

    /// Reader that records how many bytes were pulled from it.
    struct CountingReader<R> {
        inner: R,
        read: Arc<AtomicUsize>,
    }

    impl<R: Read> Read for CountingReader<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.inner.read(buf)?;
            self.read.fetch_add(n, Ordering::Relaxed);
            Ok(n)
        }
    }

    fn counted<R: Read>(inner: R) -> (CountingReader<R>, Arc<AtomicUsize>) {
        let read = Arc::new(AtomicUsize::new(0));
        let reader = CountingReader {
            inner,
            read: Arc::clone(&read),
        };
        (reader, read)
    }

    #[test]
    fn presets_cover_expected_sources() {
        assert_eq!(Sources::JSON.iter().collect::<Vec<_>>(), vec![Source::Body, Source::Header]);
        assert_eq!(Sources::QUERY.iter().collect::<Vec<_>>(), vec![Source::Query, Source::Header]);
        assert_eq!(Sources::FORM.iter().collect::<Vec<_>>(), vec![Source::Form, Source::Header]);
        assert_eq!(Sources::ALL.iter().count(), 4);
        assert_eq!(Sources::NONE.iter().count(), 0);
    }

    #[test]
    fn sources_from_iter_ignores_order() {
        let sources: Sources = [Source::Header, Source::Query].into_iter().collect();
        assert_eq!(sources, Sources::QUERY);
    }

    #[test]
    fn query_single_values_are_scalars() {
        let mut req = BindRequest::new("r").with_query("page=1&tags[]=a&tags[]=b&bad=%zz");
        let collector = run(&mut req, Sources::NONE.with(Source::Query)).unwrap();

        assert_eq!(scalar(&collector, "page").as_deref(), Some("1"));
        assert_eq!(list(&collector, "tags"), Some(vec!["a".to_string(), "b".to_string()]));
        assert!(!collector.contains_key("bad"));
    }

    #[test]
    fn headers_are_lowercased_and_joined() {
        let mut req = BindRequest::new("r")
            .with_header("X-Tag", "a")
            .with_header("x-tag", "b")
            .with_header("X-Data-Id", "1");
        let collector = run(&mut req, Sources::NONE.with(Source::Header)).unwrap();

        assert_eq!(scalar(&collector, "x-tag").as_deref(), Some("a,b"));
        assert_eq!(scalar(&collector, "x-data-id").as_deref(), Some("1"));
    }

    #[test]
    fn header_colliding_with_query_makes_list() {
        let mut req = BindRequest::new("r")
            .with_query("token=q")
            .with_header("Token", "h");
        let collector = run(&mut req, Sources::QUERY).unwrap();

        assert_eq!(list(&collector, "token"), Some(vec!["q".to_string(), "h".to_string()]));
    }

    #[test]
    fn json_body_keys_are_not_normalized() {
        let mut req = BindRequest::new("r").with_body(r#"{"a[0]": 1, "name": "k"}"#);
        let collector = run(&mut req, Sources::JSON).unwrap();

        let map = collector.into_mapping();
        assert!(map.contains_key("a[0]"));
        assert_eq!(map["name"], serde_json::json!("k"));
    }

    #[test]
    fn empty_or_missing_body_is_empty_object() {
        let mut req = BindRequest::new("r").with_body("  \n");
        assert!(run(&mut req, Sources::JSON).unwrap().is_empty());

        let mut req = BindRequest::new("r");
        assert!(run(&mut req, Sources::JSON).unwrap().is_empty());
    }

    #[test]
    fn malformed_json_is_extract_error() {
        let mut req = BindRequest::new("r").with_body("{\"a\":");
        assert!(matches!(run(&mut req, Sources::JSON), Err(ExtractError::Json(_))));
        assert!(!req.has_body());

        let mut req = BindRequest::new("r").with_body("[1, 2]");
        assert!(matches!(run(&mut req, Sources::JSON), Err(ExtractError::Json(_))));
    }

    #[test]
    fn body_read_failure_is_extract_error() {
        let mut req = BindRequest::new("r").with_reader(FailingReader);
        assert!(matches!(run(&mut req, Sources::JSON), Err(ExtractError::Body(_))));
        assert!(!req.has_body());
    }

    #[test]
    fn urlencoded_form_is_parsed_for_post() {
        let mut req = BindRequest::new("r")
            .with_method("POST")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body("ids[]=1&ids[]=2&name=k");
        let collector = run(&mut req, Sources::NONE.with(Source::Form)).unwrap();

        assert_eq!(list(&collector, "ids"), Some(vec!["1".to_string(), "2".to_string()]));
        assert_eq!(scalar(&collector, "name").as_deref(), Some("k"));
    }

    #[test]
    fn form_body_ignored_for_get() {
        let mut req = BindRequest::new("r")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body("name=k");
        let collector = run(&mut req, Sources::NONE.with(Source::Form)).unwrap();
        assert!(collector.is_empty());
    }

    #[test]
    fn malformed_urlencoded_form_aborts() {
        let mut req = BindRequest::new("r")
            .with_method("PUT")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body("name=%zz");
        assert!(matches!(
            run(&mut req, Sources::FORM),
            Err(ExtractError::Form(_))
        ));
    }

    #[test]
    fn malformed_multipart_is_skipped() {
        let mut req = BindRequest::new("r")
            .with_method("POST")
            .with_header("Content-Type", "multipart/form-data; boundary=XYZ")
            .with_header("X-Id", "7")
            .with_body("garbage");
        let collector = run(&mut req, Sources::FORM).unwrap();

        assert_eq!(collector.len(), 2);
        assert_eq!(scalar(&collector, "x-id").as_deref(), Some("7"));
    }

    #[test]
    fn multipart_over_memory_limit_is_skipped() {
        let body = "--XYZ\r\nContent-Disposition: form-data; name=\"big\"\r\n\r\n\
                    0123456789\r\n--XYZ--\r\n";
        let mut req = BindRequest::new("r")
            .with_method("POST")
            .with_header("Content-Type", "multipart/form-data; boundary=XYZ")
            .with_body(body);
        let config = BindConfig::default().multipart_memory_limit(4);
        let collector =
            extract(&mut req, Sources::NONE.with(Source::Form), &config, BindLog::new("r"))
                .unwrap();
        assert!(collector.is_empty());
    }

    #[test]
    fn body_is_read_once_for_body_and_form() {
        let mut req = BindRequest::new("r")
            .with_method("POST")
            .with_body(r#"{"name":"k"}"#);
        let sources = Sources::NONE.with(Source::Body).with(Source::Form);
        let collector = run(&mut req, sources).unwrap();

        assert_eq!(collector.len(), 1);
        assert!(!req.has_body());
    }

    #[test]
    fn form_content_type_skips_json_body() {
        let mut req = BindRequest::new("r")
            .with_method("POST")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body("name=k");
        let collector = run(&mut req, Sources::ALL).unwrap();

        assert_eq!(scalar(&collector, "name").as_deref(), Some("k"));
    }

    #[test]
    fn body_is_left_alone_when_not_selected() {
        let mut req = BindRequest::new("r").with_body("{}").with_query("a=1");
        run(&mut req, Sources::QUERY).unwrap();
        assert!(req.has_body());
    }

    #[test]
    fn oversized_urlencoded_body_stops_at_limit() {
        let (reader, read) = counted(io::repeat(b'a').take(2 * 1024 * 1024));
        let mut req = BindRequest::new("r")
            .with_method("POST")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_reader(reader);
        let config = BindConfig::default().max_body_size(1024);

        let err = extract(&mut req, Sources::FORM, &config, BindLog::new("r")).unwrap_err();
        assert!(matches!(err, ExtractError::BodyTooLarge { limit: 1024 }));
        assert!(read.load(Ordering::Relaxed) <= 1025);
    }

    #[test]
    fn oversized_json_body_stops_at_limit() {
        let (reader, read) = counted(io::repeat(b' ').take(2 * 1024 * 1024));
        let mut req = BindRequest::new("r").with_reader(reader);
        let config = BindConfig::default().max_body_size(1024);

        let err = extract(&mut req, Sources::JSON, &config, BindLog::new("r")).unwrap_err();
        assert!(matches!(err, ExtractError::BodyTooLarge { limit: 1024 }));
        assert!(read.load(Ordering::Relaxed) <= 1025);
    }

    #[test]
    fn body_at_limit_is_accepted() {
        let mut req = BindRequest::new("r").with_body(r#"{"a":1}"#);
        let config = BindConfig::default().max_body_size(7);
        let collector = extract(&mut req, Sources::JSON, &config, BindLog::new("r")).unwrap();
        assert!(collector.contains_key("a"));
    }

    #[test]
    fn multipart_file_part_is_streamed_not_capped() {
        let head = "--XYZ\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nhi\r\n--XYZ\r\n\
                    Content-Disposition: form-data; name=\"f\"; filename=\"a.bin\"\r\n\r\n";
        let body = io::Cursor::new(head)
            .chain(io::repeat(b'x').take(2 * 1024 * 1024))
            .chain(io::Cursor::new("\r\n--XYZ--\r\n"));
        let (reader, read) = counted(body);
        let mut req = BindRequest::new("r")
            .with_method("POST")
            .with_header("Content-Type", "multipart/form-data; boundary=XYZ")
            .with_reader(reader);
        let config = BindConfig::default().max_body_size(1024);

        let collector =
            extract(&mut req, Sources::NONE.with(Source::Form), &config, BindLog::new("r"))
                .unwrap();
        assert_eq!(scalar(&collector, "title").as_deref(), Some("hi"));
        assert!(read.load(Ordering::Relaxed) > 2 * 1024 * 1024);
    }

    #[test]
    fn multipart_read_failure_is_extract_error() {
        let mut req = BindRequest::new("r")
            .with_method("POST")
            .with_header("Content-Type", "multipart/form-data; boundary=XYZ")
            .with_reader(FailingReader);
        let err = run(&mut req, Sources::FORM).unwrap_err();
        assert!(matches!(err, ExtractError::Body(_)));
    }
}
