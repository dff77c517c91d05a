//! The binding pipeline: extract, merge, validate, decode.

use serde::de::DeserializeOwned;

use super::extract::{self, Sources};
use super::request::BindRequest;
use crate::collector::ParamMap;
use crate::config::BindConfig;
use crate::context::ValidationContext;
use crate::decode;
use crate::error::BindError;
use crate::logging::BindLog;
use crate::snapshot::RawSnapshot;
use crate::validate::{Validated, Validator};

/// A successfully bound value and the validator's status code.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound<T> {
    /// The validated mapping or decoded destination.
    pub value: T,
    /// Status code reported by the validator.
    pub code: i32,
}

/// Failure of a raw-echo binding.
///
/// `raw` holds the canonical mapping as it stood before validation whenever
/// extraction succeeded, so both validation and decode failures carry it.
/// Extraction failures have nothing to echo.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct Rejection {
    /// What went wrong.
    #[source]
    pub error: BindError,
    /// The pre-validation mapping, if one was built.
    pub raw: Option<RawSnapshot>,
}

impl Rejection {
    /// Status code of the underlying error.
    pub fn status_code(&self) -> i32 {
        self.error.status_code()
    }
}

impl From<BindError> for Rejection {
    fn from(error: BindError) -> Self {
        Self { error, raw: None }
    }
}

/// Pipeline orchestrator binding request parameters through a validator.
///
/// A `Binder` borrows its validator and rules; the same rules can back any
/// number of binders on any number of threads. Each call owns its own
/// collector and reads the request body at most once.
///
/// Every call comes in three shapes: the validated mapping
/// ([`bind_map`](Self::bind_map)), a decoded destination
/// ([`bind`](Self::bind)), and a decoded destination that echoes the raw
/// mapping on failure ([`bind_raw`](Self::bind_raw)). Attaching a
/// [`ValidationContext`] routes validation through
/// [`Validator::validate_in`].
///
/// # Examples
///
/// ```
/// use param_bind::{Binder, BindRequest, FieldRule, RuleSet, RuleValidator};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Params {
///     name: String,
///     data: i64,
/// }
///
/// let rules = RuleSet::new()
///     .rule(FieldRule::new("name").required().string())
///     .rule(FieldRule::new("data").from("x-data-id").required().int());
///
/// let mut req = BindRequest::new("req-1")
///     .with_method("POST")
///     .with_header("Content-Type", "application/json")
///     .with_header("X-Data-Id", "1")
///     .with_body(r#"{"name":"k"}"#);
///
/// let bound = Binder::new(&RuleValidator, &rules)
///     .bind_json::<Params>(&mut req)
///     .unwrap();
/// assert_eq!(bound.value.name, "k");
/// assert_eq!(bound.value.data, 1);
/// assert_eq!(bound.code, 0);
/// ```
pub struct Binder<'a, V: Validator> {
    validator: &'a V,
    rules: &'a V::Rules,
    config: BindConfig,
    context: Option<&'a ValidationContext>,
}

impl<'a, V: Validator> Binder<'a, V> {
    /// Creates a binder with the default configuration and no context.
    pub fn new(validator: &'a V, rules: &'a V::Rules) -> Self {
        Self {
            validator,
            rules,
            config: BindConfig::default(),
            context: None,
        }
    }

    /// Replaces the pipeline configuration.
    #[must_use]
    pub fn config(mut self, config: BindConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates through [`Validator::validate_in`] with `ctx`.
    #[must_use]
    pub fn context(mut self, ctx: &'a ValidationContext) -> Self {
        self.context = Some(ctx);
        self
    }

    /// Extracts and merges the selected sources without validating.
    ///
    /// # Errors
    ///
    /// Returns `BindError::Extract` if a source cannot be read or parsed.
    pub fn collect(&self, req: &mut BindRequest, sources: Sources) -> Result<ParamMap, BindError> {
        let request_id = req.request_id().to_owned();
        let log = BindLog::new(&request_id);
        let collector = extract::extract(req, sources, &self.config, log).map_err(|err| {
            let err = BindError::from(err);
            log.rejected("extract", &err);
            err
        })?;
        Ok(collector.into_mapping())
    }

    /// Binds the selected sources into the validated mapping.
    ///
    /// # Errors
    ///
    /// Returns `BindError` if extraction or validation fails.
    pub fn bind_map(
        &self,
        req: &mut BindRequest,
        sources: Sources,
    ) -> Result<Bound<ParamMap>, BindError> {
        let request_id = req.request_id().to_owned();
        let log = BindLog::new(&request_id);
        let (validated, _) = self.run(req, sources, log).map_err(|rejection| rejection.error)?;
        let (value, code) = validated.into_parts();
        log.bound(value.len(), code);
        Ok(Bound { value, code })
    }

    /// Binds the selected sources and decodes the validated mapping into `T`.
    ///
    /// # Errors
    ///
    /// Returns `BindError` if extraction, validation or decoding fails.
    pub fn bind<T: DeserializeOwned>(
        &self,
        req: &mut BindRequest,
        sources: Sources,
    ) -> Result<Bound<T>, BindError> {
        self.bind_raw(req, sources).map_err(|rejection| rejection.error)
    }

    /// Like [`bind`](Self::bind), but a failure after extraction carries the
    /// raw pre-validation mapping.
    ///
    /// # Errors
    ///
    /// Returns a `Rejection` if extraction, validation or decoding fails.
    pub fn bind_raw<T: DeserializeOwned>(
        &self,
        req: &mut BindRequest,
        sources: Sources,
    ) -> Result<Bound<T>, Rejection> {
        let request_id = req.request_id().to_owned();
        let log = BindLog::new(&request_id);
        let (validated, raw) = self.run(req, sources, log)?;
        let (values, code) = validated.into_parts();
        let fields = values.len();

        match decode::decode(values) {
            Ok(value) => {
                log.bound(fields, code);
                Ok(Bound { value, code })
            }
            Err(err) => {
                let error = BindError::from(err);
                log.rejected("decode", &error);
                Err(Rejection {
                    error,
                    raw: Some(raw),
                })
            }
        }
    }

    /// [`bind_map`](Self::bind_map) over [`Sources::JSON`].
    ///
    /// # Errors
    ///
    /// See [`bind_map`](Self::bind_map).
    pub fn bind_json_map(&self, req: &mut BindRequest) -> Result<Bound<ParamMap>, BindError> {
        self.bind_map(req, Sources::JSON)
    }

    /// [`bind`](Self::bind) over [`Sources::JSON`].
    ///
    /// # Errors
    ///
    /// See [`bind`](Self::bind).
    pub fn bind_json<T: DeserializeOwned>(
        &self,
        req: &mut BindRequest,
    ) -> Result<Bound<T>, BindError> {
        self.bind(req, Sources::JSON)
    }

    /// [`bind_raw`](Self::bind_raw) over [`Sources::JSON`].
    ///
    /// # Errors
    ///
    /// See [`bind_raw`](Self::bind_raw).
    pub fn bind_json_raw<T: DeserializeOwned>(
        &self,
        req: &mut BindRequest,
    ) -> Result<Bound<T>, Rejection> {
        self.bind_raw(req, Sources::JSON)
    }

    /// [`bind_map`](Self::bind_map) over [`Sources::QUERY`].
    ///
    /// # Errors
    ///
    /// See [`bind_map`](Self::bind_map).
    pub fn bind_query_map(&self, req: &mut BindRequest) -> Result<Bound<ParamMap>, BindError> {
        self.bind_map(req, Sources::QUERY)
    }

    /// [`bind`](Self::bind) over [`Sources::QUERY`].
    ///
    /// # Errors
    ///
    /// See [`bind`](Self::bind).
    pub fn bind_query<T: DeserializeOwned>(
        &self,
        req: &mut BindRequest,
    ) -> Result<Bound<T>, BindError> {
        self.bind(req, Sources::QUERY)
    }

    /// [`bind_raw`](Self::bind_raw) over [`Sources::QUERY`].
    ///
    /// # Errors
    ///
    /// See [`bind_raw`](Self::bind_raw).
    pub fn bind_query_raw<T: DeserializeOwned>(
        &self,
        req: &mut BindRequest,
    ) -> Result<Bound<T>, Rejection> {
        self.bind_raw(req, Sources::QUERY)
    }

    /// [`bind_map`](Self::bind_map) over [`Sources::FORM`].
    ///
    /// # Errors
    ///
    /// See [`bind_map`](Self::bind_map).
    pub fn bind_form_map(&self, req: &mut BindRequest) -> Result<Bound<ParamMap>, BindError> {
        self.bind_map(req, Sources::FORM)
    }

    /// [`bind`](Self::bind) over [`Sources::FORM`].
    ///
    /// # Errors
    ///
    /// See [`bind`](Self::bind).
    pub fn bind_form<T: DeserializeOwned>(
        &self,
        req: &mut BindRequest,
    ) -> Result<Bound<T>, BindError> {
        self.bind(req, Sources::FORM)
    }

    /// [`bind_raw`](Self::bind_raw) over [`Sources::FORM`].
    ///
    /// # Errors
    ///
    /// See [`bind_raw`](Self::bind_raw).
    pub fn bind_form_raw<T: DeserializeOwned>(
        &self,
        req: &mut BindRequest,
    ) -> Result<Bound<T>, Rejection> {
        self.bind_raw(req, Sources::FORM)
    }

    /// Extracts, snapshots and validates. The snapshot is returned alongside
    /// the validated mapping so a later decode failure can echo it.
    fn run(
        &self,
        req: &mut BindRequest,
        sources: Sources,
        log: BindLog<'_>,
    ) -> Result<(Validated, RawSnapshot), Rejection> {
        let span = tracing::debug_span!("bind", request_id = %req.request_id(), ?sources);
        let _enter = span.enter();

        let collector = extract::extract(req, sources, &self.config, log).map_err(|err| {
            let error = BindError::from(err);
            log.rejected("extract", &error);
            Rejection::from(error)
        })?;
        let params = collector.into_mapping();

        let outcome = match self.context {
            Some(ctx) => self.validator.validate_in(ctx, &params, self.rules),
            None => self.validator.validate(&params, self.rules),
        };
        match outcome {
            Ok(validated) => Ok((validated, RawSnapshot::new(params))),
            Err(violation) => {
                let error = BindError::from(violation);
                log.rejected("validate", &error);
                Err(Rejection {
                    error,
                    raw: Some(RawSnapshot::new(params)),
                })
            }
        }
    }
}

impl<V: Validator> std::fmt::Debug for Binder<'_, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binder")
            .field("config", &self.config)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{FieldRule, RuleSet, RuleValidator};
    use crate::validate::{PassThrough, RejectAll, ViolationKind};
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Instant;

    #[derive(Debug, Deserialize)]
    struct Page {
        page: i64,
    }

    fn page_rules() -> RuleSet {
        RuleSet::new().rule(FieldRule::new("page").required().int().range(1, 100))
    }

    #[test]
    fn collect_merges_without_validating() {
        let mut req = BindRequest::new("r").with_query("a=1&a=2").with_header("A", "3");
        let map = Binder::new(&RejectAll, &()).collect(&mut req, Sources::QUERY).unwrap();
        assert_eq!(map["a"], json!(["1", "2", "3"]));
    }

    #[test]
    fn bind_map_returns_validated_values_and_code() {
        let rules = page_rules();
        let mut req = BindRequest::new("r").with_query("page=3&other=x");
        let bound = Binder::new(&RuleValidator, &rules)
            .bind_query_map(&mut req)
            .unwrap();

        assert_eq!(bound.code, 0);
        assert_eq!(bound.value.len(), 1);
        assert_eq!(bound.value["page"], json!(3));
    }

    #[test]
    fn validation_failure_reports_code() {
        let rules = page_rules();
        let mut req = BindRequest::new("r").with_query("page=500");
        let err = Binder::new(&RuleValidator, &rules)
            .bind_query::<Page>(&mut req)
            .unwrap_err();

        assert_eq!(err.violation().map(|v| v.kind()), Some(ViolationKind::OutOfRange));
        assert_eq!(err.status_code(), ViolationKind::OutOfRange.code());
    }

    #[test]
    fn raw_variant_echoes_pre_validation_mapping() {
        let rules = page_rules();
        let mut req = BindRequest::new("r")
            .with_query("page=abc&extra[]=1")
            .with_header("X-Id", "9");
        let rejection = Binder::new(&RuleValidator, &rules)
            .bind_query_raw::<Page>(&mut req)
            .unwrap_err();

        let raw = rejection.raw.unwrap();
        assert_eq!(raw.get("page"), Some(&json!("abc")));
        assert_eq!(raw.get("extra"), Some(&json!("1")));
        assert_eq!(raw.get("x-id"), Some(&json!("9")));
    }

    #[test]
    fn decode_failure_also_echoes_raw() {
        let mut req = BindRequest::new("r").with_query("page=abc");
        let rejection = Binder::new(&PassThrough, &())
            .bind_query_raw::<Page>(&mut req)
            .unwrap_err();

        assert!(matches!(rejection.error, BindError::Decode(_)));
        assert_eq!(rejection.status_code(), 0);
        assert_eq!(rejection.raw.unwrap().get("page"), Some(&json!("abc")));
    }

    #[test]
    fn extraction_failure_has_no_raw() {
        let mut req = BindRequest::new("r").with_body("{oops");
        let rejection = Binder::new(&PassThrough, &())
            .bind_json_raw::<serde_json::Value>(&mut req)
            .unwrap_err();

        assert!(matches!(rejection.error, BindError::Extract(_)));
        assert!(rejection.raw.is_none());
        assert_eq!(rejection.status_code(), 0);
    }

    #[test]
    fn rejection_displays_and_chains_its_error() {
        let mut req = BindRequest::new("r").with_query("page=0");
        let rules = page_rules();
        let rejection = Binder::new(&RuleValidator, &rules)
            .bind_query_raw::<Page>(&mut req)
            .unwrap_err();

        assert_eq!(rejection.to_string(), rejection.error.to_string());
        let source = std::error::Error::source(&rejection).unwrap();
        assert_eq!(source.to_string(), rejection.error.to_string());
    }

    #[test]
    fn oversized_body_is_rejected_before_validation() {
        let mut req = BindRequest::new("r").with_body(r#"{"page":1,"pad":"xxxxxxxx"}"#);
        let config = BindConfig::default().max_body_size(8);
        let rejection = Binder::new(&PassThrough, &())
            .config(config)
            .bind_json_raw::<serde_json::Value>(&mut req)
            .unwrap_err();

        assert!(matches!(
            rejection.error,
            BindError::Extract(crate::error::ExtractError::BodyTooLarge { limit: 8 })
        ));
        assert!(rejection.raw.is_none());
    }

    #[test]
    fn context_deadline_is_honoured() {
        let rules = page_rules();
        let ctx = ValidationContext::new().with_deadline(Instant::now());
        let mut req = BindRequest::new("r").with_query("page=1");
        let err = Binder::new(&RuleValidator, &rules)
            .context(&ctx)
            .bind_query_map(&mut req)
            .unwrap_err();

        assert_eq!(
            err.violation().map(|v| v.kind()),
            Some(ViolationKind::DeadlineExceeded)
        );
    }

    #[test]
    fn form_binding_with_custom_memory_limit() {
        let body = "--B\r\nContent-Disposition: form-data; name=\"page\"\r\n\r\n12\r\n--B--\r\n";
        let rules = page_rules();
        let binder = Binder::new(&RuleValidator, &rules);

        let mut req = BindRequest::new("r")
            .with_method("POST")
            .with_header("Content-Type", "multipart/form-data; boundary=B")
            .with_body(body);
        assert_eq!(binder.bind_form::<Page>(&mut req).unwrap().value.page, 12);

        let mut req = BindRequest::new("r")
            .with_method("POST")
            .with_header("Content-Type", "multipart/form-data; boundary=B")
            .with_body(body);
        let err = binder
            .config(BindConfig::new().multipart_memory_limit(1))
            .bind_form_map(&mut req)
            .unwrap_err();
        assert_eq!(
            err.violation().map(|v| v.kind()),
            Some(ViolationKind::Missing)
        );
    }
}
