use crate::error::BindError;
use crate::web::Source;

/// Request-scoped structured logging for one binding pipeline run.
///
/// Every event carries the request id so the stages of one request can be
/// correlated. Only key counts and outcomes are logged, never parameter
/// values: they are untrusted client input.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BindLog<'a> {
    request_id: &'a str,
}

impl<'a> BindLog<'a> {
    pub(crate) fn new(request_id: &'a str) -> Self {
        Self { request_id }
    }

    pub(crate) fn extracted(&self, source: Source, keys: usize) {
        tracing::debug!(
            request_id = %self.request_id,
            source = %source,
            keys,
            "extracted parameters"
        );
    }

    pub(crate) fn skipped(&self, source: Source, reason: &dyn std::fmt::Display) {
        tracing::debug!(
            request_id = %self.request_id,
            source = %source,
            reason = %reason,
            "source skipped"
        );
    }

    pub(crate) fn rejected(&self, stage: &'static str, error: &BindError) {
        tracing::warn!(
            request_id = %self.request_id,
            stage,
            code = error.status_code(),
            error = %error,
            "binding rejected"
        );
    }

    pub(crate) fn bound(&self, fields: usize, code: i32) {
        tracing::debug!(request_id = %self.request_id, fields, code, "parameters bound");
    }
}
