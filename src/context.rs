use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::validate::{Violation, ViolationKind};

/// Caller-scoped values and an optional deadline for one validation call.
///
/// `ValidationContext` is passed explicitly to the context-aware binding
/// variants and from there to [`Validator::validate_in`]. It replaces any
/// ambient per-request key/value bag: whatever a custom check needs (tenant,
/// locale, the authenticated user id) travels here.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use param_bind::ValidationContext;
///
/// let ctx = ValidationContext::new()
///     .with_value("tenant", "acme")
///     .with_timeout(Duration::from_millis(250));
///
/// assert_eq!(ctx.value("tenant").and_then(|v| v.as_str()), Some("acme"));
/// assert!(!ctx.is_expired());
/// ```
///
/// [`Validator::validate_in`]: crate::Validator::validate_in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationContext {
    values: BTreeMap<String, Value>,
    deadline: Option<Instant>,
}

impl ValidationContext {
    /// Creates an empty context with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a caller-scoped value.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Sets an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Looks up a caller-scoped value.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Iterates over all caller-scoped values.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` once the deadline has been reached.
    pub fn is_expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fails with [`ViolationKind::DeadlineExceeded`] once the deadline has
    /// been reached.
    ///
    /// # Errors
    ///
    /// Returns a `Violation` if the context has expired.
    pub fn check_deadline(&self) -> Result<(), Violation> {
        if self.is_expired() {
            return Err(Violation::new(
                ViolationKind::DeadlineExceeded,
                "validation deadline exceeded",
            ));
        }
        Ok(())
    }
}
