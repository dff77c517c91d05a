//! The validation gateway: the contract between the binding pipeline and a
//! rule-based validator.

use std::fmt;

use crate::collector::ParamMap;
use crate::context::ValidationContext;

/// Category of a validation failure.
///
/// Every kind carries a default status code (see [`code`](Self::code)); rule
/// sets may override the code per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// A required field is absent or empty.
    Missing,
    /// A value could not be coerced to the declared type.
    InvalidType,
    /// A numeric value lies outside its declared range.
    OutOfRange,
    /// A value is not one of the allowed values.
    NotAllowed,
    /// A value does not match its declared format.
    InvalidFormat,
    /// The validation deadline passed before validation ran.
    DeadlineExceeded,
    /// Rejected for any other reason (custom checks, placeholder validators).
    Rejected,
}

impl ViolationKind {
    /// Default status code reported for this kind.
    pub fn code(self) -> i32 {
        match self {
            Self::Rejected => 1000,
            Self::Missing => 1001,
            Self::InvalidType => 1002,
            Self::OutOfRange => 1003,
            Self::NotAllowed => 1004,
            Self::InvalidFormat => 1005,
            Self::DeadlineExceeded => 1006,
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing field"),
            Self::InvalidType => write!(f, "invalid type"),
            Self::OutOfRange => write!(f, "out of range"),
            Self::NotAllowed => write!(f, "value not allowed"),
            Self::InvalidFormat => write!(f, "invalid format"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A validation failure reported by a [`Validator`].
///
/// Carries a status code meaningful to the caller. The message names the
/// field and the broken constraint but never echoes the offending value.
///
/// # Examples
///
/// ```
/// use param_bind::{Violation, ViolationKind};
///
/// let violation = Violation::new(ViolationKind::Missing, "field is required").on_field("name");
/// assert_eq!(violation.code(), 1001);
/// assert_eq!(violation.field(), Some("name"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Violation {
    kind: ViolationKind,
    code: i32,
    field: Option<String>,
    message: String,
}

impl Violation {
    /// Creates a violation with the kind's default status code.
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code(),
            field: None,
            message: message.into(),
        }
    }

    /// Attaches the offending field key.
    pub fn on_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Overrides the status code.
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    /// Returns the violation kind.
    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    /// Returns the status code.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Returns the offending field, if known.
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Returns the human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The outcome of a successful validation: coerced values plus a status code.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    values: ParamMap,
    code: i32,
}

impl Validated {
    /// Wraps a validator's output mapping and status code.
    pub fn new(values: ParamMap, code: i32) -> Self {
        Self { values, code }
    }

    /// Borrows the coerced values.
    pub fn values(&self) -> &ParamMap {
        &self.values
    }

    /// Returns the status code reported on success.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Splits into values and status code.
    pub fn into_parts(self) -> (ParamMap, i32) {
        (self.values, self.code)
    }
}

/// A rule-based validator consumed by the binding pipeline.
///
/// Implementations receive the canonical mapping by reference and must treat
/// it as read-only; the pipeline relies on this to echo the untouched raw
/// mapping when validation fails.
///
/// # Invariants
///
/// Implementations MUST:
/// - On success, return every rule-declared field coerced to the type its
///   rule demands, with declared defaults applied to absent optional fields
/// - On failure, return a `Violation` whose code classifies the failure
/// - Be safe to call concurrently with the same `Rules` value
///
/// # Examples
///
/// ```
/// use param_bind::{ParamMap, Validated, Validator, Violation};
///
/// struct NonEmpty;
///
/// impl Validator for NonEmpty {
///     type Rules = ();
///
///     fn validate(&self, params: &ParamMap, _rules: &()) -> Result<Validated, Violation> {
///         if params.is_empty() {
///             return Err(Violation::new(param_bind::ViolationKind::Missing, "no parameters"));
///         }
///         Ok(Validated::new(params.clone(), 0))
///     }
/// }
///
/// assert!(NonEmpty.validate(&ParamMap::new(), &()).is_err());
/// ```
pub trait Validator {
    /// The immutable rule configuration this validator understands.
    type Rules: ?Sized;

    /// Validates and coerces `params` against `rules`.
    ///
    /// # Errors
    ///
    /// Returns a `Violation` carrying the failure classification.
    fn validate(&self, params: &ParamMap, rules: &Self::Rules) -> Result<Validated, Violation>;

    /// Context-aware overload of [`validate`](Self::validate).
    ///
    /// The default implementation fails with
    /// [`ViolationKind::DeadlineExceeded`] when the context's deadline has
    /// passed and otherwise ignores the context.
    ///
    /// # Errors
    ///
    /// Returns a `Violation` carrying the failure classification.
    fn validate_in(
        &self,
        ctx: &ValidationContext,
        params: &ParamMap,
        rules: &Self::Rules,
    ) -> Result<Validated, Violation> {
        ctx.check_deadline()?;
        self.validate(params, rules)
    }
}

impl<V: Validator + ?Sized> Validator for &V {
    type Rules = V::Rules;

    fn validate(&self, params: &ParamMap, rules: &Self::Rules) -> Result<Validated, Violation> {
        (**self).validate(params, rules)
    }

    fn validate_in(
        &self,
        ctx: &ValidationContext,
        params: &ParamMap,
        rules: &Self::Rules,
    ) -> Result<Validated, Violation> {
        (**self).validate_in(ctx, params, rules)
    }
}

/// A validator that accepts the mapping unchanged with status code `0`.
///
/// **WARNING:** performs NO validation. Useful for tests and for endpoints
/// that only want the merged parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl Validator for PassThrough {
    type Rules = ();

    fn validate(&self, params: &ParamMap, _rules: &()) -> Result<Validated, Violation> {
        Ok(Validated::new(params.clone(), 0))
    }
}

/// A validator that rejects every mapping (for testing error paths).
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectAll;

impl Validator for RejectAll {
    type Rules = ();

    fn validate(&self, _params: &ParamMap, _rules: &()) -> Result<Validated, Violation> {
        Err(Violation::new(ViolationKind::Rejected, "rejected by validator"))
    }
}
