//! A declarative rule set and the bundled validator that evaluates it.
//!
//! Each [`FieldRule`] names one destination field, where to read it from,
//! whether it must be present, and an ordered list of [`Check`]s. Checks both
//! constrain and coerce: `Int` turns `"2"` into the number `2`, `CommaInts`
//! turns `"1,2,3"` into `[1, 2, 3]`, and later checks see the coerced value.
//!
//! A [`RuleSet`] is immutable once built and is `Send + Sync`, so one
//! instance can back every request an endpoint serves.

use std::fmt;
use std::sync::{Arc, LazyLock};

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;

use crate::collector::ParamMap;
use crate::context::ValidationContext;
use crate::decode::{DATETIME_FORMAT, DATE_FORMAT};
use crate::validate::{Validated, Validator, Violation, ViolationKind};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));

/// Signature of a caller-supplied check.
///
/// Receives the current (possibly already coerced) value and the validation
/// context, and returns the value to pass on.
pub type CustomCheck =
    Arc<dyn Fn(Value, &ValidationContext) -> Result<Value, Violation> + Send + Sync>;

/// One constraint/coercion step applied to a field value.
#[derive(Clone)]
pub enum Check {
    /// Coerce to a 64-bit integer.
    Int,
    /// Coerce to a floating point number.
    Float,
    /// Coerce `true`/`false`/`1`/`0` to a boolean.
    Bool,
    /// Require a single string (numbers and booleans are stringified).
    Str,
    /// Coerce a scalar or list to a list of integers.
    IntList,
    /// Coerce a scalar or list to a list of strings.
    StrList,
    /// Split a comma-separated string into a list of integers.
    CommaInts,
    /// Require every number (or list element) to lie in `min..=max`.
    Range {
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },
    /// Require every number (or list element) to be one of the listed values.
    OneOf(Vec<i64>),
    /// Require a string length, in characters, within `min..=max`.
    Length {
        /// Inclusive minimum length.
        min: usize,
        /// Inclusive maximum length.
        max: usize,
    },
    /// Require a plausible e-mail address.
    Email,
    /// Require the string to match a regular expression.
    Pattern(Regex),
    /// Require a `YYYY-MM-DD HH:MM:SS` timestamp string.
    DateTime,
    /// Require a `YYYY-MM-DD` date string.
    Date,
    /// Run a caller-supplied check.
    Custom(CustomCheck),
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "Int"),
            Self::Float => write!(f, "Float"),
            Self::Bool => write!(f, "Bool"),
            Self::Str => write!(f, "Str"),
            Self::IntList => write!(f, "IntList"),
            Self::StrList => write!(f, "StrList"),
            Self::CommaInts => write!(f, "CommaInts"),
            Self::Range { min, max } => write!(f, "Range({min}..={max})"),
            Self::OneOf(values) => f.debug_tuple("OneOf").field(values).finish(),
            Self::Length { min, max } => write!(f, "Length({min}..={max})"),
            Self::Email => write!(f, "Email"),
            Self::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Self::DateTime => write!(f, "DateTime"),
            Self::Date => write!(f, "Date"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Presence {
    Required,
    Optional(Option<Value>),
}

/// Rules for one destination field.
///
/// # Examples
///
/// ```
/// use param_bind::FieldRule;
///
/// // `data` is read from the `x-data-id` header and must be an integer.
/// let rule = FieldRule::new("data").from("x-data-id").required().int();
/// assert_eq!(rule.field(), "data");
/// assert_eq!(rule.source_key(), "x-data-id");
/// ```
#[derive(Debug, Clone)]
pub struct FieldRule {
    field: String,
    source: Option<String>,
    presence: Presence,
    checks: Vec<Check>,
    code: Option<i32>,
}

impl FieldRule {
    /// Creates a rule for `field`. Without further calls the field is
    /// optional, has no default and is copied through unchanged.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            source: None,
            presence: Presence::Optional(None),
            checks: Vec::new(),
            code: None,
        }
    }

    /// Reads the value from `key` instead of the field name (for example a
    /// lower-cased header name).
    pub fn from(mut self, key: impl Into<String>) -> Self {
        self.source = Some(key.into());
        self
    }

    /// Fails with [`ViolationKind::Missing`] when the value is absent, null or empty.
    pub fn required(mut self) -> Self {
        self.presence = Presence::Required;
        self
    }

    /// Uses `default` when the value is absent; checks still run on it.
    pub fn optional(mut self, default: impl Into<Value>) -> Self {
        self.presence = Presence::Optional(Some(default.into()));
        self
    }

    /// Reports every violation of this rule with `code` instead of the
    /// kind's default.
    pub fn code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Appends a check.
    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    /// Appends [`Check::Int`].
    pub fn int(self) -> Self {
        self.check(Check::Int)
    }

    /// Appends [`Check::Float`].
    pub fn float(self) -> Self {
        self.check(Check::Float)
    }

    /// Appends [`Check::Bool`].
    pub fn boolean(self) -> Self {
        self.check(Check::Bool)
    }

    /// Appends [`Check::Str`].
    pub fn string(self) -> Self {
        self.check(Check::Str)
    }

    /// Appends [`Check::IntList`].
    pub fn int_list(self) -> Self {
        self.check(Check::IntList)
    }

    /// Appends [`Check::StrList`].
    pub fn string_list(self) -> Self {
        self.check(Check::StrList)
    }

    /// Appends [`Check::CommaInts`].
    pub fn comma_ints(self) -> Self {
        self.check(Check::CommaInts)
    }

    /// Appends [`Check::Range`].
    pub fn range(self, min: i64, max: i64) -> Self {
        self.check(Check::Range { min, max })
    }

    /// Appends [`Check::OneOf`].
    pub fn one_of(self, allowed: &[i64]) -> Self {
        self.check(Check::OneOf(allowed.to_vec()))
    }

    /// Appends [`Check::Length`].
    pub fn length(self, min: usize, max: usize) -> Self {
        self.check(Check::Length { min, max })
    }

    /// Appends [`Check::Email`].
    pub fn email(self) -> Self {
        self.check(Check::Email)
    }

    /// Appends [`Check::Pattern`].
    pub fn pattern(self, re: Regex) -> Self {
        self.check(Check::Pattern(re))
    }

    /// Appends [`Check::DateTime`].
    pub fn datetime(self) -> Self {
        self.check(Check::DateTime)
    }

    /// Appends [`Check::Date`].
    pub fn date(self) -> Self {
        self.check(Check::Date)
    }

    /// Appends a caller-supplied [`Check::Custom`].
    pub fn custom<F>(self, f: F) -> Self
    where
        F: Fn(Value, &ValidationContext) -> Result<Value, Violation> + Send + Sync + 'static,
    {
        self.check(Check::Custom(Arc::new(f)))
    }

    /// Destination field key.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Key the value is read from.
    pub fn source_key(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.field)
    }

    /// Ordered checks.
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    fn apply(
        &self,
        params: &ParamMap,
        ctx: &ValidationContext,
    ) -> Result<Option<Value>, Violation> {
        let present = params
            .get(self.source_key())
            .filter(|value| !is_blank(value))
            .cloned();

        let value = match (present, &self.presence) {
            (Some(value), _) => value,
            (None, Presence::Optional(Some(default))) => default.clone(),
            (None, Presence::Optional(None)) => return Ok(None),
            (None, Presence::Required) => {
                return Err(self.violation(
                    ViolationKind::Missing,
                    format!("field `{}` is required", self.field),
                ))
            }
        };

        self.checks
            .iter()
            .try_fold(value, |value, check| self.run(check, value, ctx))
            .map(Some)
    }

    fn run(
        &self,
        check: &Check,
        value: Value,
        ctx: &ValidationContext,
    ) -> Result<Value, Violation> {
        let field = self.field.as_str();
        let result = match check {
            Check::Int => to_int(&value).map(Value::from).ok_or_else(|| {
                (ViolationKind::InvalidType, format!("field `{field}` must be an integer"))
            }),
            Check::Float => to_float(&value)
                .and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
                .ok_or_else(|| {
                    (ViolationKind::InvalidType, format!("field `{field}` must be a number"))
                }),
            Check::Bool => to_bool(&value).map(Value::Bool).ok_or_else(|| {
                (ViolationKind::InvalidType, format!("field `{field}` must be a boolean"))
            }),
            Check::Str => to_text(&value).map(Value::String).ok_or_else(|| {
                (ViolationKind::InvalidType, format!("field `{field}` must be a string"))
            }),
            Check::IntList => elements(&value)
                .iter()
                .map(|item| to_int(item).map(Value::from))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array)
                .ok_or_else(|| {
                    (
                        ViolationKind::InvalidType,
                        format!("field `{field}` must be a list of integers"),
                    )
                }),
            Check::StrList => elements(&value)
                .iter()
                .map(|item| to_text(item).map(Value::String))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array)
                .ok_or_else(|| {
                    (
                        ViolationKind::InvalidType,
                        format!("field `{field}` must be a list of strings"),
                    )
                }),
            Check::CommaInts => comma_ints(&value).map(Value::Array).ok_or_else(|| {
                (
                    ViolationKind::InvalidFormat,
                    format!("field `{field}` must be comma-separated integers"),
                )
            }),
            Check::Range { min, max } => each_number(&value, field, |n| {
                if (*min as f64..=*max as f64).contains(&n) {
                    Ok(())
                } else {
                    Err((
                        ViolationKind::OutOfRange,
                        format!("field `{field}` must be between {min} and {max}"),
                    ))
                }
            })
            .map(|()| value),
            Check::OneOf(allowed) => each_number(&value, field, |n| {
                if allowed.iter().any(|a| *a as f64 == n) {
                    Ok(())
                } else {
                    Err((
                        ViolationKind::NotAllowed,
                        format!("field `{field}` must be one of {allowed:?}"),
                    ))
                }
            })
            .map(|()| value),
            Check::Length { min, max } => match value.as_str().map(|s| s.chars().count()) {
                Some(len) if (*min..=*max).contains(&len) => Ok(value),
                Some(_) => Err((
                    ViolationKind::OutOfRange,
                    format!("field `{field}` must be {min} to {max} characters long"),
                )),
                None => Err((
                    ViolationKind::InvalidType,
                    format!("field `{field}` must be a string"),
                )),
            },
            Check::Email => {
                matches_str(&value, &EMAIL_RE, field, "an e-mail address").map(|()| value)
            }
            Check::Pattern(re) => {
                matches_str(&value, re, field, "in the expected format").map(|()| value)
            }
            Check::DateTime => parses_as(&value, field, |s| {
                NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).is_ok()
            })
            .map(|()| value),
            Check::Date => parses_as(&value, field, |s| {
                NaiveDate::parse_from_str(s, DATE_FORMAT).is_ok()
            })
            .map(|()| value),
            Check::Custom(f) => {
                return f(value, ctx).map_err(|v| match self.code {
                    Some(code) => v.with_code(code),
                    None => v,
                })
            }
        };
        result.map_err(|(kind, message)| self.violation(kind, message))
    }

    fn violation(&self, kind: ViolationKind, message: String) -> Violation {
        let violation = Violation::new(kind, message).on_field(self.field.clone());
        match self.code {
            Some(code) => violation.with_code(code),
            None => violation,
        }
    }
}

type CheckFailure = (ViolationKind, String);

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// A lone scalar counts as a one-element list: a single query value arrives
// as a scalar even for list-typed fields.
fn elements(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

fn comma_ints(value: &Value) -> Option<Vec<Value>> {
    let mut out = Vec::new();
    for item in elements(value) {
        match item {
            Value::String(s) => {
                for part in s.split(',') {
                    out.push(Value::from(part.trim().parse::<i64>().ok()?));
                }
            }
            Value::Number(n) => out.push(Value::from(n.as_i64()?)),
            _ => return None,
        }
    }
    Some(out)
}

fn each_number(
    value: &Value,
    field: &str,
    mut check: impl FnMut(f64) -> Result<(), CheckFailure>,
) -> Result<(), CheckFailure> {
    for item in elements(value) {
        let n = match &item {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
        .ok_or_else(|| (ViolationKind::InvalidType, format!("field `{field}` must be numeric")))?;
        check(n)?;
    }
    Ok(())
}

fn matches_str(value: &Value, re: &Regex, field: &str, what: &str) -> Result<(), CheckFailure> {
    match value.as_str() {
        Some(s) if re.is_match(s) => Ok(()),
        Some(_) => Err((ViolationKind::InvalidFormat, format!("field `{field}` must be {what}"))),
        None => Err((ViolationKind::InvalidType, format!("field `{field}` must be a string"))),
    }
}

fn parses_as(value: &Value, field: &str, parse: impl Fn(&str) -> bool) -> Result<(), CheckFailure> {
    match value.as_str() {
        Some(s) if parse(s.trim()) => Ok(()),
        Some(_) => Err((
            ViolationKind::InvalidFormat,
            format!("field `{field}` is not a valid date/time"),
        )),
        None => Err((ViolationKind::InvalidType, format!("field `{field}` must be a string"))),
    }
}

/// An immutable, ordered collection of [`FieldRule`]s.
///
/// # Examples
///
/// ```
/// use param_bind::{FieldRule, ParamMap, RuleSet, RuleValidator, Validator};
/// use serde_json::json;
///
/// let rules = RuleSet::new()
///     .rule(FieldRule::new("grade").required().int().range(1, 100))
///     .rule(FieldRule::new("page").optional(1).int());
///
/// let mut params = ParamMap::new();
/// params.insert("grade".into(), json!("2"));
///
/// let validated = RuleValidator.validate(&params, &rules).unwrap();
/// assert_eq!(validated.values()["grade"], json!(2));
/// assert_eq!(validated.values()["page"], json!(1));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<FieldRule>,
}

impl RuleSet {
    /// Creates an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field rule. A later rule for the same field replaces the earlier one.
    pub fn rule(mut self, rule: FieldRule) -> Self {
        self.rules.retain(|existing| existing.field != rule.field);
        self.rules.push(rule);
        self
    }

    /// Looks up the rule for `field`.
    pub fn get(&self, field: &str) -> Option<&FieldRule> {
        self.rules.iter().find(|rule| rule.field == field)
    }

    /// Iterates over the rules in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldRule> {
        self.rules.iter()
    }

    /// Number of field rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if no rules are declared.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<FieldRule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = FieldRule>>(iter: I) -> Self {
        iter.into_iter().fold(RuleSet::new(), RuleSet::rule)
    }
}

/// The bundled [`Validator`] for [`RuleSet`]s.
///
/// Evaluates rules in declaration order and stops at the first violation.
/// The output mapping holds exactly the declared fields that were present or
/// defaulted; undeclared input keys are dropped. Success reports status code `0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleValidator;

impl Validator for RuleValidator {
    type Rules = RuleSet;

    fn validate(&self, params: &ParamMap, rules: &RuleSet) -> Result<Validated, Violation> {
        self.validate_in(&ValidationContext::default(), params, rules)
    }

    fn validate_in(
        &self,
        ctx: &ValidationContext,
        params: &ParamMap,
        rules: &RuleSet,
    ) -> Result<Validated, Violation> {
        ctx.check_deadline()?;

        let mut values = ParamMap::new();
        for rule in rules.iter() {
            if let Some(value) = rule.apply(params, ctx)? {
                values.insert(rule.field.clone(), value);
            }
        }
        Ok(Validated::new(values, 0))
    }
}
