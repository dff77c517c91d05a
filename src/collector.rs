//! Canonical parameter collection and the merge algorithm shared by every source.

use std::collections::BTreeMap;

use serde_json::Value;

/// The canonical untyped mapping handed to validation.
///
/// Scalars appear as JSON strings, lists as JSON arrays of strings, and
/// JSON-body entries keep whatever JSON value the body carried.
pub type ParamMap = serde_json::Map<String, Value>;

/// A merged parameter value: one string, or an ordered list of strings.
///
/// Once a key holds a `List` it never goes back to a `Scalar`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// Exactly one value was contributed for the key.
    Scalar(String),
    /// Several values, in the order they were contributed.
    List(Vec<String>),
}

impl RawValue {
    /// Builds the value for a key's first contribution.
    ///
    /// Returns `None` when `values` is empty.
    pub fn from_values(mut values: Vec<String>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => values.pop().map(RawValue::Scalar),
            _ => Some(RawValue::List(values)),
        }
    }

    /// Folds another contribution into this value.
    ///
    /// A scalar becomes a list headed by the existing value; a list is
    /// extended in place. An empty contribution leaves the value as it was.
    ///
    /// # Examples
    ///
    /// ```
    /// use param_bind::RawValue;
    ///
    /// let merged = RawValue::Scalar("x".into()).merge(vec!["y".into()]);
    /// assert_eq!(merged, RawValue::List(vec!["x".into(), "y".into()]));
    ///
    /// let merged = merged.merge(vec!["z".into()]);
    /// assert_eq!(merged.as_list().map(|l| l.len()), Some(3));
    /// ```
    pub fn merge(self, values: Vec<String>) -> Self {
        if values.is_empty() {
            return self;
        }
        match self {
            RawValue::Scalar(existing) => {
                let mut list = Vec::with_capacity(values.len() + 1);
                list.push(existing);
                list.extend(values);
                RawValue::List(list)
            }
            RawValue::List(mut list) => {
                list.extend(values);
                RawValue::List(list)
            }
        }
    }

    /// Returns the scalar string, if this is a `Scalar`.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            RawValue::Scalar(s) => Some(s),
            RawValue::List(_) => None,
        }
    }

    /// Returns the list, if this is a `List`.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            RawValue::Scalar(_) => None,
            RawValue::List(list) => Some(list),
        }
    }

    /// Number of strings held (1 for a scalar).
    pub fn len(&self) -> usize {
        match self {
            RawValue::Scalar(_) => 1,
            RawValue::List(list) => list.len(),
        }
    }

    /// Always `false` for values built through the collector.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts into the JSON shape used by [`ParamMap`].
    pub fn into_value(self) -> Value {
        match self {
            RawValue::Scalar(s) => Value::String(s),
            RawValue::List(list) => Value::Array(list.into_iter().map(Value::String).collect()),
        }
    }

    /// Lifts a JSON-body value into string form so a string source can merge
    /// into it.
    ///
    /// Strings, numbers (exact token) and booleans lift to a `Scalar`; an
    /// array of those lifts to a `List`. Null, objects and nested arrays have
    /// no string form and yield `None`.
    pub fn lift_json(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(json_scalar_text)
                .collect::<Option<Vec<_>>>()
                .map(RawValue::List),
            other => json_scalar_text(other).map(RawValue::Scalar),
        }
    }
}

fn json_scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Raw(RawValue),
    Json(Value),
}

/// Per-request accumulator that merges every source into one canonical mapping.
///
/// Each extractor pushes `(key, values)` contributions through [`set`](Self::set).
/// A key's final value is the concatenation of every contribution in insertion
/// order, collapsed to a scalar only when exactly one single-valued
/// contribution arrived for it.
///
/// A collector is created fresh for each request and consumed once by
/// validation; it is never shared between requests.
///
/// # Examples
///
/// ```
/// use param_bind::{ParamCollector, RawValue};
///
/// let mut params = ParamCollector::new();
/// params.set("page", vec!["2".to_string()]);
/// params.set("tags", vec!["a".to_string(), "b".to_string()]);
/// params.set("page", vec!["3".to_string()]);
///
/// assert_eq!(
///     params.get("page"),
///     Some(&RawValue::List(vec!["2".into(), "3".into()]))
/// );
/// assert_eq!(params.get("tags").map(RawValue::len), Some(2));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamCollector {
    slots: BTreeMap<String, Slot>,
}

impl ParamCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one source's contribution for `key`.
    ///
    /// - absent key: stores a `Scalar` for one value, a `List` for several
    /// - `Scalar(s)`: becomes `List([s] ++ values)`
    /// - `List(l)`: becomes `List(l ++ values)`
    ///
    /// An empty `values` is a no-op; extractors never produce one.
    pub fn set(&mut self, key: impl Into<String>, values: Vec<String>) {
        if values.is_empty() {
            return;
        }
        let key = key.into();
        let slot = match self.slots.remove(&key) {
            None => RawValue::from_values(values).map(Slot::Raw),
            Some(Slot::Raw(existing)) => Some(Slot::Raw(existing.merge(values))),
            Some(Slot::Json(body)) => match RawValue::lift_json(&body) {
                Some(lifted) => Some(Slot::Raw(lifted.merge(values))),
                None => {
                    tracing::debug!(key = %key, "body value cannot absorb string contribution");
                    Some(Slot::Json(body))
                }
            },
        };
        if let Some(slot) = slot {
            self.slots.insert(key, slot);
        }
    }

    /// Stores a value decoded from a JSON body.
    ///
    /// Body keys are stored verbatim. A repeated body key replaces the earlier
    /// value, matching JSON object semantics.
    pub fn set_json(&mut self, key: impl Into<String>, value: Value) {
        self.slots.insert(key.into(), Slot::Json(value));
    }

    /// Returns the merged string value for `key`.
    ///
    /// JSON-body entries that no string source has touched are not visible
    /// here; use [`to_mapping`](Self::to_mapping) to see them.
    pub fn get(&self, key: &str) -> Option<&RawValue> {
        match self.slots.get(key) {
            Some(Slot::Raw(raw)) => Some(raw),
            _ => None,
        }
    }

    /// Returns `true` if any source contributed `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Number of distinct keys collected.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if nothing has been collected.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates over the collected keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Returns a copy of the contents as the canonical mapping.
    pub fn to_mapping(&self) -> ParamMap {
        self.clone().into_mapping()
    }

    /// Consumes the collector, producing the canonical mapping.
    pub fn into_mapping(self) -> ParamMap {
        self.slots
            .into_iter()
            .map(|(key, slot)| {
                let value = match slot {
                    Slot::Raw(raw) => raw.into_value(),
                    Slot::Json(value) => value,
                };
                (key, value)
            })
            .collect()
    }
}
