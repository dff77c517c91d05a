use serde_json::Value;

use crate::collector::ParamMap;

/// The canonical mapping exactly as it stood before validation ran.
///
/// Every binding run takes one once extraction succeeds. Callers only see it
/// through [`Rejection::raw`](crate::Rejection::raw) when a raw-echo variant
/// fails validation or decoding, so they can report what the client actually
/// sent. Its contents are unvalidated client input: nothing in it has been
/// coerced, defaulted or checked.
///
/// # Examples
///
/// ```
/// use param_bind::{Binder, BindRequest, FieldRule, RuleSet, RuleValidator, Sources};
///
/// let rules = RuleSet::new().rule(FieldRule::new("page").required().int());
/// let validator = RuleValidator;
///
/// let mut request = BindRequest::new("req-1").with_query("page=abc");
/// let rejection = Binder::new(&validator, &rules)
///     .bind_raw::<serde_json::Value>(&mut request, Sources::QUERY)
///     .unwrap_err();
///
/// let raw = rejection.raw.expect("validation failures echo the raw mapping");
/// assert_eq!(raw.get("page").and_then(|v| v.as_str()), Some("abc"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RawSnapshot {
    inner: ParamMap,
}

impl RawSnapshot {
    pub(crate) fn new(params: ParamMap) -> Self {
        Self { inner: params }
    }

    /// Looks up one raw parameter.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(key)
    }

    /// Borrows the whole raw mapping.
    pub fn as_map(&self) -> &ParamMap {
        &self.inner
    }

    /// Number of raw parameters.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the request carried no parameters.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Consumes the snapshot, returning the raw mapping.
    pub fn into_inner(self) -> ParamMap {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_exposes_mapping() {
        let mut map = ParamMap::new();
        map.insert("name".into(), json!("k"));

        let snapshot = RawSnapshot::new(map.clone());

        assert_eq!(snapshot.get("name"), Some(&json!("k")));
        assert_eq!(snapshot.len(), 1);
        assert!(!snapshot.is_empty());
        assert_eq!(snapshot.as_map(), &map);
        assert_eq!(snapshot.into_inner(), map);
    }

    #[test]
    fn snapshot_is_independent_of_source_map() {
        let mut map = ParamMap::new();
        map.insert("a".into(), json!("1"));

        let snapshot = RawSnapshot::new(map.clone());
        map.insert("a".into(), json!(1));

        assert_eq!(snapshot.get("a"), Some(&json!("1")));
    }
}
