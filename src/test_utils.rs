//! Shared proptest strategies for in-crate property tests.

use proptest::prelude::*;

/// Parameter keys with an optional mix of bracket groups, numeric or not.
pub(crate) fn arb_param_key() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[a-z_]{0,8}(\[[0-9]{0,3}\]|\[[a-z]{1,3}\]|[a-z]{0,3}){0,4}")
        .expect("valid key regex")
}

/// One non-empty contribution of parameter values.
pub(crate) fn arb_contribution() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-zA-Z0-9 ,]{0,6}", 1..4)
}

/// A sequence of one or more contributions to the same key.
pub(crate) fn arb_contributions() -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(arb_contribution(), 1..5)
}
