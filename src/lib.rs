//! Request-parameter aggregation and validation binding.
//!
//! This crate collects the parameters of one request from several input
//! channels, merges them into a single canonical mapping, runs that mapping
//! through a rule-based validator, and decodes the result into a typed
//! destination:
//! - **Sources**: JSON body, URL query string, URL-encoded and multipart form
//!   bodies, and headers, processed in a fixed order
//! - **Merging**: a key seen once is a scalar; further contributions turn it
//!   into an ordered list
//! - **Validation**: any [`Validator`]; [`RuleValidator`] with [`RuleSet`]s
//!   is bundled
//! - **Decoding**: serde-driven, with date/time coercion hooks in [`decode`]
//!
//! # Core Types
//!
//! - [`BindRequest`]: framework-neutral view of an incoming request
//! - [`ParamCollector`] / [`RawValue`]: the merge algorithm
//! - [`Binder`]: the pipeline orchestrator
//! - [`RawSnapshot`]: the pre-validation mapping echoed on failure
//! - [`BindError`]: extraction, validation and decode failures
//!
//! # Examples
//!
//! ```
//! use param_bind::{Binder, BindRequest, FieldRule, RuleSet, RuleValidator, Source, Sources};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Search {
//!     tags: Vec<String>,
//!     page: i64,
//! }
//!
//! let rules = RuleSet::new()
//!     .rule(FieldRule::new("tags").required().string_list())
//!     .rule(FieldRule::new("page").optional(1).int().range(1, 50));
//!
//! let mut req = BindRequest::new("req-42").with_query("tags[]=rust&tags[]=serde");
//!
//! let bound = Binder::new(&RuleValidator, &rules)
//!     .bind::<Search>(&mut req, Sources::QUERY)
//!     .expect("parameters are valid");
//!
//! assert_eq!(bound.value.tags, vec!["rust", "serde"]);
//! assert_eq!(bound.value.page, 1);
//! assert!(Sources::QUERY.contains(Source::Header));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod collector;
mod config;
mod context;
pub mod decode;
mod error;
mod key;
mod logging;
mod rules;
mod snapshot;
mod validate;
pub mod web;

#[cfg(test)]
mod test_utils;

pub use collector::{ParamCollector, ParamMap, RawValue};
pub use config::{BindConfig, DEFAULT_MAX_BODY_SIZE, DEFAULT_MULTIPART_MEMORY_LIMIT};
pub use context::ValidationContext;
pub use error::{BindError, DecodeError, ExtractError};
pub use key::{normalize_key, BRACKET_PATTERN};
pub use rules::{Check, CustomCheck, FieldRule, RuleSet, RuleValidator};
pub use snapshot::RawSnapshot;
pub use validate::{PassThrough, RejectAll, Validated, Validator, Violation, ViolationKind};
pub use web::{BindRequest, Binder, Bound, Rejection, Source, Sources};
