//! Request-facing half of the pipeline.
//!
//! Framework integrations convert their native request into a
//! [`BindRequest`], pick the [`Sources`] an endpoint binds from, and hand
//! both to a [`Binder`]. Nothing here depends on a particular HTTP stack.
//!
//! # Integration Model
//!
//! 1. Build a `BindRequest` (method, headers, raw query, body stream)
//! 2. Share one immutable `RuleSet` across handlers
//! 3. Per request, call one of the `Binder` shapes and map the outcome to a
//!    response: `Bound::code` on success, `BindError::status_code` or the
//!    `Rejection` raw snapshot on failure

mod binder;
mod extract;
pub mod multipart;
mod request;
pub mod urlencoded;

pub use binder::{Binder, Bound, Rejection};
pub use extract::{Source, Sources};
pub use request::{BindRequest, BodyReader};
