//! # stepmach-path
//!
//! JSONPath addressing and parameter interpolation for stepmach.
//!
//! This crate provides:
//! - Compiled [`Path`] queries rooted at `$` with read and merge-write
//!   access into `serde_json::Value` documents
//! - [`interpolate`] for resolving `Foo.$` keys and `{{$.x}}` templates
//!   inside `Parameters` objects

pub mod error;
pub mod interpolate;
pub mod path;

pub use error::PathError;
pub use interpolate::interpolate;
pub use path::{Path, Segment};
