//! Comparing two versions of an API surface and classifying the differences
//! between them.
//!
//! This crate is a facade over the workspace members:
//!
//! - [`model`] holds the element forest and difference data model.
//! - [`analysis`] holds the pipeline kernel: filters, checks, transforms,
//!   the forest walker, and the analysis driver.
//! - [`basic`] holds the built-in format-agnostic extensions.

#![warn(missing_docs)]

#[cfg(feature = "analysis")]
#[doc(inline)]
pub use apidrift_analysis as analysis;
#[cfg(feature = "basic")]
#[doc(inline)]
pub use apidrift_basic as basic;
#[cfg(feature = "model")]
#[doc(inline)]
pub use apidrift_model as model;
