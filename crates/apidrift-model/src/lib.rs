//! The element forest and difference model for API comparisons.
//!
//! An API is modeled as a [`Forest`] of typed [`Element`]s with
//! cross-references between them. Comparing two forests produces
//! [`Difference`]s, each classified per compatibility dimension and labeled
//! with a [`Criticality`].
//!
//! This crate holds only the data model; the comparison machinery lives in
//! `apidrift-analysis`.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::broken_intra_doc_links)]

mod archive;
mod criticality;
mod difference;
mod element;
mod forest;
mod reference;

pub use archive::*;
pub use criticality::*;
pub use difference::*;
pub use element::*;
pub use forest::*;
pub use reference::*;
