//! Built-in generic extensions for the apidrift analysis pipeline.
//!
//! These extensions are format-agnostic: they work purely over difference
//! codes and element human-readable representations, so they compose with
//! any archive analyzer back-end.
//!
//! - [`IncludeExcludeFilter`] admits elements by regexes over their
//!   representations.
//! - [`IgnoreTransform`] drops differences matched by configured rules.
//! - [`ReclassifyTransform`] overrides the classification or criticality of
//!   matched differences.
//! - [`ExactMatcher`] and [`RegexMatcher`] compile the element expressions
//!   the transforms above are gated on.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::broken_intra_doc_links)]

use apidrift_analysis::ElementMatcher;
use apidrift_analysis::FilterProvider;
use apidrift_analysis::Transform;

mod filter;
mod ignore;
mod matcher;
mod reclassify;

pub use filter::*;
pub use ignore::*;
pub use matcher::*;
pub use reclassify::*;

/// Gets the default set of built-in element matchers.
pub fn matchers() -> Vec<Box<dyn ElementMatcher>> {
    vec![
        Box::<ExactMatcher>::default(),
        Box::<RegexMatcher>::default(),
    ]
}

/// Gets the default set of built-in filter providers.
pub fn filters() -> Vec<Box<dyn FilterProvider>> {
    vec![Box::<IncludeExcludeFilter>::default()]
}

/// Gets the default set of built-in transforms.
pub fn transforms() -> Vec<Box<dyn Transform>> {
    vec![
        Box::<IgnoreTransform>::default(),
        Box::<ReclassifyTransform>::default(),
    ]
}
