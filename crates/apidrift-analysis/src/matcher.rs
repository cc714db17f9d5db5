//! The element matcher contract.
//!
//! A matcher parses a user-supplied, format-specific expression into a
//! compiled recipe. A recipe produces tree filters that evaluate the
//! expression over the elements of a particular archive analyzer's forests.
//! Matchers are how transforms select the elements their rules apply to.

use std::sync::Arc;

use crate::Extension;
use crate::TreeFilter;

/// A matcher turning user expressions into compiled recipes.
pub trait ElementMatcher: Extension + Send + Sync {
    /// Compiles a user expression into a recipe.
    ///
    /// Fails when the expression is not understood by this matcher.
    fn compile(&self, expression: &str) -> anyhow::Result<Arc<dyn CompiledRecipe>>;
}

/// A compiled element-matching recipe.
///
/// A recipe is independent of any particular forest; asking it for a filter
/// binds it to the forests of one archive analyzer.
pub trait CompiledRecipe: Send + Sync {
    /// Gets a fresh tree filter evaluating the recipe over forests of the
    /// given archive analyzer.
    ///
    /// Returns `None` when the recipe cannot apply to forests of that
    /// analyzer.
    fn filter_for(&self, analyzer_id: &str) -> Option<Box<dyn TreeFilter>>;
}
