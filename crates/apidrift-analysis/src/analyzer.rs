//! The archive analyzer contract.
//!
//! Archive analyzers are the per-format back-ends of the kernel: each knows
//! how to turn a set of archives into a forest of elements. The kernel never
//! interprets archive bytes itself.

use apidrift_model::Api;
use apidrift_model::Element;
use apidrift_model::Forest;

use crate::AnalysisContext;
use crate::Check;
use crate::Extension;
use crate::TreeFilter;

/// A per-format back-end producing forests from archives.
///
/// An analyzer instance is bound to the archives of one side of the
/// comparison at construction time by its [`ApiAnalyzerFactory`].
pub trait ApiAnalyzer: Extension {
    /// Produces the forest of the bound archives.
    ///
    /// The given tree filter is a construction hint: where it answers
    /// `descend = no` the analyzer should evaluate elements lazily or not at
    /// all. The walker applies its own filtering during traversal, so an
    /// analyzer that ignores the hint is merely wasteful, not wrong.
    fn analyze(&mut self, filter: &mut dyn TreeFilter) -> anyhow::Result<Forest>;

    /// Removes supplementary elements that are not reachable from primary
    /// elements through use-sites that move to the API.
    fn prune(&self, forest: &mut Forest) {
        forest.prune();
    }

    /// Completes the lazy resolution of an element, if the analyzer defers
    /// any work past [`ApiAnalyzer::analyze`].
    ///
    /// Failures are treated as transient and retried a bounded number of
    /// times before the element's subtree is abandoned.
    fn complete(&self, element: Element<'_>) -> anyhow::Result<()> {
        let _ = element;
        Ok(())
    }

    /// Releases any compilation or parse resources the analyzer holds.
    ///
    /// Must be safe to call multiple times.
    fn release(&mut self) {}
}

/// Constructs archive analyzers and the checks belonging to their format.
pub trait ApiAnalyzerFactory {
    /// Gets the extension id of the analyzers the factory creates.
    fn id(&self) -> &str;

    /// Creates an analyzer bound to the given API's archives.
    fn create(&self, api: &Api, context: &AnalysisContext) -> anyhow::Result<Box<dyn ApiAnalyzer>>;

    /// Creates the checks to run over the forests of this analyzer's
    /// format.
    ///
    /// Check instances are per run and may be stateful.
    fn checks(&self, context: &AnalysisContext) -> anyhow::Result<Vec<Box<dyn Check>>> {
        let _ = context;
        Ok(Vec::new())
    }
}
