//! The per-run context handed to extensions.

use std::sync::Arc;

use apidrift_model::CriticalitySet;
use indexmap::IndexMap;

use crate::ElementMatcher;

/// The context an extension is initialized with.
///
/// The context carries the extension's own configuration subtree, the
/// criticality set of the run, and the element matchers recognized within
/// the run. There is no process-wide state: everything an extension may
/// depend on is injected through its context.
#[derive(Clone)]
pub struct AnalysisContext {
    /// The configuration subtree of the extension being initialized.
    configuration: serde_json::Value,
    /// The criticalities recognized within the run.
    criticalities: CriticalitySet,
    /// The element matchers recognized within the run, keyed by extension
    /// id.
    matchers: IndexMap<String, Arc<dyn ElementMatcher>>,
}

impl AnalysisContext {
    /// Creates a new analysis context.
    pub fn new(
        configuration: serde_json::Value,
        criticalities: CriticalitySet,
        matchers: IndexMap<String, Arc<dyn ElementMatcher>>,
    ) -> Self {
        Self {
            configuration,
            criticalities,
            matchers,
        }
    }

    /// Gets the configuration subtree of the extension being initialized.
    ///
    /// The subtree is `null` when the configuration has no entry for the
    /// extension.
    pub fn configuration(&self) -> &serde_json::Value {
        &self.configuration
    }

    /// Gets the criticalities recognized within the run.
    pub fn criticalities(&self) -> &CriticalitySet {
        &self.criticalities
    }

    /// Gets a recognized element matcher by extension id.
    pub fn matcher(&self, id: &str) -> Option<&Arc<dyn ElementMatcher>> {
        self.matchers.get(id)
    }

    /// Iterates the recognized element matchers.
    pub fn matchers(&self) -> impl Iterator<Item = (&str, &Arc<dyn ElementMatcher>)> {
        self.matchers.iter().map(|(id, m)| (id.as_str(), m))
    }
}

impl std::fmt::Debug for AnalysisContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisContext")
            .field("configuration", &self.configuration)
            .field("criticalities", &self.criticalities)
            .field(
                "matchers",
                &self.matchers.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}
