//! The contract shared by every configurable extension.

use crate::AnalysisContext;

/// A trait implemented by every configurable extension of the kernel:
/// archive analyzers, filter providers, transforms, reporters, and element
/// matchers.
///
/// Extensions are supplied to the kernel by the caller as constructed
/// instances; the kernel never discovers extensions dynamically.
pub trait Extension {
    /// Gets the extension id of the extension.
    ///
    /// The id is how configuration subtrees, include/exclude lists, and
    /// transform blocks refer to the extension. An extension without an id
    /// cannot be referenced from the configuration.
    fn extension_id(&self) -> Option<&str> {
        None
    }

    /// Gets the JSON schema describing the extension's configuration, if it
    /// has one.
    ///
    /// The kernel carries the schema opaquely for tooling; it does not
    /// validate configurations against it.
    fn schema(&self) -> Option<serde_json::Value> {
        None
    }

    /// Initializes the extension with its analysis context.
    ///
    /// Called once before any analysis begins. Failing here aborts the run
    /// before the walk starts.
    fn initialize(&mut self, context: &AnalysisContext) -> anyhow::Result<()> {
        let _ = context;
        Ok(())
    }

    /// Closes the extension, releasing any resources it holds.
    ///
    /// Must be safe to call multiple times.
    fn close(&mut self) {}
}
