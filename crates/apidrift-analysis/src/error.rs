//! Errors produced by the analysis kernel.

use thiserror::Error;

/// An error produced by the analysis kernel.
#[derive(Error, Debug)]
pub enum Error {
    /// The pipeline configuration is invalid.
    ///
    /// Configuration errors surface before any analysis begins; a run with
    /// an invalid configuration is never started.
    #[error("invalid pipeline configuration: {reason}")]
    ConfigurationInvalid {
        /// The reason the configuration is invalid.
        reason: String,
    },

    /// The archives of one side of the comparison could not be resolved.
    #[error("failed to resolve the archives of the `{api}` API")]
    ArtifactUnresolved {
        /// The API whose archives failed to resolve.
        api: String,
        /// The underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// An extension failed to initialize.
    #[error("extension `{id}` failed to initialize")]
    ExtensionInitialization {
        /// The id of the extension that failed.
        id: String,
        /// The underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// An analyzer's lazy resolution of an element kept failing.
    ///
    /// Transient completion failures are retried a bounded number of times
    /// before this error is recorded against the element and the element's
    /// subtree is skipped.
    #[error("analysis of element `{element}` did not complete after {attempts} attempts")]
    AnalysisIncomplete {
        /// The human-readable representation of the element.
        element: String,
        /// The number of attempts made.
        attempts: u32,
        /// The underlying error of the last attempt.
        #[source]
        source: anyhow::Error,
    },

    /// A transform block did not reach a fixpoint within the iteration cap.
    #[error(
        "transform block {block} did not reach a fixpoint after {iterations} iterations; \
         oscillating difference codes: {codes:?}"
    )]
    TransformNonConvergence {
        /// The index of the offending transform block.
        block: usize,
        /// The number of iterations performed.
        iterations: u32,
        /// The codes of the differences that kept changing.
        codes: Vec<String>,
    },

    /// The run was cancelled through the injected cancellation token.
    #[error("the analysis run was cancelled")]
    RunCancelled,
}

/// A result type with [`Error`] as the default error.
pub type Result<T, E = Error> = std::result::Result<T, E>;
