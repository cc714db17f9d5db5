//! The analysis pipeline kernel for API comparisons.
//!
//! The kernel walks two element forests in lock-step, dispatches pluggable
//! checks at each paired element, routes the produced differences through
//! ordered blocks of transforms with fixpoint semantics, applies tree
//! filters with deferred resolution, and emits one report per matched pair
//! to the configured reporters.
//!
//! The kernel is agnostic of the analyzed ecosystem: per-format back-ends
//! implement [`ApiAnalyzer`] to turn archives into forests and supply the
//! checks for their format. Everything is injected by the caller; there is
//! no dynamic extension discovery.
//!
//! # Examples
//!
//! Comparing two APIs with a back-end that produces fixed forests:
//!
//! ```rust
//! use apidrift_analysis::AnalysisContext;
//! use apidrift_analysis::AnalysisDriver;
//! use apidrift_analysis::ApiAnalyzer;
//! use apidrift_analysis::ApiAnalyzerFactory;
//! use apidrift_analysis::BufferReporter;
//! use apidrift_analysis::Extension;
//! use apidrift_analysis::PipelineConfig;
//! use apidrift_analysis::TreeFilter;
//! use apidrift_model::Api;
//! use apidrift_model::BytesArchive;
//! use apidrift_model::ElementKind;
//! use apidrift_model::Forest;
//!
//! /// An analyzer producing a fixed forest.
//! struct FixedAnalyzer {
//!     /// The root signatures of the forest.
//!     signatures: Vec<&'static str>,
//! }
//!
//! impl Extension for FixedAnalyzer {}
//!
//! impl ApiAnalyzer for FixedAnalyzer {
//!     fn analyze(&mut self, _: &mut dyn TreeFilter) -> anyhow::Result<Forest> {
//!         let mut forest = Forest::new();
//!         for signature in &self.signatures {
//!             forest.add_root(ElementKind::Type, *signature, *signature, None);
//!         }
//!         Ok(forest)
//!     }
//! }
//!
//! /// A factory creating fixed analyzers.
//! struct FixedFactory;
//!
//! impl ApiAnalyzerFactory for FixedFactory {
//!     fn id(&self) -> &str {
//!         "example.fixed"
//!     }
//!
//!     fn create(
//!         &self,
//!         api: &Api,
//!         _: &AnalysisContext,
//!     ) -> anyhow::Result<Box<dyn ApiAnalyzer>> {
//!         let signatures = if api.archives().is_empty() {
//!             vec!["A"]
//!         } else {
//!             vec!["A", "B"]
//!         };
//!         Ok(Box::new(FixedAnalyzer { signatures }))
//!     }
//! }
//!
//! let mut driver = AnalysisDriver::builder(PipelineConfig::new())
//!     .with_analyzer(FixedFactory)
//!     .with_new_api(Api::new().with_archive(BytesArchive::new("lib-2.0", Vec::new())))
//!     .build()?;
//!
//! let mut reporter = BufferReporter::new();
//! let result = driver.run(&mut [&mut reporter])?;
//! driver.close();
//!
//! // The matched pair (A, A) and the half-pair (none, B)
//! assert_eq!(result.reports_emitted(), 2);
//! # Ok::<(), apidrift_analysis::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::broken_intra_doc_links)]

mod analyzer;
mod check;
mod config;
mod context;
mod driver;
mod error;
mod extension;
mod filter;
mod matcher;
mod reporter;
mod ternary;
mod transform;
mod walker;

pub use analyzer::*;
pub use check::*;
pub use config::*;
pub use context::*;
pub use driver::*;
pub use error::*;
pub use extension::*;
pub use filter::*;
pub use matcher::*;
pub use reporter::*;
pub use ternary::*;
pub use transform::*;
pub use walker::*;
