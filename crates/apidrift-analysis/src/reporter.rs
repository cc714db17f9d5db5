//! The reporter contract.

use apidrift_model::Criticality;
use apidrift_model::Difference;
use apidrift_model::Element;

use crate::Extension;

/// The report of one matched pair of elements.
#[derive(Clone, Debug)]
pub struct Report<'a> {
    /// The old element of the pair, if present.
    pub old: Option<Element<'a>>,
    /// The new element of the pair, if present.
    pub new: Option<Element<'a>>,
    /// The differences of the pair, in the order produced by the last
    /// transform block.
    pub differences: Vec<Difference>,
}

impl Report<'_> {
    /// Gets the maximum criticality among the report's differences.
    pub fn max_criticality(&self) -> Option<&Criticality> {
        self.differences
            .iter()
            .filter_map(|difference| difference.criticality())
            .max()
    }
}

/// A consumer of reports.
///
/// Reporters receive reports serially, in walk order. A failing reporter is
/// logged and isolated: it affects neither other reporters nor the walk.
pub trait Reporter: Extension {
    /// Consumes the report of one element pair.
    fn report(&mut self, report: &Report<'_>) -> anyhow::Result<()>;
}

/// An owned snapshot of a report, as collected by [`BufferReporter`].
#[derive(Clone, Debug, PartialEq)]
pub struct CollectedReport {
    /// The human-readable representation of the old element.
    pub old: Option<String>,
    /// The human-readable representation of the new element.
    pub new: Option<String>,
    /// The differences of the pair.
    pub differences: Vec<Difference>,
}

/// A reporter buffering owned snapshots of every report it receives.
#[derive(Debug, Default)]
pub struct BufferReporter {
    /// The collected reports, in walk order.
    reports: Vec<CollectedReport>,
}

impl BufferReporter {
    /// Creates a new, empty buffer reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the collected reports, in walk order.
    pub fn reports(&self) -> &[CollectedReport] {
        &self.reports
    }

    /// Takes the collected reports, leaving the buffer empty.
    pub fn take_reports(&mut self) -> Vec<CollectedReport> {
        std::mem::take(&mut self.reports)
    }
}

impl Extension for BufferReporter {
    fn extension_id(&self) -> Option<&str> {
        Some("reporter.buffer")
    }
}

impl Reporter for BufferReporter {
    fn report(&mut self, report: &Report<'_>) -> anyhow::Result<()> {
        self.reports.push(CollectedReport {
            old: report.old.map(|e| e.display_name().to_string()),
            new: report.new.map(|e| e.display_name().to_string()),
            differences: report.differences.clone(),
        });
        Ok(())
    }
}
