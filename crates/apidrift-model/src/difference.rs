//! Definition of differences between paired elements.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::Criticality;

/// A compatibility dimension along which a difference is classified.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    serde::Deserialize,
    serde::Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Compatibility {
    /// Compatibility of source code compiled against the API.
    Source,
    /// Compatibility of artifacts linked against the API.
    Binary,
    /// Compatibility of the semantics of the API.
    Semantic,
    /// Any other compatibility concern.
    Other,
}

impl Compatibility {
    /// All compatibility dimensions.
    pub const ALL: [Compatibility; 4] = [
        Compatibility::Source,
        Compatibility::Binary,
        Compatibility::Semantic,
        Compatibility::Other,
    ];
}

impl std::fmt::Display for Compatibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Binary => write!(f, "binary"),
            Self::Semantic => write!(f, "semantic"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// The severity of a difference within one compatibility dimension.
///
/// The variant order is the severity order, least severe first.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    serde::Deserialize,
    serde::Serialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    /// The two versions are equivalent.
    Equivalent,
    /// The change cannot break consumers.
    NonBreaking,
    /// The change can break consumers in certain situations.
    PotentiallyBreaking,
    /// The change breaks consumers.
    Breaking,
}

impl Severity {
    /// All severities, least severe first.
    pub const ALL: [Severity; 4] = [
        Severity::Equivalent,
        Severity::NonBreaking,
        Severity::PotentiallyBreaking,
        Severity::Breaking,
    ];
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equivalent => write!(f, "equivalent"),
            Self::NonBreaking => write!(f, "nonBreaking"),
            Self::PotentiallyBreaking => write!(f, "potentiallyBreaking"),
            Self::Breaking => write!(f, "breaking"),
        }
    }
}

/// A single finding about a pair of elements.
///
/// Differences carry a stable code, a classification per compatibility
/// dimension, a criticality label, and free-form attachments consumed by
/// downstream reporters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Difference {
    /// The stable code of the difference.
    code: String,
    /// The human-readable name of the difference.
    name: String,
    /// The optional long-form description of the difference.
    description: Option<String>,
    /// The severity of the difference per compatibility dimension.
    classification: BTreeMap<Compatibility, Severity>,
    /// The criticality of the difference.
    ///
    /// Assigned from the configured severity mapping when not set
    /// explicitly.
    criticality: Option<Criticality>,
    /// The optional justification for why the difference is acceptable.
    justification: Option<String>,
    /// Free-form attachments consumed by reporters.
    attachments: IndexMap<String, String>,
}

impl Difference {
    /// Creates a new difference with the given code and name.
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            description: None,
            classification: Default::default(),
            criticality: None,
            justification: None,
            attachments: Default::default(),
        }
    }

    /// Sets the description of the difference.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Classifies the difference in the given compatibility dimension.
    pub fn with_classification(mut self, dimension: Compatibility, severity: Severity) -> Self {
        self.classification.insert(dimension, severity);
        self
    }

    /// Sets the criticality of the difference.
    pub fn with_criticality(mut self, criticality: Criticality) -> Self {
        self.criticality = Some(criticality);
        self
    }

    /// Sets the justification of the difference.
    pub fn with_justification(mut self, justification: impl Into<String>) -> Self {
        self.justification = Some(justification.into());
        self
    }

    /// Adds an attachment to the difference.
    pub fn with_attachment(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attachments.insert(name.into(), value.into());
        self
    }

    /// Gets the stable code of the difference.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Gets the human-readable name of the difference.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the description of the difference.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Gets the classification of the difference.
    pub fn classification(&self) -> &BTreeMap<Compatibility, Severity> {
        &self.classification
    }

    /// Gets the severity of the difference in the given dimension.
    pub fn severity(&self, dimension: Compatibility) -> Option<Severity> {
        self.classification.get(&dimension).copied()
    }

    /// Gets the maximum severity across all classified dimensions.
    ///
    /// An unclassified difference is considered [`Severity::Equivalent`].
    pub fn max_severity(&self) -> Severity {
        self.classification
            .values()
            .copied()
            .max()
            .unwrap_or(Severity::Equivalent)
    }

    /// Gets the criticality of the difference, if assigned.
    pub fn criticality(&self) -> Option<&Criticality> {
        self.criticality.as_ref()
    }

    /// Gets the justification of the difference.
    pub fn justification(&self) -> Option<&str> {
        self.justification.as_deref()
    }

    /// Gets the attachments of the difference.
    pub fn attachments(&self) -> &IndexMap<String, String> {
        &self.attachments
    }

    /// Gets the value of a named attachment.
    pub fn attachment(&self, name: &str) -> Option<&str> {
        self.attachments.get(name).map(|v| v.as_str())
    }
}

impl std::fmt::Display for Difference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{code}: {name}", code = self.code, name = self.name)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn severity_order() {
        assert!(Severity::Equivalent < Severity::NonBreaking);
        assert!(Severity::NonBreaking < Severity::PotentiallyBreaking);
        assert!(Severity::PotentiallyBreaking < Severity::Breaking);
    }

    #[test]
    fn max_severity_spans_dimensions() {
        let difference = Difference::new("method.removed", "method removed")
            .with_classification(Compatibility::Source, Severity::NonBreaking)
            .with_classification(Compatibility::Binary, Severity::Breaking);
        assert_eq!(difference.max_severity(), Severity::Breaking);
    }

    #[test]
    fn unclassified_difference_is_equivalent() {
        let difference = Difference::new("noop", "no operation");
        assert_eq!(difference.max_severity(), Severity::Equivalent);
    }

    #[test]
    fn attachments_preserve_order() {
        let difference = Difference::new("code", "name")
            .with_attachment("newValue", "2")
            .with_attachment("oldValue", "1");
        let names: Vec<_> = difference.attachments().keys().cloned().collect();
        assert_eq!(names, vec!["newValue", "oldValue"]);
        assert_eq!(difference.attachment("oldValue"), Some("1"));
    }

    #[test]
    fn severity_serializes_in_camel_case() {
        assert_eq!(
            serde_json::to_string(&Severity::PotentiallyBreaking).unwrap(),
            "\"potentiallyBreaking\""
        );
        assert_eq!(
            serde_json::from_str::<Severity>("\"nonBreaking\"").unwrap(),
            Severity::NonBreaking
        );
    }
}
