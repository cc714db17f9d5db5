//! Definition of difference criticalities.

use indexmap::IndexMap;

use crate::Severity;

/// A named label layered on top of severities.
///
/// Criticalities order by level; the level of a criticality only has meaning
/// relative to the other criticalities configured for a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub struct Criticality {
    /// The unique name of the criticality.
    name: String,
    /// The level of the criticality; higher is more critical.
    level: u32,
}

impl Criticality {
    /// Creates a new criticality with the given name and level.
    pub fn new(name: impl Into<String>, level: u32) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }

    /// The default criticality for changes that are allowed without further
    /// ceremony.
    pub fn allowed() -> Self {
        Self::new("allowed", 1000)
    }

    /// The default criticality for changes that must be documented.
    pub fn documented() -> Self {
        Self::new("documented", 2000)
    }

    /// The default criticality for changes that must be highlighted in
    /// documentation.
    pub fn highlight() -> Self {
        Self::new("highlight", 3000)
    }

    /// The default criticality for changes that are errors.
    pub fn error() -> Self {
        Self::new("error", u32::MAX)
    }

    /// Gets the name of the criticality.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the level of the criticality.
    pub fn level(&self) -> u32 {
        self.level
    }
}

impl PartialOrd for Criticality {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Criticality {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.level
            .cmp(&other.level)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl std::fmt::Display for Criticality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{name}", name = self.name)
    }
}

/// The set of criticalities recognized within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalitySet {
    /// The criticalities keyed by name, in configuration order.
    entries: IndexMap<String, Criticality>,
}

impl CriticalitySet {
    /// Creates the default criticality set: `allowed`, `documented`,
    /// `highlight`, and `error`.
    pub fn new() -> Self {
        let mut set = Self {
            entries: Default::default(),
        };
        set.insert(Criticality::allowed());
        set.insert(Criticality::documented());
        set.insert(Criticality::highlight());
        set.insert(Criticality::error());
        set
    }

    /// Creates an empty criticality set.
    pub fn empty() -> Self {
        Self {
            entries: Default::default(),
        }
    }

    /// Inserts a criticality, replacing any existing criticality of the same
    /// name.
    pub fn insert(&mut self, criticality: Criticality) {
        self.entries
            .insert(criticality.name().to_string(), criticality);
    }

    /// Gets a criticality by name.
    pub fn get(&self, name: &str) -> Option<&Criticality> {
        self.entries.get(name)
    }

    /// Determines if the set contains a criticality of the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Iterates the criticalities in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Criticality> {
        self.entries.values()
    }

    /// Gets the number of criticalities in the set.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Determines if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CriticalitySet {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Criticality> for CriticalitySet {
    fn from_iter<T: IntoIterator<Item = Criticality>>(iter: T) -> Self {
        let mut set = Self::empty();
        for criticality in iter {
            set.insert(criticality);
        }
        set
    }
}

/// A total mapping from severity to the name of the default criticality
/// assigned to differences of that severity.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct SeverityMapping {
    /// The mapping entries.
    map: IndexMap<Severity, String>,
}

impl SeverityMapping {
    /// Creates the default severity mapping: `equivalent` and `nonBreaking`
    /// map to `allowed` and `documented`, the breaking severities map to
    /// `error`.
    pub fn new() -> Self {
        let mut map = IndexMap::new();
        map.insert(Severity::Equivalent, "allowed".to_string());
        map.insert(Severity::NonBreaking, "documented".to_string());
        map.insert(Severity::PotentiallyBreaking, "error".to_string());
        map.insert(Severity::Breaking, "error".to_string());
        Self { map }
    }

    /// Gets the criticality name mapped to the given severity.
    pub fn get(&self, severity: Severity) -> Option<&str> {
        self.map.get(&severity).map(|name| name.as_str())
    }

    /// Maps a severity, replacing any previous mapping.
    pub fn insert(&mut self, severity: Severity, criticality: impl Into<String>) {
        self.map.insert(severity, criticality.into());
    }

    /// Determines if every severity has a mapping.
    pub fn is_total(&self) -> bool {
        Severity::ALL.iter().all(|s| self.map.contains_key(s))
    }

    /// Iterates the mapping entries.
    pub fn iter(&self) -> impl Iterator<Item = (Severity, &str)> {
        self.map.iter().map(|(s, name)| (*s, name.as_str()))
    }
}

impl Default for SeverityMapping {
    fn default() -> Self {
        Self::new()
    }
}

impl From<IndexMap<Severity, String>> for SeverityMapping {
    fn from(map: IndexMap<Severity, String>) -> Self {
        Self { map }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn criticalities_order_by_level() {
        assert!(Criticality::allowed() < Criticality::documented());
        assert!(Criticality::documented() < Criticality::highlight());
        assert!(Criticality::highlight() < Criticality::error());
    }

    #[test]
    fn default_set_contains_the_well_known_names() {
        let set = CriticalitySet::new();
        assert_eq!(set.len(), 4);
        for name in ["allowed", "documented", "highlight", "error"] {
            assert!(set.contains(name), "missing criticality `{name}`");
        }
    }

    #[test]
    fn default_mapping_is_total() {
        let mapping = SeverityMapping::new();
        assert!(mapping.is_total());
        assert_eq!(mapping.get(Severity::Breaking), Some("error"));
        assert_eq!(mapping.get(Severity::Equivalent), Some("allowed"));
    }

    #[test]
    fn partial_mapping_is_not_total() {
        let mut mapping = SeverityMapping::from(IndexMap::new());
        assert!(!mapping.is_total());
        for severity in Severity::ALL {
            mapping.insert(severity, "allowed");
        }
        assert!(mapping.is_total());
    }

    #[test]
    fn severity_mapping_round_trips_through_serde() {
        let mapping = SeverityMapping::new();
        let json = serde_json::to_string(&mapping).unwrap();
        let back: SeverityMapping = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mapping);
    }
}
