//! The pipeline configuration.
//!
//! Configuration is tree-shaped data: the kernel consumes it as
//! [`serde_json`] values with preserved key order, leaving file formats and
//! schema validation to collaborators. Per-extension configuration accepts
//! two shapes: an explicit array of extension configurations, and a legacy
//! object keyed by extension id.

use apidrift_model::Criticality;
use apidrift_model::CriticalitySet;
use apidrift_model::Severity;
use apidrift_model::SeverityMapping;
use indexmap::IndexMap;
use serde_json::Value;

use crate::Error;

/// An include/exclude list of extension ids for one extension category.
///
/// An absent include list admits every extension; extensions without an id
/// are admitted only when the include list is absent.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ExtensionFilter {
    /// The admitted extension ids, all ids when absent.
    include: Option<Vec<String>>,
    /// The rejected extension ids.
    exclude: Vec<String>,
}

impl ExtensionFilter {
    /// Creates a filter admitting only the given extension ids.
    pub fn including<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: Some(ids.into_iter().map(Into::into).collect()),
            exclude: Vec::new(),
        }
    }

    /// Creates a filter rejecting the given extension ids.
    pub fn excluding<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: None,
            exclude: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Determines if an extension with the given id is admitted.
    pub fn admits(&self, id: Option<&str>) -> bool {
        match id {
            Some(id) => {
                self.include
                    .as_ref()
                    .map(|include| include.iter().any(|i| i == id))
                    .unwrap_or(true)
                    && !self.exclude.iter().any(|e| e == id)
            }
            None => self.include.is_none(),
        }
    }
}

/// The configuration of a single extension.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct ExtensionConfig {
    /// The extension id the configuration belongs to.
    pub extension: String,
    /// An optional instance id distinguishing multiple configurations of
    /// the same extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The configuration subtree handed to the extension.
    #[serde(default)]
    pub configuration: Value,
}

/// The per-extension configurations of a run.
///
/// Two shapes are accepted: an explicit array of extension configurations
/// (each with an optional instance id), and a legacy single object keyed by
/// extension id.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum ExtensionConfigs {
    /// The explicit list form.
    List(Vec<ExtensionConfig>),
    /// The legacy object form keyed by extension id.
    Map(IndexMap<String, Value>),
}

impl ExtensionConfigs {
    /// Gets the configuration subtree for the given extension id.
    ///
    /// Returns `null` when no configuration is present. When the list form
    /// carries multiple configurations for the same extension, they are
    /// handed to the extension as an array.
    pub fn configuration_for(&self, extension_id: &str) -> Value {
        match self {
            Self::List(entries) => {
                let mut matching: Vec<Value> = entries
                    .iter()
                    .filter(|entry| entry.extension == extension_id)
                    .map(|entry| entry.configuration.clone())
                    .collect();
                match matching.len() {
                    0 => Value::Null,
                    1 => matching.remove(0),
                    _ => Value::Array(matching),
                }
            }
            Self::Map(map) => map.get(extension_id).cloned().unwrap_or(Value::Null),
        }
    }
}

impl Default for ExtensionConfigs {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

/// The configuration of an analysis pipeline.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// The criticalities recognized within the run; the default set when
    /// empty.
    criticalities: Vec<Criticality>,
    /// The mapping from severity to default criticality name.
    severity_mapping: SeverityMapping,
    /// The ordered transform blocks, as lists of transform extension ids.
    ///
    /// Transforms not referenced from any block each form their own
    /// implicit block, appended in registration order.
    transform_blocks: Vec<Vec<String>>,
    /// The include/exclude list for archive analyzers.
    analyzers: ExtensionFilter,
    /// The include/exclude list for filter providers.
    filters: ExtensionFilter,
    /// The include/exclude list for transforms.
    transforms: ExtensionFilter,
    /// The include/exclude list for reporters.
    reporters: ExtensionFilter,
    /// The include/exclude list for element matchers.
    matchers: ExtensionFilter,
    /// The per-extension configurations.
    extensions: ExtensionConfigs,
    /// The per-block transform iteration cap.
    transform_iteration_cap: u32,
    /// The retry count for transient element completion failures.
    completion_retries: u32,
    /// Whether to prune forests after analysis.
    prune: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            criticalities: Vec::new(),
            severity_mapping: SeverityMapping::new(),
            transform_blocks: Vec::new(),
            analyzers: Default::default(),
            filters: Default::default(),
            transforms: Default::default(),
            reporters: Default::default(),
            matchers: Default::default(),
            extensions: Default::default(),
            transform_iteration_cap: 10,
            completion_retries: 10,
            prune: false,
        }
    }
}

impl PipelineConfig {
    /// Creates the default pipeline configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a criticality to the recognized set.
    pub fn with_criticality(mut self, criticality: Criticality) -> Self {
        self.criticalities.push(criticality);
        self
    }

    /// Sets the severity mapping.
    pub fn with_severity_mapping(mut self, mapping: SeverityMapping) -> Self {
        self.severity_mapping = mapping;
        self
    }

    /// Appends a transform block.
    pub fn with_transform_block<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transform_blocks
            .push(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the include/exclude list for archive analyzers.
    pub fn with_analyzers(mut self, filter: ExtensionFilter) -> Self {
        self.analyzers = filter;
        self
    }

    /// Sets the include/exclude list for filter providers.
    pub fn with_filters(mut self, filter: ExtensionFilter) -> Self {
        self.filters = filter;
        self
    }

    /// Sets the include/exclude list for transforms.
    pub fn with_transforms(mut self, filter: ExtensionFilter) -> Self {
        self.transforms = filter;
        self
    }

    /// Sets the include/exclude list for reporters.
    pub fn with_reporters(mut self, filter: ExtensionFilter) -> Self {
        self.reporters = filter;
        self
    }

    /// Sets the include/exclude list for element matchers.
    pub fn with_matchers(mut self, filter: ExtensionFilter) -> Self {
        self.matchers = filter;
        self
    }

    /// Adds a configuration subtree for the given extension.
    pub fn with_configuration(mut self, extension: impl Into<String>, configuration: Value) -> Self {
        match &mut self.extensions {
            ExtensionConfigs::List(list) => list.push(ExtensionConfig {
                extension: extension.into(),
                id: None,
                configuration,
            }),
            ExtensionConfigs::Map(map) => {
                map.insert(extension.into(), configuration);
            }
        }
        self
    }

    /// Sets the per-block transform iteration cap.
    pub fn with_transform_iteration_cap(mut self, cap: u32) -> Self {
        self.transform_iteration_cap = cap;
        self
    }

    /// Sets the retry count for transient element completion failures.
    pub fn with_completion_retries(mut self, retries: u32) -> Self {
        self.completion_retries = retries;
        self
    }

    /// Sets whether to prune forests after analysis.
    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    /// Gets the ordered transform blocks.
    pub fn transform_blocks(&self) -> &[Vec<String>] {
        &self.transform_blocks
    }

    /// Gets the include/exclude list for archive analyzers.
    pub fn analyzers(&self) -> &ExtensionFilter {
        &self.analyzers
    }

    /// Gets the include/exclude list for filter providers.
    pub fn filters(&self) -> &ExtensionFilter {
        &self.filters
    }

    /// Gets the include/exclude list for transforms.
    pub fn transforms(&self) -> &ExtensionFilter {
        &self.transforms
    }

    /// Gets the include/exclude list for reporters.
    pub fn reporters(&self) -> &ExtensionFilter {
        &self.reporters
    }

    /// Gets the include/exclude list for element matchers.
    pub fn matchers(&self) -> &ExtensionFilter {
        &self.matchers
    }

    /// Gets the per-extension configurations.
    pub fn extensions(&self) -> &ExtensionConfigs {
        &self.extensions
    }

    /// Gets the per-block transform iteration cap.
    pub fn transform_iteration_cap(&self) -> u32 {
        self.transform_iteration_cap
    }

    /// Gets the retry count for transient element completion failures.
    pub fn completion_retries(&self) -> u32 {
        self.completion_retries
    }

    /// Gets whether to prune forests after analysis.
    pub fn prune(&self) -> bool {
        self.prune
    }

    /// Builds the criticality set of the run.
    ///
    /// An empty configured list yields the default set.
    pub fn criticality_set(&self) -> Result<CriticalitySet, Error> {
        if self.criticalities.is_empty() {
            return Ok(CriticalitySet::new());
        }

        let mut set = CriticalitySet::empty();
        for criticality in &self.criticalities {
            if set.contains(criticality.name()) {
                return Err(Error::ConfigurationInvalid {
                    reason: format!(
                        "duplicate criticality `{name}`",
                        name = criticality.name()
                    ),
                });
            }
            set.insert(criticality.clone());
        }
        Ok(set)
    }

    /// Validates the severity mapping against the given criticality set.
    ///
    /// The mapping must be total over all severities and may only name
    /// configured criticalities.
    pub fn validated_severity_mapping(
        &self,
        criticalities: &CriticalitySet,
    ) -> Result<SeverityMapping, Error> {
        for severity in Severity::ALL {
            match self.severity_mapping.get(severity) {
                None => {
                    return Err(Error::ConfigurationInvalid {
                        reason: format!("incomplete severity mapping: `{severity}` is unmapped"),
                    });
                }
                Some(name) if !criticalities.contains(name) => {
                    return Err(Error::ConfigurationInvalid {
                        reason: format!(
                            "severity `{severity}` maps to unknown criticality `{name}`"
                        ),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(self.severity_mapping.clone())
    }
}
