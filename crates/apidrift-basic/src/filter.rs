//! The include/exclude filter provider.

use apidrift_analysis::AnalysisContext;
use apidrift_analysis::Extension;
use apidrift_analysis::FilterProvider;
use apidrift_analysis::StartResult;
use apidrift_analysis::Ternary;
use apidrift_analysis::TreeFilter;
use apidrift_model::Element;
use regex::Regex;
use serde_json::json;

/// The extension id of the include/exclude filter provider.
pub const FILTER_ID: &str = "basic.filter";

/// The configuration of the include/exclude filter.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    /// Regexes over element representations; an element is included when it
    /// matches any of them, or all elements when the list is empty.
    include: Vec<String>,
    /// Regexes over element representations; a matching element is
    /// excluded.
    exclude: Vec<String>,
}

/// A filter provider admitting elements by regexes over their
/// human-readable representations.
///
/// An excluded element still descends, so its children may re-include
/// themselves.
#[derive(Debug, Default)]
pub struct IncludeExcludeFilter {
    /// The compiled include regexes.
    include: Vec<Regex>,
    /// The compiled exclude regexes.
    exclude: Vec<Regex>,
}

impl IncludeExcludeFilter {
    /// Creates a filter provider admitting every element until configured.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Extension for IncludeExcludeFilter {
    fn extension_id(&self) -> Option<&str> {
        Some(FILTER_ID)
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "include": {"type": "array", "items": {"type": "string"}},
                "exclude": {"type": "array", "items": {"type": "string"}}
            },
            "additionalProperties": false
        }))
    }

    fn initialize(&mut self, context: &AnalysisContext) -> anyhow::Result<()> {
        if context.configuration().is_null() {
            return Ok(());
        }

        let config: Config = serde_json::from_value(context.configuration().clone())?;
        self.include = config
            .include
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<_, _>>()?;
        self.exclude = config
            .exclude
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<_, _>>()?;
        Ok(())
    }
}

impl FilterProvider for IncludeExcludeFilter {
    fn filter_for(&self, _: &str) -> Option<Box<dyn TreeFilter>> {
        Some(Box::new(IncludeExcludeTreeFilter {
            include: self.include.clone(),
            exclude: self.exclude.clone(),
        }))
    }
}

/// The tree filter produced by [`IncludeExcludeFilter`].
#[derive(Debug)]
struct IncludeExcludeTreeFilter {
    /// The compiled include regexes.
    include: Vec<Regex>,
    /// The compiled exclude regexes.
    exclude: Vec<Regex>,
}

impl IncludeExcludeTreeFilter {
    /// Decides the admission of an element.
    fn admits(&self, element: Element<'_>) -> bool {
        let display = element.display_name();
        let included =
            self.include.is_empty() || self.include.iter().any(|regex| regex.is_match(display));
        let excluded = self.exclude.iter().any(|regex| regex.is_match(display));
        included && !excluded
    }
}

impl TreeFilter for IncludeExcludeTreeFilter {
    fn start(&mut self, element: Element<'_>) -> StartResult {
        if self.admits(element) {
            StartResult::MATCH_AND_DESCEND
        } else {
            StartResult::EXCLUDE_AND_DESCEND
        }
    }

    fn finish_element(&mut self, element: Element<'_>) -> Ternary {
        Ternary::from(self.admits(element))
    }
}
