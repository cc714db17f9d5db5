//! The reclassify transform.

use apidrift_analysis::AnalysisContext;
use apidrift_analysis::ElementPair;
use apidrift_analysis::Extension;
use apidrift_analysis::MatchGate;
use apidrift_analysis::Transform;
use apidrift_analysis::TransformResolution;
use apidrift_model::Compatibility;
use apidrift_model::Criticality;
use apidrift_model::Difference;
use apidrift_model::Severity;
use indexmap::IndexMap;
use regex::Regex;
use serde_json::json;
use tracing::debug;

use crate::matcher::REGEX_MATCHER_ID;

/// The extension id of the reclassify transform.
pub const RECLASSIFY_TRANSFORM_ID: &str = "basic.reclassify";

/// The configuration of one reclassification rule.
#[derive(Debug, serde::Deserialize)]
struct RuleConfig {
    /// A regex over difference codes.
    code: String,
    /// An optional expression bound to the old element of the pair.
    #[serde(default)]
    old: Option<String>,
    /// An optional expression bound to the new element of the pair.
    #[serde(default)]
    new: Option<String>,
    /// The matcher compiling the element expressions; the regex matcher by
    /// default.
    #[serde(default)]
    matcher: Option<String>,
    /// The severity overrides per compatibility dimension.
    #[serde(default)]
    classify: IndexMap<Compatibility, Severity>,
    /// An optional criticality override, by name.
    #[serde(default)]
    criticality: Option<String>,
    /// An optional justification recorded on reclassified differences.
    #[serde(default)]
    justification: Option<String>,
}

/// A compiled reclassification rule.
struct Rule {
    /// The compiled code regex.
    code: Regex,
    /// The gate over the rule's element expressions.
    gate: MatchGate,
    /// The severity overrides per compatibility dimension.
    classify: IndexMap<Compatibility, Severity>,
    /// The criticality override.
    criticality: Option<Criticality>,
    /// The justification recorded on reclassified differences.
    justification: Option<String>,
}

/// A transform replacing matched differences with reclassified copies.
///
/// A criticality override must name a criticality configured for the run.
#[derive(Default)]
pub struct ReclassifyTransform {
    /// The compiled rules.
    rules: Vec<Rule>,
}

impl ReclassifyTransform {
    /// Creates a reclassify transform with no rules.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Extension for ReclassifyTransform {
    fn extension_id(&self) -> Option<&str> {
        Some(RECLASSIFY_TRANSFORM_ID)
    }

    fn schema(&self) -> Option<serde_json::Value> {
        Some(json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "code": {"type": "string"},
                    "old": {"type": "string"},
                    "new": {"type": "string"},
                    "matcher": {"type": "string"},
                    "classify": {"type": "object"},
                    "criticality": {"type": "string"},
                    "justification": {"type": "string"}
                },
                "required": ["code"],
                "additionalProperties": false
            }
        }))
    }

    fn initialize(&mut self, context: &AnalysisContext) -> anyhow::Result<()> {
        if context.configuration().is_null() {
            return Ok(());
        }

        let configs: Vec<RuleConfig> =
            serde_json::from_value(context.configuration().clone())?;
        self.rules = configs
            .into_iter()
            .map(|config| compile_rule(config, context))
            .collect::<anyhow::Result<_>>()?;
        Ok(())
    }
}

/// Compiles one reclassification rule.
fn compile_rule(config: RuleConfig, context: &AnalysisContext) -> anyhow::Result<Rule> {
    let matcher_id = config.matcher.as_deref().unwrap_or(REGEX_MATCHER_ID);
    let matcher = context
        .matcher(matcher_id)
        .ok_or_else(|| anyhow::anyhow!("unknown element matcher `{matcher_id}`"))?;

    let old = config
        .old
        .as_deref()
        .map(|expression| matcher.compile(expression))
        .transpose()?;
    let new = config
        .new
        .as_deref()
        .map(|expression| matcher.compile(expression))
        .transpose()?;

    let criticality = config
        .criticality
        .map(|name| {
            context
                .criticalities()
                .get(&name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unknown criticality `{name}`"))
        })
        .transpose()?;

    Ok(Rule {
        code: Regex::new(&config.code)?,
        gate: MatchGate::new(old, new),
        classify: config.classify,
        criticality,
        justification: config.justification,
    })
}

impl Transform for ReclassifyTransform {
    fn apply(
        &mut self,
        _: &ElementPair<'_>,
        difference: &Difference,
    ) -> anyhow::Result<TransformResolution> {
        for rule in &self.rules {
            if !rule.code.is_match(difference.code()) || !rule.gate.matches() {
                continue;
            }

            let mut updated = difference.clone();
            for (dimension, severity) in &rule.classify {
                updated = updated.with_classification(*dimension, *severity);
            }
            if let Some(criticality) = &rule.criticality {
                updated = updated.with_criticality(criticality.clone());
            }
            if let Some(justification) = &rule.justification {
                updated = updated.with_justification(justification.clone());
            }

            if updated == *difference {
                return Ok(TransformResolution::Keep);
            }

            debug!(code = difference.code(), "reclassifying difference");
            return Ok(TransformResolution::Replace(vec![updated]));
        }

        Ok(TransformResolution::Undecided)
    }

    fn start_traversal(&mut self, analyzer_id: &str) {
        for rule in &mut self.rules {
            rule.gate.start_traversal(analyzer_id);
        }
    }

    fn start_elements(&mut self, pair: &ElementPair<'_>) {
        for rule in &mut self.rules {
            rule.gate.start_elements(pair);
        }
    }

    fn end_elements(&mut self, pair: &ElementPair<'_>) {
        for rule in &mut self.rules {
            rule.gate.end_elements(pair);
        }
    }
}

impl std::fmt::Debug for ReclassifyTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReclassifyTransform")
            .field("rules", &self.rules.len())
            .finish()
    }
}
