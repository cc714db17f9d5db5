//! The ignore transform.

use apidrift_analysis::AnalysisContext;
use apidrift_analysis::ElementPair;
use apidrift_analysis::Extension;
use apidrift_analysis::MatchGate;
use apidrift_analysis::Transform;
use apidrift_analysis::TransformResolution;
use apidrift_model::Difference;
use regex::Regex;
use serde_json::json;
use tracing::debug;

use crate::matcher::REGEX_MATCHER_ID;

/// The extension id of the ignore transform.
pub const IGNORE_TRANSFORM_ID: &str = "basic.ignore";

/// The configuration of one ignore rule.
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
    /// Why ignoring the matched differences is acceptable.
    #[serde(default)]
    justification: Option<String>,
}

/// A compiled ignore rule.
struct Rule {
    /// The compiled code regex.
    code: Regex,
    /// The gate over the rule's element expressions.
    gate: MatchGate,
    /// Why ignoring the matched differences is acceptable.
    justification: Option<String>,
}

/// A transform dropping differences matched by its configured rules.
///
/// A rule matches a difference when the difference's code matches the
/// rule's code regex and the element pair satisfies the rule's bound
/// element expressions.
#[derive(Default)]
pub struct IgnoreTransform {
    /// The compiled rules.
    rules: Vec<Rule>,
}

impl IgnoreTransform {
    /// Creates an ignore transform with no rules.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Extension for IgnoreTransform {
    fn extension_id(&self) -> Option<&str> {
        Some(IGNORE_TRANSFORM_ID)
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

/// Compiles one ignore rule.
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

    Ok(Rule {
        code: Regex::new(&config.code)?,
        gate: MatchGate::new(old, new),
        justification: config.justification,
    })
}

impl Transform for IgnoreTransform {
    fn apply(
        &mut self,
        _: &ElementPair<'_>,
        difference: &Difference,
    ) -> anyhow::Result<TransformResolution> {
        for rule in &self.rules {
            if !rule.code.is_match(difference.code()) || !rule.gate.matches() {
                continue;
            }

            debug!(
                code = difference.code(),
                justification = rule.justification.as_deref().unwrap_or(""),
                "ignoring difference"
            );
            return Ok(TransformResolution::discard());
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

impl std::fmt::Debug for IgnoreTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IgnoreTransform")
            .field("rules", &self.rules.len())
            .finish()
    }
}
