//! The exact and regex element matchers.

use std::sync::Arc;

use apidrift_analysis::CompiledRecipe;
use apidrift_analysis::ElementMatcher;
use apidrift_analysis::Extension;
use apidrift_analysis::StartResult;
use apidrift_analysis::Ternary;
use apidrift_analysis::TreeFilter;
use apidrift_model::Element;
use regex::Regex;

/// The extension id of the exact matcher.
pub const EXACT_MATCHER_ID: &str = "matcher.exact";

/// The extension id of the regex matcher.
pub const REGEX_MATCHER_ID: &str = "matcher.regex";

/// A matcher whose expressions match element representations exactly.
#[derive(Copy, Clone, Debug, Default)]
pub struct ExactMatcher;

impl Extension for ExactMatcher {
    fn extension_id(&self) -> Option<&str> {
        Some(EXACT_MATCHER_ID)
    }
}

impl ElementMatcher for ExactMatcher {
    fn compile(&self, expression: &str) -> anyhow::Result<Arc<dyn CompiledRecipe>> {
        Ok(Arc::new(DisplayRecipe {
            predicate: DisplayPredicate::Exact(expression.to_string()),
        }))
    }
}

/// A matcher whose expressions are regexes over element representations.
#[derive(Copy, Clone, Debug, Default)]
pub struct RegexMatcher;

impl Extension for RegexMatcher {
    fn extension_id(&self) -> Option<&str> {
        Some(REGEX_MATCHER_ID)
    }
}

impl ElementMatcher for RegexMatcher {
    fn compile(&self, expression: &str) -> anyhow::Result<Arc<dyn CompiledRecipe>> {
        let regex = Regex::new(expression)?;
        Ok(Arc::new(DisplayRecipe {
            predicate: DisplayPredicate::Regex(regex),
        }))
    }
}

/// A predicate over element human-readable representations.
#[derive(Clone, Debug)]
enum DisplayPredicate {
    /// The representation must equal the expression.
    Exact(String),
    /// The representation must match the regex.
    Regex(Regex),
}

impl DisplayPredicate {
    /// Evaluates the predicate over a representation.
    fn matches(&self, display: &str) -> bool {
        match self {
            Self::Exact(expected) => display == expected,
            Self::Regex(regex) => regex.is_match(display),
        }
    }
}

/// A recipe testing element representations against a predicate.
#[derive(Clone, Debug)]
struct DisplayRecipe {
    /// The compiled predicate.
    predicate: DisplayPredicate,
}

impl CompiledRecipe for DisplayRecipe {
    fn filter_for(&self, _: &str) -> Option<Box<dyn TreeFilter>> {
        Some(Box::new(DisplayFilter {
            predicate: self.predicate.clone(),
        }))
    }
}

/// The tree filter of a [`DisplayRecipe`].
#[derive(Clone, Debug)]
struct DisplayFilter {
    /// The compiled predicate.
    predicate: DisplayPredicate,
}

impl TreeFilter for DisplayFilter {
    fn start(&mut self, element: Element<'_>) -> StartResult {
        StartResult::new(
            Ternary::from(self.predicate.matches(element.display_name())),
            Ternary::Yes,
        )
    }

    fn finish_element(&mut self, element: Element<'_>) -> Ternary {
        Ternary::from(self.predicate.matches(element.display_name()))
    }
}

#[cfg(test)]
mod test {
    use apidrift_model::ElementKind;
    use apidrift_model::Forest;
    use pretty_assertions::assert_eq;

    use super::*;

    /// Builds a forest with a single root of the given representation.
    fn forest(display: &str) -> Forest {
        let mut forest = Forest::new();
        forest.add_root(ElementKind::Type, display, display, None);
        forest
    }

    #[test]
    fn exact_matcher_compares_representations() {
        let recipe = ExactMatcher.compile("class Calc").unwrap();
        let mut filter = recipe.filter_for("any").unwrap();

        let matching = forest("class Calc");
        let other = forest("class Calculator");
        assert_eq!(
            filter.start(matching.roots().next().unwrap()).matched,
            Ternary::Yes
        );
        assert_eq!(
            filter.start(other.roots().next().unwrap()).matched,
            Ternary::No
        );
    }

    #[test]
    fn regex_matcher_compiles_expressions() {
        let recipe = RegexMatcher.compile("^class Calc.*$").unwrap();
        let mut filter = recipe.filter_for("any").unwrap();

        let matching = forest("class Calculator");
        assert_eq!(
            filter.start(matching.roots().next().unwrap()).matched,
            Ternary::Yes
        );
    }

    #[test]
    fn invalid_regex_fails_to_compile() {
        assert!(RegexMatcher.compile("(unclosed").is_err());
    }
}
