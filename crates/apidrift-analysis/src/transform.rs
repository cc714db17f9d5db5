//! Implementation of difference transforms and the transform pipeline.
//!
//! Transforms post-process the raw differences produced by checks. They are
//! organized into ordered blocks; within a block, the transforms run in
//! order over the difference set repeatedly until a whole pass makes no
//! modification. The iteration cap bounds runaway configurations where two
//! transforms keep re-introducing what the other removed; hitting the cap is
//! a fatal error that identifies the oscillating difference codes.

use std::sync::Arc;

use apidrift_model::Compatibility;
use apidrift_model::Difference;
use apidrift_model::Severity;
use indexmap::IndexSet;
use tracing::debug;

use crate::CompiledRecipe;
use crate::ElementPair;
use crate::Error;
use crate::Extension;
use crate::Ternary;
use crate::TreeFilter;

/// The difference code recording a transform failure.
pub const TRANSFORM_FAILURE_CODE: &str = "kernel.transformFailure";

/// The resolution a transform returns for a difference.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformResolution {
    /// The difference is not this transform's concern.
    Undecided,
    /// The difference is kept unchanged.
    Keep,
    /// The difference is replaced with the given set.
    ///
    /// An empty set drops the difference.
    Replace(Vec<Difference>),
}

impl TransformResolution {
    /// A resolution dropping the difference.
    pub fn discard() -> Self {
        Self::Replace(Vec::new())
    }
}

/// A pluggable post-processor of differences.
///
/// Transforms receive traversal events so they can evaluate element
/// matchers against the ancestors of the current pair, not just the pair
/// itself.
pub trait Transform: Extension {
    /// Applies the transform to a difference of the given pair.
    fn apply(
        &mut self,
        pair: &ElementPair<'_>,
        difference: &Difference,
    ) -> anyhow::Result<TransformResolution>;

    /// Called when the traversal of an analyzer's forest pair starts.
    fn start_traversal(&mut self, analyzer_id: &str) {
        let _ = analyzer_id;
    }

    /// Called when the traversal enters an element pair.
    fn start_elements(&mut self, pair: &ElementPair<'_>) {
        let _ = pair;
    }

    /// Called when the traversal leaves an element pair.
    fn end_elements(&mut self, pair: &ElementPair<'_>) {
        let _ = pair;
    }

    /// Called when the traversal of an analyzer's forest pair ends.
    fn end_traversal(&mut self) {}
}

/// The ordered transform blocks of a run.
pub struct TransformPipeline {
    /// The transforms, grouped into ordered blocks.
    blocks: Vec<Vec<Box<dyn Transform>>>,
    /// The per-block iteration cap.
    cap: u32,
}

impl TransformPipeline {
    /// Creates a pipeline over the given blocks with the given per-block
    /// iteration cap.
    pub fn new(blocks: Vec<Vec<Box<dyn Transform>>>, cap: u32) -> Self {
        Self { blocks, cap }
    }

    /// Determines if the pipeline has no transforms at all.
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|block| block.is_empty())
    }

    /// Iterates the transforms of every block mutably, in block order.
    pub fn transforms_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Transform>> {
        self.blocks.iter_mut().flatten()
    }

    /// Forwards a traversal start to every transform.
    pub fn start_traversal(&mut self, analyzer_id: &str) {
        for transform in self.transforms_mut() {
            transform.start_traversal(analyzer_id);
        }
    }

    /// Forwards an element pair entry to every transform.
    pub fn start_elements(&mut self, pair: &ElementPair<'_>) {
        for transform in self.transforms_mut() {
            transform.start_elements(pair);
        }
    }

    /// Forwards an element pair exit to every transform.
    pub fn end_elements(&mut self, pair: &ElementPair<'_>) {
        for transform in self.transforms_mut() {
            transform.end_elements(pair);
        }
    }

    /// Forwards a traversal end to every transform.
    pub fn end_traversal(&mut self) {
        for transform in self.transforms_mut() {
            transform.end_traversal();
        }
    }

    /// Routes the differences of a pair through every block.
    ///
    /// Each block runs to a local fixpoint before its output is exposed to
    /// the next block. A transform failure keeps the difference it was
    /// applied to; the failure itself is recorded as a synthetic difference
    /// appended to the final set without being re-examined by transforms.
    pub fn process(
        &mut self,
        pair: &ElementPair<'_>,
        differences: Vec<Difference>,
    ) -> Result<Vec<Difference>, Error> {
        let mut current = differences;
        let mut failures = Vec::new();

        for (block_index, block) in self.blocks.iter_mut().enumerate() {
            if block.is_empty() {
                continue;
            }

            let mut iterations = 0u32;
            loop {
                iterations += 1;
                let mut changed = false;
                let mut touched: IndexSet<String> = IndexSet::new();

                for transform in block.iter_mut() {
                    let mut next = Vec::with_capacity(current.len());
                    for difference in std::mem::take(&mut current) {
                        match transform.apply(pair, &difference) {
                            Ok(TransformResolution::Undecided)
                            | Ok(TransformResolution::Keep) => next.push(difference),
                            Ok(TransformResolution::Replace(replacements)) => {
                                if replacements.len() == 1 && replacements[0] == difference {
                                    // Replacing a difference with itself is
                                    // not a modification
                                    next.push(difference);
                                    continue;
                                }

                                debug!(
                                    transform =
                                        transform.extension_id().unwrap_or("<anonymous>"),
                                    "difference `{code}` of {pair} replaced by {count} \
                                     difference(s)",
                                    code = difference.code(),
                                    count = replacements.len(),
                                );
                                changed = true;
                                touched.insert(difference.code().to_string());
                                for replacement in &replacements {
                                    touched.insert(replacement.code().to_string());
                                }
                                next.extend(replacements);
                            }
                            Err(e) => {
                                debug!(
                                    transform =
                                        transform.extension_id().unwrap_or("<anonymous>"),
                                    "transform failed on `{code}` of {pair}: {e:#}",
                                    code = difference.code(),
                                );
                                failures
                                    .push(transform_failure(transform.extension_id(), &e));
                                next.push(difference);
                            }
                        }
                    }
                    current = next;
                }

                if !changed {
                    break;
                }

                if iterations >= self.cap {
                    let mut codes: Vec<String> = touched.into_iter().collect();
                    codes.sort();
                    return Err(Error::TransformNonConvergence {
                        block: block_index,
                        iterations,
                        codes,
                    });
                }
            }
        }

        current.extend(failures);
        Ok(current)
    }
}

impl std::fmt::Debug for TransformPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformPipeline")
            .field(
                "blocks",
                &self.blocks.iter().map(|b| b.len()).collect::<Vec<_>>(),
            )
            .field("cap", &self.cap)
            .finish()
    }
}

/// Creates a difference recording a failed transform.
fn transform_failure(transform: Option<&str>, error: &anyhow::Error) -> Difference {
    Difference::new(TRANSFORM_FAILURE_CODE, "transform failed")
        .with_description(
            "a transform failed while processing a difference; the difference was kept",
        )
        .with_classification(Compatibility::Other, Severity::Breaking)
        .with_attachment("transform", transform.unwrap_or("<anonymous>"))
        .with_attachment("error", format!("{error:#}"))
}

/// Evaluates a pair of compiled recipes against the traversal, one bound to
/// the old element and one to the new element of each pair.
///
/// Transforms that restrict their rules to matched elements own a gate per
/// rule and forward their traversal events to it; [`MatchGate::matches`]
/// then answers for the pair currently on top of the traversal. Because the
/// gate drives full tree filters through the traversal, recipes may depend
/// on the ancestors of the current pair.
pub struct MatchGate {
    /// The recipe bound to old elements.
    old_recipe: Option<Arc<dyn CompiledRecipe>>,
    /// The recipe bound to new elements.
    new_recipe: Option<Arc<dyn CompiledRecipe>>,
    /// The filter of the old recipe for the current traversal.
    old_filter: Option<Box<dyn TreeFilter>>,
    /// The filter of the new recipe for the current traversal.
    new_filter: Option<Box<dyn TreeFilter>>,
    /// The match state of the old side per traversal depth.
    old_stack: Vec<Ternary>,
    /// The match state of the new side per traversal depth.
    new_stack: Vec<Ternary>,
}

impl MatchGate {
    /// Creates a gate over the given recipes.
    ///
    /// An unbound side matches every element.
    pub fn new(
        old_recipe: Option<Arc<dyn CompiledRecipe>>,
        new_recipe: Option<Arc<dyn CompiledRecipe>>,
    ) -> Self {
        Self {
            old_recipe,
            new_recipe,
            old_filter: None,
            new_filter: None,
            old_stack: Vec::new(),
            new_stack: Vec::new(),
        }
    }

    /// Binds the gate's recipes to the given analyzer for a new traversal.
    pub fn start_traversal(&mut self, analyzer_id: &str) {
        self.old_filter = self
            .old_recipe
            .as_ref()
            .and_then(|recipe| recipe.filter_for(analyzer_id));
        self.new_filter = self
            .new_recipe
            .as_ref()
            .and_then(|recipe| recipe.filter_for(analyzer_id));
        self.old_stack.clear();
        self.new_stack.clear();
    }

    /// Pushes an element pair onto the gate.
    pub fn start_elements(&mut self, pair: &ElementPair<'_>) {
        let old = match (&mut self.old_filter, pair.old) {
            (Some(filter), Some(element)) => filter.start(element).matched,
            // A bound predicate cannot match a missing element
            (Some(_), None) => Ternary::No,
            (None, _) => Ternary::Yes,
        };
        let new = match (&mut self.new_filter, pair.new) {
            (Some(filter), Some(element)) => filter.start(element).matched,
            (Some(_), None) => Ternary::No,
            (None, _) => Ternary::Yes,
        };
        self.old_stack.push(old);
        self.new_stack.push(new);
    }

    /// Pops an element pair off the gate.
    pub fn end_elements(&mut self, pair: &ElementPair<'_>) {
        if let (Some(filter), Some(element)) = (&mut self.old_filter, pair.old) {
            let refined = filter.finish_element(element);
            if refined.is_decided() {
                if let Some(top) = self.old_stack.last_mut() {
                    *top = refined;
                }
            }
        }
        if let (Some(filter), Some(element)) = (&mut self.new_filter, pair.new) {
            let refined = filter.finish_element(element);
            if refined.is_decided() {
                if let Some(top) = self.new_stack.last_mut() {
                    *top = refined;
                }
            }
        }
        self.old_stack.pop();
        self.new_stack.pop();
    }

    /// Answers whether the pair currently on top of the traversal matches
    /// both bound recipes.
    ///
    /// An undecided side counts as matching, pending its eventual
    /// resolution.
    pub fn matches(&self) -> bool {
        let old = self.old_stack.last().copied().unwrap_or(Ternary::Yes);
        let new = self.new_stack.last().copied().unwrap_or(Ternary::Yes);
        old.and(new) != Ternary::No
    }
}

impl std::fmt::Debug for MatchGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchGate")
            .field("old_bound", &self.old_recipe.is_some())
            .field("new_bound", &self.new_recipe.is_some())
            .field("depth", &self.old_stack.len())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use apidrift_model::ElementKind;
    use apidrift_model::Forest;
    use pretty_assertions::assert_eq;

    use super::*;

    /// A transform rewriting one difference code into another.
    struct Rewrite {
        /// The code to rewrite.
        from: &'static str,
        /// The code to rewrite to.
        to: &'static str,
    }

    impl Extension for Rewrite {
        fn extension_id(&self) -> Option<&str> {
            Some("test.rewrite")
        }
    }

    impl Transform for Rewrite {
        fn apply(
            &mut self,
            _: &ElementPair<'_>,
            difference: &Difference,
        ) -> anyhow::Result<TransformResolution> {
            if difference.code() == self.from {
                Ok(TransformResolution::Replace(vec![Difference::new(
                    self.to, self.to,
                )]))
            } else {
                Ok(TransformResolution::Undecided)
            }
        }
    }

    /// A transform counting how many passes it participated in.
    struct CountingUndecided {
        /// The number of apply calls observed.
        applications: std::rc::Rc<std::cell::Cell<usize>>,
    }

    impl Extension for CountingUndecided {}

    impl Transform for CountingUndecided {
        fn apply(
            &mut self,
            _: &ElementPair<'_>,
            _: &Difference,
        ) -> anyhow::Result<TransformResolution> {
            self.applications.set(self.applications.get() + 1);
            Ok(TransformResolution::Undecided)
        }
    }

    /// Builds a pair over two single-root forests.
    fn forests() -> (Forest, Forest) {
        let mut old = Forest::new();
        old.add_root(ElementKind::Type, "A", "A", None);
        let mut new = Forest::new();
        new.add_root(ElementKind::Type, "A", "A", None);
        (old, new)
    }

    #[test]
    fn oscillating_block_hits_the_iteration_cap() {
        let (old, new) = forests();
        let pair = ElementPair::new(
            Some(old.roots().next().unwrap()),
            Some(new.roots().next().unwrap()),
        );

        let mut pipeline = TransformPipeline::new(
            vec![vec![
                Box::new(Rewrite { from: "x", to: "y" }),
                Box::new(Rewrite { from: "y", to: "x" }),
            ]],
            10,
        );

        let error = pipeline
            .process(&pair, vec![Difference::new("x", "x")])
            .unwrap_err();
        match error {
            Error::TransformNonConvergence {
                block,
                iterations,
                codes,
            } => {
                assert_eq!(block, 0);
                assert_eq!(iterations, 10);
                assert_eq!(codes, vec!["x".to_string(), "y".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn undecided_transforms_converge_in_one_iteration() {
        let (old, new) = forests();
        let pair = ElementPair::new(
            Some(old.roots().next().unwrap()),
            Some(new.roots().next().unwrap()),
        );

        let applications = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut pipeline = TransformPipeline::new(
            vec![vec![Box::new(CountingUndecided {
                applications: applications.clone(),
            })]],
            10,
        );
        let result = pipeline
            .process(&pair, vec![Difference::new("x", "x")])
            .unwrap();
        assert_eq!(result.len(), 1);

        // One pass over one difference
        assert_eq!(applications.get(), 1);
    }

    #[test]
    fn blocks_see_the_previous_block_output() {
        let (old, new) = forests();
        let pair = ElementPair::new(
            Some(old.roots().next().unwrap()),
            Some(new.roots().next().unwrap()),
        );

        // The second block sees `y`, not the original `x`
        let mut pipeline = TransformPipeline::new(
            vec![
                vec![Box::new(Rewrite { from: "x", to: "y" })],
                vec![Box::new(Rewrite { from: "y", to: "z" })],
            ],
            10,
        );
        let result = pipeline
            .process(&pair, vec![Difference::new("x", "x")])
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].code(), "z");
    }

    #[test]
    fn empty_replacement_drops_the_difference() {
        let (old, new) = forests();
        let pair = ElementPair::new(
            Some(old.roots().next().unwrap()),
            Some(new.roots().next().unwrap()),
        );

        /// A transform dropping every difference.
        struct DropAll;

        impl Extension for DropAll {}

        impl Transform for DropAll {
            fn apply(
                &mut self,
                _: &ElementPair<'_>,
                _: &Difference,
            ) -> anyhow::Result<TransformResolution> {
                Ok(TransformResolution::discard())
            }
        }

        let mut pipeline = TransformPipeline::new(vec![vec![Box::new(DropAll)]], 10);
        let result = pipeline
            .process(&pair, vec![Difference::new("x", "x")])
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn failing_transform_keeps_the_difference_and_records_the_failure() {
        let (old, new) = forests();
        let pair = ElementPair::new(
            Some(old.roots().next().unwrap()),
            Some(new.roots().next().unwrap()),
        );

        /// A transform that always fails.
        struct Failing;

        impl Extension for Failing {
            fn extension_id(&self) -> Option<&str> {
                Some("test.failing")
            }
        }

        impl Transform for Failing {
            fn apply(
                &mut self,
                _: &ElementPair<'_>,
                _: &Difference,
            ) -> anyhow::Result<TransformResolution> {
                anyhow::bail!("boom")
            }
        }

        let mut pipeline = TransformPipeline::new(vec![vec![Box::new(Failing)]], 10);
        let result = pipeline
            .process(&pair, vec![Difference::new("x", "x")])
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].code(), "x");
        assert_eq!(result[1].code(), TRANSFORM_FAILURE_CODE);
        assert_eq!(result[1].attachment("transform"), Some("test.failing"));
    }
}
