//! Implementation of checks and check dispatch.
//!
//! A check is a stateful visitor over paired elements. The dispatcher
//! activates the checks interested in each visited pair, keeps their
//! enter/leave lifecycles balanced and LIFO-nested, and handles the two
//! special traversal modes: non-existence (one side of an ancestor pair is
//! missing) and annotation attachment (annotation differences belong to the
//! containing element's report).

use apidrift_model::Compatibility;
use apidrift_model::Difference;
use apidrift_model::Element;
use apidrift_model::ElementKind;
use apidrift_model::KindSet;
use apidrift_model::Severity;
use indexmap::IndexMap;
use tracing::debug;

use crate::Extension;

/// The difference code recording a check failure.
pub const CHECK_FAILURE_CODE: &str = "kernel.checkFailure";

/// A pair of elements occupying the same position in the old and new
/// forests.
///
/// At least one side is always present; a pair with a missing side is a
/// *half-pair* and represents an addition or a removal.
#[derive(Copy, Clone, Debug)]
pub struct ElementPair<'a> {
    /// The element of the old forest, if present.
    pub old: Option<Element<'a>>,
    /// The element of the new forest, if present.
    pub new: Option<Element<'a>>,
}

impl<'a> ElementPair<'a> {
    /// Creates a new element pair.
    ///
    /// # Panics
    ///
    /// Panics if both sides are missing.
    pub fn new(old: Option<Element<'a>>, new: Option<Element<'a>>) -> Self {
        assert!(
            old.is_some() || new.is_some(),
            "an element pair requires at least one side"
        );
        Self { old, new }
    }

    /// Gets the element present on either side, preferring the old side.
    pub fn either(&self) -> Element<'a> {
        self.old
            .or(self.new)
            .expect("an element pair has at least one side")
    }

    /// Gets the kind of the pair.
    pub fn kind(&self) -> ElementKind {
        self.either().kind()
    }

    /// Determines if one side of the pair is missing.
    pub fn is_half(&self) -> bool {
        self.old.is_none() || self.new.is_none()
    }
}

impl std::fmt::Display for ElementPair<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.old, &self.new) {
            (Some(old), Some(new)) if old.display_name() == new.display_name() => {
                write!(f, "{old}")
            }
            (Some(old), Some(new)) => write!(f, "{old} -> {new}"),
            (Some(old), None) => write!(f, "{old} -> (none)"),
            (None, Some(new)) => write!(f, "(none) -> {new}"),
            (None, None) => unreachable!("an element pair has at least one side"),
        }
    }
}

/// A stateful visitor producing raw differences from element pairs.
pub trait Check: Extension {
    /// Gets the element kinds the check is interested in.
    fn interest(&self) -> KindSet;

    /// Determines if the check should still be activated when one side of
    /// the pair is missing.
    ///
    /// When no check on a run descends on non-existing elements, the walker
    /// skips the subtrees under half-pairs entirely.
    fn descend_on_non_existing(&self) -> bool {
        false
    }

    /// Enters a pair of elements.
    ///
    /// Called before the pair's children are visited.
    fn enter(&mut self, pair: &ElementPair<'_>) -> anyhow::Result<()> {
        let _ = pair;
        Ok(())
    }

    /// Leaves a pair of elements, producing the check's raw differences for
    /// the pair.
    ///
    /// Called after the pair's children have been visited, exactly once for
    /// every successful [`Check::enter`].
    fn leave(&mut self, pair: &ElementPair<'_>) -> anyhow::Result<Vec<Difference>>;
}

/// A visit-stack frame of the dispatcher.
#[derive(Debug)]
struct Frame {
    /// The indices of the checks activated at enter time.
    active: Vec<usize>,
    /// Differences synthesized from check failures during enter.
    failures: Vec<Difference>,
    /// Differences of annotation children, attached to this pair's report.
    annotations: Vec<Difference>,
    /// Whether this frame entered non-existence mode.
    half: bool,
    /// The kind of the entered pair.
    kind: ElementKind,
}

/// Dispatches element pairs to the checks interested in them.
pub struct CheckDispatcher {
    /// The checks of the run.
    checks: Vec<Box<dyn Check>>,
    /// The indices of interested checks per element kind.
    by_kind: IndexMap<ElementKind, Vec<usize>>,
    /// Whether any check descends on non-existing elements.
    any_descending: bool,
    /// The visit stack.
    stack: Vec<Frame>,
    /// The number of half-pair ancestors currently entered.
    ///
    /// While non-zero, only checks descending on non-existing elements are
    /// activated.
    non_existing_depth: usize,
}

impl CheckDispatcher {
    /// Creates a dispatcher over the given checks.
    pub fn new(checks: Vec<Box<dyn Check>>) -> Self {
        let mut by_kind: IndexMap<ElementKind, Vec<usize>> = IndexMap::new();
        for (index, check) in checks.iter().enumerate() {
            for kind in check.interest().iter() {
                by_kind.entry(kind).or_default().push(index);
            }
        }

        let any_descending = checks.iter().any(|c| c.descend_on_non_existing());
        Self {
            checks,
            by_kind,
            any_descending,
            stack: Vec::new(),
            non_existing_depth: 0,
        }
    }

    /// Determines if any check descends on non-existing elements.
    pub fn has_descending_checks(&self) -> bool {
        self.any_descending
    }

    /// Iterates the checks mutably.
    pub fn checks_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Check>> {
        self.checks.iter_mut()
    }

    /// Consumes the dispatcher, returning its checks.
    pub fn into_checks(self) -> Vec<Box<dyn Check>> {
        self.checks
    }

    /// Enters a pair, activating the interested checks.
    ///
    /// A check whose enter fails is deactivated for the pair; the failure is
    /// attached to the pair's differences at leave time.
    pub fn enter_pair(&mut self, pair: &ElementPair<'_>) {
        let kind = pair.kind();
        let non_existing = self.non_existing_depth > 0 || pair.is_half();
        let interested = self.by_kind.get(&kind).cloned().unwrap_or_default();

        let mut active = Vec::with_capacity(interested.len());
        let mut failures = Vec::new();
        for index in interested {
            let check = &mut self.checks[index];
            if non_existing && !check.descend_on_non_existing() {
                continue;
            }

            match check.enter(pair) {
                Ok(()) => active.push(index),
                Err(e) => {
                    debug!(
                        check = check.extension_id().unwrap_or("<anonymous>"),
                        "check failed to enter {pair}: {e:#}"
                    );
                    failures.push(check_failure(check.extension_id(), &e));
                }
            }
        }

        if pair.is_half() {
            self.non_existing_depth += 1;
        }

        self.stack.push(Frame {
            active,
            failures,
            annotations: Vec::new(),
            half: pair.is_half(),
            kind,
        });
    }

    /// Leaves a pair, collecting the differences of the activated checks.
    ///
    /// Differences of annotation pairs are accumulated onto the containing
    /// pair's frame and an empty set is returned for the annotation itself.
    ///
    /// # Panics
    ///
    /// Panics if the leave does not pair with the most recent enter.
    pub fn leave_pair(&mut self, pair: &ElementPair<'_>) -> Vec<Difference> {
        let frame = self.stack.pop().expect("unbalanced leave of a pair");
        assert_eq!(
            frame.kind,
            pair.kind(),
            "leave should pair with the most recent enter"
        );

        let mut differences = frame.failures;
        for index in frame.active {
            let check = &mut self.checks[index];
            match check.leave(pair) {
                Ok(produced) => differences.extend(produced),
                Err(e) => {
                    debug!(
                        check = check.extension_id().unwrap_or("<anonymous>"),
                        "check failed to leave {pair}: {e:#}"
                    );
                    differences.push(check_failure(check.extension_id(), &e));
                }
            }
        }
        differences.extend(frame.annotations);

        if frame.half {
            self.non_existing_depth -= 1;
        }

        // Annotation differences belong to the containing element's report
        if pair.kind() == ElementKind::Annotation {
            if let Some(parent) = self.stack.last_mut() {
                parent.annotations.extend(differences);
                return Vec::new();
            }
        }

        differences
    }
}

impl std::fmt::Debug for CheckDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckDispatcher")
            .field("checks", &self.checks.len())
            .field("stack", &self.stack.len())
            .field("non_existing_depth", &self.non_existing_depth)
            .finish()
    }
}

/// Creates a difference recording a failed check.
fn check_failure(check: Option<&str>, error: &anyhow::Error) -> Difference {
    Difference::new(CHECK_FAILURE_CODE, "check failed")
        .with_description("a check failed while visiting the element pair; the walk continued")
        .with_classification(Compatibility::Other, Severity::Breaking)
        .with_attachment("check", check.unwrap_or("<anonymous>"))
        .with_attachment("error", format!("{error:#}"))
}

#[cfg(test)]
mod test {
    use apidrift_model::Forest;
    use pretty_assertions::assert_eq;

    use super::*;

    /// A check recording its lifecycle events into a shared log.
    struct Recording {
        /// The shared event log.
        log: std::rc::Rc<std::cell::RefCell<Vec<String>>>,
        /// Whether the check descends on non-existing elements.
        descending: bool,
    }

    impl Extension for Recording {
        fn extension_id(&self) -> Option<&str> {
            Some("test.recording")
        }
    }

    impl Check for Recording {
        fn interest(&self) -> KindSet {
            KindSet::ALL
        }

        fn descend_on_non_existing(&self) -> bool {
            self.descending
        }

        fn enter(&mut self, pair: &ElementPair<'_>) -> anyhow::Result<()> {
            self.log.borrow_mut().push(format!("enter {pair}"));
            Ok(())
        }

        fn leave(&mut self, pair: &ElementPair<'_>) -> anyhow::Result<Vec<Difference>> {
            self.log.borrow_mut().push(format!("leave {pair}"));
            Ok(Vec::new())
        }
    }

    /// Builds a forest with one type containing one method.
    fn forest() -> Forest {
        let mut forest = Forest::new();
        let ty = forest.add_root(ElementKind::Type, "Calc", "Calc", None);
        forest.add_child(ty, ElementKind::Method, "add()", "Calc::add()", None);
        forest
    }

    #[test]
    fn lifecycle_is_balanced_and_nested() {
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut dispatcher = CheckDispatcher::new(vec![Box::new(Recording {
            log: log.clone(),
            descending: false,
        })]);

        let old = forest();
        let new = forest();
        let ty = ElementPair::new(Some(old.roots().next().unwrap()), Some(new.roots().next().unwrap()));
        let method = ElementPair::new(
            Some(old.roots().next().unwrap().children().next().unwrap()),
            Some(new.roots().next().unwrap().children().next().unwrap()),
        );

        dispatcher.enter_pair(&ty);
        dispatcher.enter_pair(&method);
        dispatcher.leave_pair(&method);
        dispatcher.leave_pair(&ty);

        assert_eq!(
            *log.borrow(),
            vec![
                "enter Calc",
                "enter Calc::add()",
                "leave Calc::add()",
                "leave Calc"
            ]
        );
    }

    #[test]
    fn non_existence_mode_deactivates_non_descending_checks() {
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut dispatcher = CheckDispatcher::new(vec![Box::new(Recording {
            log: log.clone(),
            descending: false,
        })]);

        let old = forest();
        let half = ElementPair::new(Some(old.roots().next().unwrap()), None);
        dispatcher.enter_pair(&half);
        assert!(dispatcher.leave_pair(&half).is_empty());

        // The non-descending check never saw the half-pair
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn descending_checks_fire_on_half_pairs() {
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut dispatcher = CheckDispatcher::new(vec![Box::new(Recording {
            log: log.clone(),
            descending: true,
        })]);

        let old = forest();
        let half = ElementPair::new(Some(old.roots().next().unwrap()), None);
        dispatcher.enter_pair(&half);
        dispatcher.leave_pair(&half);

        assert_eq!(*log.borrow(), vec!["enter Calc -> (none)", "leave Calc -> (none)"]);
    }

    /// A check producing one difference per leave.
    struct OneDiff;

    impl Extension for OneDiff {}

    impl Check for OneDiff {
        fn interest(&self) -> KindSet {
            KindSet::ALL
        }

        fn leave(&mut self, _: &ElementPair<'_>) -> anyhow::Result<Vec<Difference>> {
            Ok(vec![Difference::new("test.changed", "changed")])
        }
    }

    #[test]
    fn annotation_differences_attach_to_the_containing_pair() {
        let mut old = Forest::new();
        let ty = old.add_root(ElementKind::Type, "Calc", "Calc", None);
        old.add_child(ty, ElementKind::Annotation, "Deprecated", "@Deprecated", None);
        let new = {
            let mut forest = Forest::new();
            let ty = forest.add_root(ElementKind::Type, "Calc", "Calc", None);
            forest.add_child(ty, ElementKind::Annotation, "Deprecated", "@Deprecated", None);
            forest
        };

        let mut dispatcher = CheckDispatcher::new(vec![Box::new(OneDiff)]);

        let ty_pair = ElementPair::new(Some(old.roots().next().unwrap()), Some(new.roots().next().unwrap()));
        let annotation_pair = ElementPair::new(
            Some(old.roots().next().unwrap().children().next().unwrap()),
            Some(new.roots().next().unwrap().children().next().unwrap()),
        );

        dispatcher.enter_pair(&ty_pair);
        dispatcher.enter_pair(&annotation_pair);
        // The annotation's differences are withheld...
        assert!(dispatcher.leave_pair(&annotation_pair).is_empty());
        // ...and emitted with the containing pair
        let differences = dispatcher.leave_pair(&ty_pair);
        assert_eq!(differences.len(), 2);
    }

    /// A check that fails on enter.
    struct FailingEnter;

    impl Extension for FailingEnter {
        fn extension_id(&self) -> Option<&str> {
            Some("test.failing")
        }
    }

    impl Check for FailingEnter {
        fn interest(&self) -> KindSet {
            KindSet::ALL
        }

        fn enter(&mut self, _: &ElementPair<'_>) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }

        fn leave(&mut self, _: &ElementPair<'_>) -> anyhow::Result<Vec<Difference>> {
            unreachable!("a check whose enter failed should not be left")
        }
    }

    #[test]
    fn check_failures_become_differences() {
        let old = forest();
        let pair = ElementPair::new(Some(old.roots().next().unwrap()), None);

        let mut dispatcher = CheckDispatcher::new(vec![Box::new(FailingEnter)]);
        // A failing check is visited even in non-existence mode only if it
        // descends; use a full pair instead
        let new = forest();
        let full = ElementPair::new(pair.old, Some(new.roots().next().unwrap()));

        dispatcher.enter_pair(&full);
        let differences = dispatcher.leave_pair(&full);
        assert_eq!(differences.len(), 1);
        assert_eq!(differences[0].code(), CHECK_FAILURE_CODE);
        assert_eq!(differences[0].attachment("check"), Some("test.failing"));
    }
}
