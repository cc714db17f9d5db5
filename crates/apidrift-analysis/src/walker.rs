//! Implementation of the paired forest walker.
//!
//! The walker drives a lock-step, depth-first traversal of two forests. At
//! each level it zips the sorted child sequences of the parent pair: equal
//! signatures yield a matched pair, a lower signature on one side yields a
//! half-pair with the other side missing. Traversal state is an explicit
//! frame stack so deep forests cannot exhaust the call stack.

use apidrift_model::ElementId;
use apidrift_model::Forest;
use tokio_util::sync::CancellationToken;

use crate::ElementPair;
use crate::Error;

/// The identifiers of a pair of elements, one per forest side.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct PairIds {
    /// The identifier of the old element, if present.
    old: Option<ElementId>,
    /// The identifier of the new element, if present.
    new: Option<ElementId>,
}

/// A visitor receiving the pairs of a lock-step traversal.
///
/// Within a traversal, `leave` is called exactly once for every `enter`,
/// LIFO-nested; siblings arrive in signature order.
pub trait PairVisitor {
    /// Enters a pair of elements.
    ///
    /// Returns whether the traversal should descend into the pair's
    /// children.
    fn enter(&mut self, pair: &ElementPair<'_>) -> Result<bool, Error>;

    /// Leaves a pair of elements.
    fn leave(&mut self, pair: &ElementPair<'_>) -> Result<(), Error>;
}

/// A traversal frame: the zipped pairs of one sibling level.
#[derive(Debug)]
struct Frame {
    /// The pairs of the level, in signature order.
    pairs: Vec<PairIds>,
    /// The index of the next pair to visit.
    index: usize,
    /// The parent pair the level belongs to, absent for the root level.
    parent: Option<PairIds>,
}

/// Walks two forests in lock-step.
#[derive(Debug)]
pub struct ForestWalker<'a> {
    /// The old forest.
    old: &'a Forest,
    /// The new forest.
    new: &'a Forest,
    /// The token consulted between element visits.
    cancellation: CancellationToken,
}

impl<'a> ForestWalker<'a> {
    /// Creates a walker over the given forests.
    pub fn new(old: &'a Forest, new: &'a Forest) -> Self {
        Self {
            old,
            new,
            cancellation: CancellationToken::new(),
        }
    }

    /// Sets the cancellation token checked between element visits.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Walks the forests, feeding every pair to the visitor.
    ///
    /// Visits are in deterministic order: siblings by signature, depth
    /// first, enter before the children and leave after them.
    pub fn walk(&self, visitor: &mut dyn PairVisitor) -> Result<(), Error> {
        let mut frames = vec![Frame {
            pairs: self.zip(self.old.root_ids(), self.new.root_ids()),
            index: 0,
            parent: None,
        }];

        while !frames.is_empty() {
            if self.cancellation.is_cancelled() {
                return Err(Error::RunCancelled);
            }

            let next = {
                let frame = frames.last_mut().expect("the frame stack is non-empty");
                if frame.index < frame.pairs.len() {
                    let ids = frame.pairs[frame.index];
                    frame.index += 1;
                    Some(ids)
                } else {
                    None
                }
            };

            match next {
                Some(ids) => {
                    let pair = self.resolve(ids);
                    let descend = visitor.enter(&pair)?;
                    let children = if descend {
                        self.zip_children(ids)
                    } else {
                        Vec::new()
                    };

                    if children.is_empty() {
                        visitor.leave(&pair)?;
                    } else {
                        frames.push(Frame {
                            pairs: children,
                            index: 0,
                            parent: Some(ids),
                        });
                    }
                }
                None => {
                    let frame = frames.pop().expect("the frame stack is non-empty");
                    if let Some(parent) = frame.parent {
                        visitor.leave(&self.resolve(parent))?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Resolves pair identifiers into an element pair.
    fn resolve(&self, ids: PairIds) -> ElementPair<'a> {
        ElementPair::new(
            ids.old.map(|id| self.old.element(id)),
            ids.new.map(|id| self.new.element(id)),
        )
    }

    /// Zips the children of a pair.
    fn zip_children(&self, ids: PairIds) -> Vec<PairIds> {
        let old_children = ids
            .old
            .map(|id| self.old.element(id).child_ids())
            .unwrap_or(&[]);
        let new_children = ids
            .new
            .map(|id| self.new.element(id).child_ids())
            .unwrap_or(&[]);
        self.zip(old_children, new_children)
    }

    /// Zips two sorted sibling sequences by kind and signature.
    fn zip(&self, old_ids: &[ElementId], new_ids: &[ElementId]) -> Vec<PairIds> {
        let mut pairs = Vec::with_capacity(old_ids.len().max(new_ids.len()));
        let mut old_iter = old_ids.iter().peekable();
        let mut new_iter = new_ids.iter().peekable();

        loop {
            match (old_iter.peek(), new_iter.peek()) {
                (Some(o), Some(n)) => {
                    let old_element = self.old.element(**o);
                    let new_element = self.new.element(**n);
                    match old_element.cmp(&new_element) {
                        std::cmp::Ordering::Equal => {
                            pairs.push(PairIds {
                                old: Some(**o),
                                new: Some(**n),
                            });
                            old_iter.next();
                            new_iter.next();
                        }
                        std::cmp::Ordering::Less => {
                            pairs.push(PairIds {
                                old: Some(**o),
                                new: None,
                            });
                            old_iter.next();
                        }
                        std::cmp::Ordering::Greater => {
                            pairs.push(PairIds {
                                old: None,
                                new: Some(**n),
                            });
                            new_iter.next();
                        }
                    }
                }
                (Some(o), None) => {
                    pairs.push(PairIds {
                        old: Some(**o),
                        new: None,
                    });
                    old_iter.next();
                }
                (None, Some(n)) => {
                    pairs.push(PairIds {
                        old: None,
                        new: Some(**n),
                    });
                    new_iter.next();
                }
                (None, None) => break,
            }
        }

        pairs
    }
}

#[cfg(test)]
mod test {
    use apidrift_model::ElementKind;
    use pretty_assertions::assert_eq;

    use super::*;

    /// A visitor recording the pairs it sees.
    #[derive(Default)]
    struct Recording {
        /// The recorded events.
        events: Vec<String>,
        /// Whether to descend into children.
        descend: bool,
    }

    impl PairVisitor for Recording {
        fn enter(&mut self, pair: &ElementPair<'_>) -> Result<bool, Error> {
            self.events.push(format!("enter {pair}"));
            Ok(self.descend)
        }

        fn leave(&mut self, pair: &ElementPair<'_>) -> Result<(), Error> {
            self.events.push(format!("leave {pair}"));
            Ok(())
        }
    }

    /// Builds a forest with the given root signatures.
    fn forest_with_roots(signatures: &[&str]) -> Forest {
        let mut forest = Forest::new();
        for signature in signatures {
            forest.add_root(ElementKind::Type, *signature, *signature, None);
        }
        forest
    }

    #[test]
    fn equal_roots_pair_up_in_order() {
        let old = forest_with_roots(&["B", "A", "C"]);
        let new = forest_with_roots(&["C", "B", "A"]);

        let mut visitor = Recording::default();
        ForestWalker::new(&old, &new).walk(&mut visitor).unwrap();

        assert_eq!(
            visitor.events,
            vec![
                "enter A", "leave A", "enter B", "leave B", "enter C", "leave C"
            ]
        );
    }

    #[test]
    fn unmatched_roots_become_half_pairs() {
        let old = forest_with_roots(&["A", "C"]);
        let new = forest_with_roots(&["B", "C"]);

        let mut visitor = Recording::default();
        ForestWalker::new(&old, &new).walk(&mut visitor).unwrap();

        assert_eq!(
            visitor.events,
            vec![
                "enter A -> (none)",
                "leave A -> (none)",
                "enter (none) -> B",
                "leave (none) -> B",
                "enter C",
                "leave C",
            ]
        );
    }

    #[test]
    fn one_empty_side_yields_only_half_pairs() {
        let old = forest_with_roots(&["A", "B"]);
        let new = Forest::new();

        let mut visitor = Recording::default();
        ForestWalker::new(&old, &new).walk(&mut visitor).unwrap();

        assert_eq!(
            visitor.events,
            vec![
                "enter A -> (none)",
                "leave A -> (none)",
                "enter B -> (none)",
                "leave B -> (none)",
            ]
        );
    }

    #[test]
    fn children_are_visited_between_enter_and_leave() {
        let mut old = Forest::new();
        let ty = old.add_root(ElementKind::Type, "A", "A", None);
        old.add_child(ty, ElementKind::Method, "m()", "A::m()", None);
        let mut new = Forest::new();
        let ty = new.add_root(ElementKind::Type, "A", "A", None);
        new.add_child(ty, ElementKind::Method, "m()", "A::m()", None);

        let mut visitor = Recording {
            descend: true,
            ..Default::default()
        };
        ForestWalker::new(&old, &new).walk(&mut visitor).unwrap();

        assert_eq!(
            visitor.events,
            vec!["enter A", "enter A::m()", "leave A::m()", "leave A"]
        );
    }

    #[test]
    fn no_descend_skips_children() {
        let mut old = Forest::new();
        let ty = old.add_root(ElementKind::Type, "A", "A", None);
        old.add_child(ty, ElementKind::Method, "m()", "A::m()", None);
        let new = Forest::new();

        let mut visitor = Recording::default();
        ForestWalker::new(&old, &new).walk(&mut visitor).unwrap();

        assert_eq!(visitor.events, vec!["enter A -> (none)", "leave A -> (none)"]);
    }

    #[test]
    fn cancellation_surfaces_between_visits() {
        let old = forest_with_roots(&["A"]);
        let new = forest_with_roots(&["A"]);

        let token = CancellationToken::new();
        token.cancel();

        let mut visitor = Recording::default();
        let error = ForestWalker::new(&old, &new)
            .with_cancellation(token)
            .walk(&mut visitor)
            .unwrap_err();
        assert!(matches!(error, Error::RunCancelled));
        assert!(visitor.events.is_empty());
    }
}
