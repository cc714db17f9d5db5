//! Implementation of tree filters.
//!
//! A tree filter is consulted as a forest is traversed. For every element
//! the walker calls [`TreeFilter::start`] on entry and
//! [`TreeFilter::finish_element`] on exit, paired and LIFO-nested. A filter
//! may defer its decision: an undecided element is tracked by the walker and
//! resolved through the terminal [`TreeFilter::finish`] once the traversal
//! is over. Elements left unresolved by the terminal finish are excluded.

use apidrift_model::Element;
use apidrift_model::ElementId;
use indexmap::IndexMap;

use crate::Extension;
use crate::Ternary;

/// The result of starting an element.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StartResult {
    /// Whether the element is admitted by the filter.
    pub matched: Ternary,
    /// Whether the traversal should descend into the element's children.
    pub descend: Ternary,
}

impl StartResult {
    /// A result admitting the element and descending into its children.
    pub const MATCH_AND_DESCEND: StartResult = StartResult {
        matched: Ternary::Yes,
        descend: Ternary::Yes,
    };

    /// A result excluding the element while still descending, so children
    /// may re-include themselves.
    pub const EXCLUDE_AND_DESCEND: StartResult = StartResult {
        matched: Ternary::No,
        descend: Ternary::Yes,
    };

    /// A result excluding the element and its whole subtree.
    pub const SKIP: StartResult = StartResult {
        matched: Ternary::No,
        descend: Ternary::No,
    };

    /// Creates a new start result.
    pub fn new(matched: Ternary, descend: Ternary) -> Self {
        Self { matched, descend }
    }
}

/// A three-valued predicate over elements with deferred resolution.
pub trait TreeFilter {
    /// Starts an element.
    ///
    /// Called when the traversal enters the element.
    fn start(&mut self, element: Element<'_>) -> StartResult;

    /// Finishes an element.
    ///
    /// Called when the traversal leaves the element, exactly once for every
    /// [`TreeFilter::start`], LIFO-nested. Returning a decided value
    /// resolves an element that was undecided at start; returning
    /// [`Ternary::Undecided`] leaves the start decision in place.
    fn finish_element(&mut self, element: Element<'_>) -> Ternary {
        let _ = element;
        Ternary::Undecided
    }

    /// Finishes the traversal, resolving elements that are still undecided.
    ///
    /// Returns the final resolution for each element the filter can now
    /// decide. Elements absent from the returned map are excluded.
    fn finish(&mut self) -> IndexMap<ElementId, Ternary> {
        IndexMap::new()
    }
}

/// Provides tree filters for archive analyzers.
///
/// The driver composes the filters of every admitted provider into a single
/// intersection per side of the comparison.
pub trait FilterProvider: Extension {
    /// Gets a fresh tree filter for the given archive analyzer.
    ///
    /// Returns `None` when the provider has no opinion about forests of the
    /// given analyzer.
    fn filter_for(&self, analyzer_id: &str) -> Option<Box<dyn TreeFilter>>;
}

/// A filter admitting every element.
#[derive(Copy, Clone, Debug, Default)]
pub struct MatchAll;

impl TreeFilter for MatchAll {
    fn start(&mut self, _: Element<'_>) -> StartResult {
        StartResult::MATCH_AND_DESCEND
    }

    fn finish_element(&mut self, _: Element<'_>) -> Ternary {
        Ternary::Yes
    }
}

/// The composition mode of a [`Composite`] filter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Mode {
    /// Every constituent must admit an element.
    Intersection,
    /// At least one constituent must admit an element.
    Union,
}

impl Mode {
    /// Gets the identity value of the mode's match combination.
    fn identity(self) -> Ternary {
        match self {
            Self::Intersection => Ternary::Yes,
            Self::Union => Ternary::No,
        }
    }

    /// Combines two match values under the mode.
    fn combine(self, a: Ternary, b: Ternary) -> Ternary {
        match self {
            Self::Intersection => a.and(b),
            Self::Union => a.or(b),
        }
    }
}

/// A composition of tree filters.
///
/// Construct with [`intersection`] or [`union`]. The composite tracks the
/// per-constituent state of every element whose combined decision is still
/// undecided and resolves them in its terminal finish by consulting the
/// constituents' terminal finishes.
pub struct Composite {
    /// The composed filters.
    filters: Vec<Box<dyn TreeFilter>>,
    /// The composition mode.
    mode: Mode,
    /// Per-constituent match state of elements with an undecided combined
    /// decision.
    pending: IndexMap<ElementId, Vec<Ternary>>,
}

impl Composite {
    /// Combines the given per-constituent states under the mode.
    fn combined(&self, states: &[Ternary]) -> Ternary {
        states
            .iter()
            .fold(self.mode.identity(), |acc, s| self.mode.combine(acc, *s))
    }
}

impl TreeFilter for Composite {
    fn start(&mut self, element: Element<'_>) -> StartResult {
        let mut states = Vec::with_capacity(self.filters.len());
        let mut descend = match self.mode {
            // Descend only while every constituent may still match below
            Mode::Intersection => Ternary::Yes,
            // Descend while any constituent may match below
            Mode::Union => Ternary::No,
        };

        for filter in &mut self.filters {
            let result = filter.start(element);
            states.push(result.matched);
            descend = self.mode.combine(descend, result.descend);
        }

        let matched = self.combined(&states);
        if matched == Ternary::Undecided {
            self.pending.insert(element.id(), states);
        }

        StartResult { matched, descend }
    }

    fn finish_element(&mut self, element: Element<'_>) -> Ternary {
        let results: Vec<Ternary> = self
            .filters
            .iter_mut()
            .map(|f| f.finish_element(element))
            .collect();

        let Some(states) = self.pending.get_mut(&element.id()) else {
            // The element was decided at start; there is nothing to refine
            return Ternary::Undecided;
        };

        for (state, result) in states.iter_mut().zip(results) {
            if result.is_decided() {
                *state = result;
            }
        }

        let states = states.clone();
        let combined = self.combined(&states);
        if combined.is_decided() {
            self.pending.swap_remove(&element.id());
        }
        combined
    }

    fn finish(&mut self) -> IndexMap<ElementId, Ternary> {
        let resolutions: Vec<IndexMap<ElementId, Ternary>> =
            self.filters.iter_mut().map(|f| f.finish()).collect();

        let mut result = IndexMap::new();
        for (id, states) in std::mem::take(&mut self.pending) {
            let mut combined = self.mode.identity();
            for (index, state) in states.iter().enumerate() {
                let state = if state.is_decided() {
                    *state
                } else {
                    resolutions[index]
                        .get(&id)
                        .copied()
                        .unwrap_or(Ternary::Undecided)
                };
                combined = self.mode.combine(combined, state);
            }
            result.insert(id, combined);
        }
        result
    }
}

impl std::fmt::Debug for Composite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composite")
            .field("mode", &self.mode)
            .field("filters", &self.filters.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Composes filters so that an element is admitted only when every filter
/// admits it.
///
/// An intersection of no filters admits everything.
pub fn intersection(filters: Vec<Box<dyn TreeFilter>>) -> Composite {
    Composite {
        filters,
        mode: Mode::Intersection,
        pending: Default::default(),
    }
}

/// Composes filters so that an element is admitted when any filter admits
/// it.
///
/// A union of no filters admits nothing.
pub fn union(filters: Vec<Box<dyn TreeFilter>>) -> Composite {
    Composite {
        filters,
        mode: Mode::Union,
        pending: Default::default(),
    }
}
