//! Definition of element kinds and kind sets.

/// The kind of an element in a forest.
///
/// The variant order is significant: siblings of different kinds sort by this
/// order, and [`ElementKind::Annotation`] is deliberately last so that
/// annotation elements always follow every other sibling during traversal.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
pub enum ElementKind {
    /// A module or namespace element.
    Module,

    /// A type element.
    Type,

    /// A method or function element.
    Method,

    /// A field element.
    Field,

    /// A parameter element.
    Parameter,

    /// A format-specific element that fits none of the other kinds.
    Resource,

    /// An annotation element.
    ///
    /// Annotations are terminal and sort last among their siblings.
    Annotation,
}

impl ElementKind {
    /// All element kinds, in sort order.
    pub const ALL: [ElementKind; 7] = [
        ElementKind::Module,
        ElementKind::Type,
        ElementKind::Method,
        ElementKind::Field,
        ElementKind::Parameter,
        ElementKind::Resource,
        ElementKind::Annotation,
    ];
}

/// An error for when an unknown element kind is encountered.
#[derive(Debug)]
pub struct UnknownKindError(String);

impl std::fmt::Display for UnknownKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown element kind: {}", self.0)
    }
}

impl std::error::Error for UnknownKindError {}

impl std::str::FromStr for ElementKind {
    type Err = UnknownKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            s if s.eq_ignore_ascii_case("module") => Ok(Self::Module),
            s if s.eq_ignore_ascii_case("type") => Ok(Self::Type),
            s if s.eq_ignore_ascii_case("method") => Ok(Self::Method),
            s if s.eq_ignore_ascii_case("field") => Ok(Self::Field),
            s if s.eq_ignore_ascii_case("parameter") => Ok(Self::Parameter),
            s if s.eq_ignore_ascii_case("resource") => Ok(Self::Resource),
            s if s.eq_ignore_ascii_case("annotation") => Ok(Self::Annotation),
            _ => Err(UnknownKindError(s.to_string())),
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Module => write!(f, "module"),
            Self::Type => write!(f, "type"),
            Self::Method => write!(f, "method"),
            Self::Field => write!(f, "field"),
            Self::Parameter => write!(f, "parameter"),
            Self::Resource => write!(f, "resource"),
            Self::Annotation => write!(f, "annotation"),
        }
    }
}

/// A set of element kinds.
///
/// Checks use kind sets to declare which element kinds they are interested
/// in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KindSet(u32);

impl KindSet {
    /// A kind set containing every element kind.
    pub const ALL: KindSet = KindSet::new(&ElementKind::ALL);

    /// Constructs a kind set from a slice of kinds.
    ///
    /// # Panics
    ///
    /// This method will panic if the provided slice is empty.
    pub const fn new(kinds: &[ElementKind]) -> Self {
        if kinds.is_empty() {
            panic!("a kind set must be non-empty");
        }

        let mut bits = 0u32;
        let mut i = 0;
        while i < kinds.len() {
            bits |= Self::mask(kinds[i]);
            i += 1;
        }
        Self(bits)
    }

    /// Unions two kind sets together.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Checks if the kind is contained in the set.
    pub const fn contains(&self, kind: ElementKind) -> bool {
        self.0 & Self::mask(kind) != 0
    }

    /// Gets the count of kinds in the set.
    pub const fn count(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Masks the given kind to a `u32`.
    const fn mask(kind: ElementKind) -> u32 {
        1u32 << (kind as u8)
    }

    /// Iterates the kinds in the set, in sort order.
    pub fn iter(&self) -> impl Iterator<Item = ElementKind> + use<> {
        let bits = self.0;
        ElementKind::ALL
            .into_iter()
            .filter(move |k| bits & Self::mask(*k) != 0)
    }
}

/// Display for a kind set.
impl std::fmt::Display for KindSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.iter().collect::<Vec<_>>())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn annotations_sort_last() {
        let mut kinds = ElementKind::ALL;
        kinds.sort();
        assert_eq!(kinds.last(), Some(&ElementKind::Annotation));
    }

    #[test]
    fn kind_set_membership() {
        let set = KindSet::new(&[ElementKind::Type, ElementKind::Method]);
        assert!(set.contains(ElementKind::Type));
        assert!(set.contains(ElementKind::Method));
        assert!(!set.contains(ElementKind::Field));
        assert_eq!(set.count(), 2);
    }

    #[test]
    fn kind_set_iterates_in_sort_order() {
        let set = KindSet::new(&[
            ElementKind::Annotation,
            ElementKind::Module,
            ElementKind::Field,
        ]);
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![
                ElementKind::Module,
                ElementKind::Field,
                ElementKind::Annotation
            ]
        );
    }

    #[test]
    fn kind_round_trips_through_display() {
        for kind in ElementKind::ALL {
            assert_eq!(kind.to_string().parse::<ElementKind>().unwrap(), kind);
        }
    }
}
