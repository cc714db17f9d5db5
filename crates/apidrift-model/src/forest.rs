//! Representation of element forests.
//!
//! A forest is an arena of element nodes plus an ordered set of roots. The
//! tree's ownership is strictly through the parent link; cross-references
//! between elements live in separate adjacency maps and never own their
//! endpoints, so the reference graph is free to be cyclic.

use fixedbitset::FixedBitSet;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::ArchiveInfo;
use crate::ArchiveRole;
use crate::ElementKind;
use crate::Reference;
use crate::ReferenceKind;

/// The identifier of an element within a forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(u32);

impl ElementId {
    /// Gets the arena index of the element.
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{id}", id = self.0)
    }
}

/// The identifier of an archive recorded within a forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchiveId(u32);

impl ArchiveId {
    /// Gets the index of the archive.
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A node stored in the forest arena.
#[derive(Debug)]
struct ElementNode {
    /// The kind of the element.
    kind: ElementKind,
    /// The comparable signature of the element.
    ///
    /// The (kind, signature) pair is the equality key used to locate the
    /// element among its siblings and to pair it with its counterpart in
    /// another forest.
    signature: String,
    /// The stable human-readable representation of the element.
    display: String,
    /// The archive the element came from, if any.
    archive: Option<ArchiveId>,
    /// The parent of the element.
    parent: Option<ElementId>,
    /// The children of the element, sorted by kind then signature.
    children: Vec<ElementId>,
    /// Whether the element is part of the API surface proper.
    in_api: bool,
    /// Whether the element was pulled into the API through a use-site.
    in_api_through_use: bool,
}

/// An ordered set of root elements representing one API.
#[derive(Debug, Default)]
pub struct Forest {
    /// The extension id of the archive analyzer that produced the forest.
    analyzer: Option<String>,
    /// The archives recorded as element provenance.
    archives: Vec<ArchiveInfo>,
    /// The element arena; pruned elements leave empty slots behind.
    slots: Vec<Option<ElementNode>>,
    /// The number of live elements in the arena.
    live: usize,
    /// The roots of the forest, sorted by kind then signature.
    roots: Vec<ElementId>,
    /// Outgoing references keyed by source element.
    refs: IndexMap<ElementId, SmallVec<[Reference; 4]>>,
    /// Incoming references (the referencing sets) keyed by target element.
    back_refs: IndexMap<ElementId, SmallVec<[Reference; 4]>>,
}

impl Forest {
    /// Creates a new, empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the extension id of the archive analyzer that produced the
    /// forest.
    pub fn set_analyzer(&mut self, id: impl Into<String>) {
        self.analyzer = Some(id.into());
    }

    /// Gets the extension id of the archive analyzer that produced the
    /// forest.
    pub fn analyzer(&self) -> Option<&str> {
        self.analyzer.as_deref()
    }

    /// Records an archive in the forest and returns its identifier.
    pub fn add_archive(&mut self, name: impl Into<String>, role: ArchiveRole) -> ArchiveId {
        let id = ArchiveId(u32::try_from(self.archives.len()).expect("too many archives"));
        self.archives.push(ArchiveInfo::new(name, role));
        id
    }

    /// Gets the provenance information of a recorded archive.
    pub fn archive_info(&self, id: ArchiveId) -> &ArchiveInfo {
        &self.archives[id.index()]
    }

    /// Adds a root element to the forest.
    ///
    /// The root is inserted in sorted position regardless of insertion order.
    pub fn add_root(
        &mut self,
        kind: ElementKind,
        signature: impl Into<String>,
        display: impl Into<String>,
        archive: Option<ArchiveId>,
    ) -> ElementId {
        let signature = signature.into();
        let id = self.alloc(kind, signature.clone(), display.into(), archive, None);
        let pos = self.sorted_position(&self.roots, kind, &signature);
        self.roots.insert(pos, id);
        id
    }

    /// Adds a child element to the given parent.
    ///
    /// The child is inserted in sorted position among its siblings and a
    /// [`ReferenceKind::Contains`] reference from the parent is recorded.
    ///
    /// # Panics
    ///
    /// Panics if the parent element is not live.
    pub fn add_child(
        &mut self,
        parent: ElementId,
        kind: ElementKind,
        signature: impl Into<String>,
        display: impl Into<String>,
        archive: Option<ArchiveId>,
    ) -> ElementId {
        let signature = signature.into();
        let id = self.alloc(kind, signature.clone(), display.into(), archive, Some(parent));
        let pos = {
            let children = &self.node(parent).children;
            self.sorted_position(children, kind, &signature)
        };
        self.node_mut(parent).children.insert(pos, id);
        self.add_reference(parent, ReferenceKind::Contains, id);
        id
    }

    /// Records a typed reference between two elements.
    ///
    /// The symmetric entry in the target's referencing set is maintained
    /// automatically; duplicate edges are ignored.
    pub fn add_reference(&mut self, source: ElementId, kind: ReferenceKind, target: ElementId) {
        let forward = Reference {
            kind,
            element: target,
        };
        let list = self.refs.entry(source).or_default();
        if !list.contains(&forward) {
            list.push(forward);
        }

        let backward = Reference {
            kind,
            element: source,
        };
        let list = self.back_refs.entry(target).or_default();
        if !list.contains(&backward) {
            list.push(backward);
        }
    }

    /// Gets an element accessor by identifier.
    ///
    /// # Panics
    ///
    /// Panics if the element has been pruned from the forest.
    pub fn element(&self, id: ElementId) -> Element<'_> {
        assert!(
            self.slots[id.index()].is_some(),
            "element {id} should be live"
        );
        Element { forest: self, id }
    }

    /// Gets an element accessor by identifier, if the element is live.
    pub fn get(&self, id: ElementId) -> Option<Element<'_>> {
        self.slots.get(id.index()).and_then(|s| s.as_ref())?;
        Some(Element { forest: self, id })
    }

    /// Gets the identifiers of the forest roots, in sorted order.
    pub fn root_ids(&self) -> &[ElementId] {
        &self.roots
    }

    /// Iterates the roots of the forest, in sorted order.
    pub fn roots(&self) -> impl Iterator<Item = Element<'_>> {
        self.roots.iter().map(|id| self.element(*id))
    }

    /// Iterates every live element of the forest in depth-first order.
    pub fn iter(&self) -> Descendants<'_> {
        Descendants {
            forest: self,
            stack: self.roots.iter().rev().copied().collect(),
            kind: None,
            recursive: true,
        }
    }

    /// Gets the number of live elements in the forest.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Determines if the forest has no live elements.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Finds a child of the given parent by kind and signature.
    ///
    /// A parent of `None` searches the forest roots.
    pub fn find_child(
        &self,
        parent: Option<ElementId>,
        kind: ElementKind,
        signature: &str,
    ) -> Option<ElementId> {
        let siblings = match parent {
            Some(parent) => &self.node(parent).children,
            None => &self.roots,
        };

        siblings
            .iter()
            .find(|id| {
                let node = self.node(**id);
                node.kind == kind && node.signature == signature
            })
            .copied()
    }

    /// Removes supplementary elements that are not reachable from primary
    /// elements through use-sites that move to the API.
    ///
    /// Retained supplementary elements are marked as in the API through use.
    /// A supplementary element retained by inheritance from a primary owner
    /// takes on the owner's archive. Ancestors of retained elements are kept
    /// so the tree stays connected. Pruning an already pruned forest is a
    /// no-op.
    pub fn prune(&mut self) {
        let cap = self.slots.len();
        let mut reachable = FixedBitSet::with_capacity(cap);
        let mut queue = Vec::new();

        for (index, slot) in self.slots.iter().enumerate() {
            if slot.as_ref().is_some_and(|node| node.in_api) {
                reachable.insert(index);
                queue.push(ElementId(index as u32));
            }
        }

        while let Some(source) = queue.pop() {
            let outgoing: SmallVec<[Reference; 4]> =
                self.refs.get(&source).cloned().unwrap_or_default();
            for reference in outgoing {
                if !reference.kind.moves_to_api() {
                    continue;
                }

                let target = reference.element;
                if !reachable.contains(target.index()) {
                    reachable.insert(target.index());
                    if self.is_supplementary(target) {
                        self.node_mut(target).in_api_through_use = true;
                    }
                    queue.push(target);
                }

                // Inherited supplementary members take on the owner's archive
                if reference.kind == ReferenceKind::IsInherited
                    && self.node(source).in_api
                    && self.is_supplementary(target)
                {
                    let owner = self.node(source).archive;
                    self.node_mut(target).archive = owner;
                }
            }
        }

        // Keep ancestors of every reachable element so parent links stay
        // valid
        let mut keep = reachable.clone();
        for index in reachable.ones() {
            let mut current = self.slots[index].as_ref().and_then(|node| node.parent);
            while let Some(parent) = current {
                if keep.contains(parent.index()) {
                    break;
                }
                keep.insert(parent.index());
                current = self.node(parent).parent;
            }
        }

        let removed: Vec<usize> = (0..cap)
            .filter(|index| self.slots[*index].is_some() && !keep.contains(*index))
            .collect();
        if removed.is_empty() {
            return;
        }

        for index in removed {
            self.slots[index] = None;
            self.live -= 1;
        }

        self.roots.retain(|root| keep.contains(root.index()));
        for slot in self.slots.iter_mut().flatten() {
            slot.children.retain(|child| keep.contains(child.index()));
        }

        self.refs.retain(|source, list| {
            if !keep.contains(source.index()) {
                return false;
            }
            list.retain(|reference| keep.contains(reference.element.index()));
            !list.is_empty()
        });
        self.back_refs.retain(|target, list| {
            if !keep.contains(target.index()) {
                return false;
            }
            list.retain(|reference| keep.contains(reference.element.index()));
            !list.is_empty()
        });
    }

    /// Allocates a new node in the arena.
    fn alloc(
        &mut self,
        kind: ElementKind,
        signature: String,
        display: String,
        archive: Option<ArchiveId>,
        parent: Option<ElementId>,
    ) -> ElementId {
        let in_api = archive
            .map(|a| self.archives[a.index()].role() == ArchiveRole::Primary)
            .unwrap_or(true);
        let id = ElementId(u32::try_from(self.slots.len()).expect("too many elements"));
        self.slots.push(Some(ElementNode {
            kind,
            signature,
            display,
            archive,
            parent,
            children: Vec::new(),
            in_api,
            in_api_through_use: false,
        }));
        self.live += 1;
        id
    }

    /// Finds the sorted insertion position for a new sibling.
    fn sorted_position(
        &self,
        siblings: &[ElementId],
        kind: ElementKind,
        signature: &str,
    ) -> usize {
        siblings.partition_point(|sibling| {
            let node = self.node(*sibling);
            (node.kind, node.signature.as_str()) <= (kind, signature)
        })
    }

    /// Determines if the element came from a supplementary archive.
    fn is_supplementary(&self, id: ElementId) -> bool {
        self.node(id)
            .archive
            .is_some_and(|a| self.archives[a.index()].role() == ArchiveRole::Supplementary)
    }

    /// Gets a live node by identifier.
    fn node(&self, id: ElementId) -> &ElementNode {
        self.slots[id.index()]
            .as_ref()
            .expect("element should be live")
    }

    /// Gets a live node mutably by identifier.
    fn node_mut(&mut self, id: ElementId) -> &mut ElementNode {
        self.slots[id.index()]
            .as_mut()
            .expect("element should be live")
    }
}

/// An accessor for an element of a forest.
///
/// Accessors are cheap to copy and borrow the forest they came from.
/// Comparison and equality are by kind then signature, which makes two
/// accessors comparable across forests; use [`Element::same_identity`] to
/// check identity up to the root.
#[derive(Clone, Copy)]
pub struct Element<'a> {
    /// The forest the element belongs to.
    forest: &'a Forest,
    /// The identifier of the element.
    id: ElementId,
}

impl<'a> Element<'a> {
    /// Gets the identifier of the element.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Gets the forest the element belongs to.
    pub fn forest(&self) -> &'a Forest {
        self.forest
    }

    /// Gets the kind of the element.
    pub fn kind(&self) -> ElementKind {
        self.node().kind
    }

    /// Gets the comparable signature of the element.
    pub fn signature(&self) -> &'a str {
        &self.node().signature
    }

    /// Gets the stable human-readable representation of the element.
    pub fn display_name(&self) -> &'a str {
        &self.node().display
    }

    /// Gets the archive the element came from, if any.
    pub fn archive(&self) -> Option<&'a ArchiveInfo> {
        self.node()
            .archive
            .map(|a| &self.forest.archives[a.index()])
    }

    /// Gets the parent of the element.
    pub fn parent(&self) -> Option<Element<'a>> {
        self.node().parent.map(|id| self.forest.element(id))
    }

    /// Iterates the children of the element, in sorted order.
    pub fn children(&self) -> impl Iterator<Item = Element<'a>> + 'a {
        let forest = self.forest;
        self.node().children.iter().map(move |id| forest.element(*id))
    }

    /// Gets the identifiers of the element's children, in sorted order.
    pub fn child_ids(&self) -> &'a [ElementId] {
        &self.node().children
    }

    /// Lazily enumerates descendants of the element in depth-first order.
    ///
    /// When `kind` is given, only elements of that kind are yielded. When
    /// `recursive` is `false`, only direct children are considered.
    pub fn stream(&self, kind: Option<ElementKind>, recursive: bool) -> Descendants<'a> {
        Descendants {
            forest: self.forest,
            stack: self.node().children.iter().rev().copied().collect(),
            kind,
            recursive,
        }
    }

    /// Gets the outgoing references of the element.
    pub fn references(&self) -> &'a [Reference] {
        self.forest
            .refs
            .get(&self.id)
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    /// Gets the referencing set of the element (incoming references).
    pub fn referenced_by(&self) -> &'a [Reference] {
        self.forest
            .back_refs
            .get(&self.id)
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    /// Determines if the element is part of the API surface proper.
    pub fn is_in_api(&self) -> bool {
        self.node().in_api
    }

    /// Determines if the element was pulled into the API through a use-site.
    pub fn is_in_api_through_use(&self) -> bool {
        self.node().in_api_through_use
    }

    /// Determines if this element and another denote the same element, i.e.
    /// they agree on kind and signature at every level up to the root.
    ///
    /// The two elements may come from different forests.
    pub fn same_identity(&self, other: &Element<'_>) -> bool {
        if self.kind() != other.kind() || self.signature() != other.signature() {
            return false;
        }

        match (self.parent(), other.parent()) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same_identity(&b),
            _ => false,
        }
    }

    /// Gets the node backing the element.
    fn node(&self) -> &'a ElementNode {
        self.forest.node(self.id)
    }
}

impl PartialEq for Element<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Element<'_> {}

impl PartialOrd for Element<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Element<'_> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.kind()
            .cmp(&other.kind())
            .then_with(|| self.signature().cmp(other.signature()))
    }
}

impl std::fmt::Debug for Element<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("signature", &self.signature())
            .finish()
    }
}

impl std::fmt::Display for Element<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{name}", name = self.display_name())
    }
}

/// A lazy depth-first enumeration of elements.
#[derive(Debug)]
pub struct Descendants<'a> {
    /// The forest being enumerated.
    forest: &'a Forest,
    /// The pending elements, topmost next.
    stack: Vec<ElementId>,
    /// An optional kind restriction.
    kind: Option<ElementKind>,
    /// Whether to descend past direct children.
    recursive: bool,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = Element<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            let element = self.forest.element(id);
            if self.recursive {
                self.stack.extend(element.child_ids().iter().rev());
            }

            if self.kind.is_none_or(|k| k == element.kind()) {
                return Some(element);
            }
        }

        None
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    /// Builds a forest with a type containing two methods and an annotation.
    fn sample_forest() -> (Forest, ElementId) {
        let mut forest = Forest::new();
        let archive = forest.add_archive("app-1.0", ArchiveRole::Primary);
        let ty = forest.add_root(ElementKind::Type, "Calc", "class Calc", Some(archive));
        // Deliberately inserted out of order
        forest.add_child(ty, ElementKind::Annotation, "Deprecated", "@Deprecated", Some(archive));
        forest.add_child(ty, ElementKind::Method, "sub(int)", "Calc::sub(int)", Some(archive));
        forest.add_child(ty, ElementKind::Method, "add(int)", "Calc::add(int)", Some(archive));
        (forest, ty)
    }

    #[test]
    fn children_sort_by_kind_then_signature() {
        let (forest, ty) = sample_forest();
        let signatures: Vec<_> = forest
            .element(ty)
            .children()
            .map(|c| c.signature().to_string())
            .collect();
        assert_eq!(signatures, vec!["add(int)", "sub(int)", "Deprecated"]);
    }

    #[test]
    fn annotations_sort_after_other_siblings() {
        let (forest, ty) = sample_forest();
        let last = forest.element(ty).children().last().unwrap();
        assert_eq!(last.kind(), ElementKind::Annotation);
    }

    #[test]
    fn roots_sort_regardless_of_insertion_order() {
        let mut forest = Forest::new();
        forest.add_root(ElementKind::Type, "C", "C", None);
        forest.add_root(ElementKind::Type, "A", "A", None);
        forest.add_root(ElementKind::Type, "B", "B", None);
        let signatures: Vec<_> = forest.roots().map(|r| r.signature().to_string()).collect();
        assert_eq!(signatures, vec!["A", "B", "C"]);
    }

    #[test]
    fn references_are_symmetric() {
        let (forest, ty) = sample_forest();
        for element in forest.iter() {
            for reference in element.references() {
                let target = forest.element(reference.element);
                assert!(
                    target.referenced_by().contains(&Reference {
                        kind: reference.kind,
                        element: element.id(),
                    }),
                    "missing inverse edge for {kind} from {source} to {target}",
                    kind = reference.kind,
                    source = element.id(),
                    target = target.id(),
                );
            }
        }

        // Containment edges are recorded automatically
        let contains: Vec<_> = forest
            .element(ty)
            .references()
            .iter()
            .filter(|r| r.kind == ReferenceKind::Contains)
            .collect();
        assert_eq!(contains.len(), 3);
    }

    #[test]
    fn find_child_by_kind_and_signature() {
        let (forest, ty) = sample_forest();
        let found = forest
            .find_child(Some(ty), ElementKind::Method, "add(int)")
            .unwrap();
        assert_eq!(forest.element(found).display_name(), "Calc::add(int)");
        assert_eq!(
            forest.find_child(Some(ty), ElementKind::Method, "mul(int)"),
            None
        );
    }

    #[test]
    fn stream_filters_by_kind() {
        let (forest, ty) = sample_forest();
        let methods: Vec<_> = forest
            .element(ty)
            .stream(Some(ElementKind::Method), true)
            .map(|e| e.signature().to_string())
            .collect();
        assert_eq!(methods, vec!["add(int)", "sub(int)"]);
    }

    #[test]
    fn prune_removes_unused_supplementary_elements() {
        let mut forest = Forest::new();
        let app = forest.add_archive("app", ArchiveRole::Primary);
        let dep = forest.add_archive("dep", ArchiveRole::Supplementary);

        let calc = forest.add_root(ElementKind::Type, "Calc", "Calc", Some(app));
        let used = forest.add_root(ElementKind::Type, "Num", "Num", Some(dep));
        let unused = forest.add_root(ElementKind::Type, "Unused", "Unused", Some(dep));
        forest.add_reference(calc, ReferenceKind::HasType, used);
        forest.add_reference(unused, ReferenceKind::HasType, used);

        forest.prune();

        assert!(forest.get(calc).is_some());
        assert!(forest.get(used).is_some());
        assert!(forest.get(unused).is_none());
        assert_eq!(forest.len(), 2);
        assert!(forest.element(used).is_in_api_through_use());
        assert!(!forest.element(used).is_in_api());

        // The dangling inverse edge from the removed element is gone
        assert_eq!(forest.element(used).referenced_by().len(), 1);
    }

    #[test]
    fn prune_keeps_ancestors_of_used_elements() {
        let mut forest = Forest::new();
        let app = forest.add_archive("app", ArchiveRole::Primary);
        let dep = forest.add_archive("dep", ArchiveRole::Supplementary);

        let calc = forest.add_root(ElementKind::Type, "Calc", "Calc", Some(app));
        let container = forest.add_root(ElementKind::Type, "Outer", "Outer", Some(dep));
        let inner = forest.add_child(container, ElementKind::Type, "Inner", "Outer.Inner", Some(dep));
        forest.add_reference(calc, ReferenceKind::ReturnType, inner);

        forest.prune();

        assert!(forest.get(inner).is_some());
        assert!(forest.get(container).is_some());
        assert!(forest.element(inner).is_in_api_through_use());
    }

    #[test]
    fn prune_is_idempotent() {
        let mut forest = Forest::new();
        let app = forest.add_archive("app", ArchiveRole::Primary);
        let dep = forest.add_archive("dep", ArchiveRole::Supplementary);
        let calc = forest.add_root(ElementKind::Type, "Calc", "Calc", Some(app));
        let used = forest.add_root(ElementKind::Type, "Num", "Num", Some(dep));
        forest.add_root(ElementKind::Type, "Unused", "Unused", Some(dep));
        forest.add_reference(calc, ReferenceKind::HasType, used);

        forest.prune();
        let after_first: Vec<_> = forest.iter().map(|e| e.id()).collect();
        forest.prune();
        let after_second: Vec<_> = forest.iter().map(|e| e.id()).collect();
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn inherited_elements_take_on_the_owner_archive() {
        let mut forest = Forest::new();
        let app = forest.add_archive("app", ArchiveRole::Primary);
        let dep = forest.add_archive("dep", ArchiveRole::Supplementary);

        let derived = forest.add_root(ElementKind::Type, "Derived", "Derived", Some(app));
        let base_method =
            forest.add_root(ElementKind::Method, "base()", "Base::base()", Some(dep));
        forest.add_reference(derived, ReferenceKind::IsInherited, base_method);

        forest.prune();

        let inherited = forest.element(base_method);
        assert_eq!(inherited.archive().unwrap().name(), "app");
        assert!(inherited.is_in_api_through_use());
    }

    #[test]
    fn same_identity_requires_matching_ancestry() {
        let (old, old_ty) = sample_forest();
        let (new, new_ty) = sample_forest();

        let old_add = old
            .find_child(Some(old_ty), ElementKind::Method, "add(int)")
            .unwrap();
        let new_add = new
            .find_child(Some(new_ty), ElementKind::Method, "add(int)")
            .unwrap();
        let new_sub = new
            .find_child(Some(new_ty), ElementKind::Method, "sub(int)")
            .unwrap();

        assert!(old.element(old_add).same_identity(&new.element(new_add)));
        assert!(!old.element(old_add).same_identity(&new.element(new_sub)));
    }
}
