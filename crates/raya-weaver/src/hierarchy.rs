//! Common-ancestor resolution for frame merges
//!
//! [`HierarchyResolver`] answers the frame computer's merge question from
//! provider metadata alone. Each call builds a private arena: the ancestors of
//! one input are expanded first, then the other input's expansion stops at the
//! first type already claimed by the opposite side. That first shared type is
//! the answer. It is a safe merge type, not necessarily the most specific one.

use crate::names::TypeName;
use crate::provider::TypeMetadataProvider;
use raya_classfile::CommonSuperclass;
use rustc_hash::FxHashMap;

/// Marker interfaces shared by too many types to be a useful answer
const SKIPPED_INTERFACES: [&str; 2] = ["raya.io.Serializable", "raya.lang.Cloneable"];

/// Resolves common ancestors through a [`TypeMetadataProvider`]
pub struct HierarchyResolver<'p> {
    provider: &'p dyn TypeMetadataProvider,
}

impl<'p> HierarchyResolver<'p> {
    /// Create a resolver reading metadata from `provider`
    pub fn new(provider: &'p dyn TypeMetadataProvider) -> Self {
        Self { provider }
    }

    /// A common ancestor of `a` and `b`; the root when nothing better is known
    pub fn common_ancestor(&self, a: &TypeName, b: &TypeName) -> TypeName {
        if a.is_root() || b.is_root() {
            return TypeName::root();
        }
        if a == b {
            return a.clone();
        }
        // Argument order must not change the answer.
        let (first, second) = if a < b { (b, a) } else { (a, b) };

        let mut resolution = Resolution::new(self.provider);
        resolution.claim(first, Origin::First);
        resolution.claim(second, Origin::Second);
        let result = resolution.shared.first().cloned().unwrap_or_else(TypeName::root);
        if tracing::enabled!(tracing::Level::TRACE) {
            let via = resolution.path(first, &result);
            tracing::trace!(a = %a, b = %b, result = %result, path = ?via, "common ancestor");
        }
        result
    }
}

impl CommonSuperclass for HierarchyResolver<'_> {
    fn common_superclass(&self, a: &str, b: &str) -> String {
        self.common_ancestor(&TypeName::new(a), &TypeName::new(b)).internal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    First,
    Second,
}

#[derive(Debug)]
struct TypeNode {
    identity: TypeName,
    origin: Origin,
    superclass: Option<usize>,
    interfaces: Vec<usize>,
}

/// Arena and memo table of one resolution call
struct Resolution<'p> {
    provider: &'p dyn TypeMetadataProvider,
    nodes: Vec<TypeNode>,
    index: FxHashMap<TypeName, usize>,
    shared: Vec<TypeName>,
}

impl<'p> Resolution<'p> {
    fn new(provider: &'p dyn TypeMetadataProvider) -> Self {
        Self {
            provider,
            nodes: Vec::new(),
            index: FxHashMap::default(),
            shared: Vec::new(),
        }
    }

    fn aborted(&self) -> bool {
        !self.shared.is_empty()
    }

    /// Claim `name` for `origin`, expanding its ancestors on first visit
    fn claim(&mut self, name: &TypeName, origin: Origin) -> Option<usize> {
        if self.aborted() || name.is_root() || SKIPPED_INTERFACES.contains(&name.as_str()) {
            return None;
        }
        if let Some(&idx) = self.index.get(name) {
            if self.nodes[idx].origin != origin && !self.shared.contains(name) {
                self.shared.push(name.clone());
            }
            return Some(idx);
        }

        let idx = self.nodes.len();
        self.nodes.push(TypeNode {
            identity: name.clone(),
            origin,
            superclass: None,
            interfaces: Vec::new(),
        });
        self.index.insert(name.clone(), idx);

        // Unavailable metadata makes the node a leaf.
        let Some(metadata) = self.provider.read_ancestors(name) else {
            tracing::trace!(type_name = %name, "no metadata, treating as leaf");
            return Some(idx);
        };

        if let Some(superclass) = &metadata.superclass {
            let parent = self.claim(superclass, origin);
            self.nodes[idx].superclass = parent;
        }
        for interface in &metadata.interfaces {
            if self.aborted() {
                break;
            }
            if let Some(child) = self.claim(interface, origin) {
                self.nodes[idx].interfaces.push(child);
            }
        }
        Some(idx)
    }

    /// Ancestor chain from `from` up to `target`, following recorded edges
    fn path(&self, from: &TypeName, target: &TypeName) -> Vec<&TypeName> {
        let (Some(&start), Some(&goal)) = (self.index.get(from), self.index.get(target)) else {
            return Vec::new();
        };
        let mut parent: FxHashMap<usize, usize> = FxHashMap::default();
        let mut queue = std::collections::VecDeque::from([start]);
        while let Some(idx) = queue.pop_front() {
            if idx == goal {
                let mut chain = vec![&self.nodes[idx].identity];
                let mut at = idx;
                while let Some(&up) = parent.get(&at) {
                    chain.push(&self.nodes[up].identity);
                    at = up;
                }
                chain.reverse();
                return chain;
            }
            let node = &self.nodes[idx];
            for next in node.superclass.iter().chain(&node.interfaces) {
                if *next != start && !parent.contains_key(next) {
                    parent.insert(*next, idx);
                    queue.push_back(*next);
                }
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn shapes() -> StaticProvider {
        StaticProvider::new()
            .class("app.Shape", Some("raya.lang.Object"), &["raya.io.Serializable"])
            .class("app.Circle", Some("app.Shape"), &["app.Round"])
            .class("app.Square", Some("app.Shape"), &["raya.lang.Cloneable"])
            .class("app.Wheel", Some("raya.lang.Object"), &["app.Round"])
            .class("app.Brick", Some("raya.lang.Object"), &["raya.io.Serializable"])
            .interface("app.Round", &[], &[])
    }

    fn resolve(provider: &StaticProvider, a: &str, b: &str) -> String {
        HierarchyResolver::new(provider)
            .common_ancestor(&TypeName::new(a), &TypeName::new(b))
            .to_string()
    }

    #[test]
    fn test_shared_superclass() {
        let p = shapes();
        assert_eq!(resolve(&p, "app.Circle", "app.Square"), "app.Shape");
        assert_eq!(resolve(&p, "app.Square", "app.Circle"), "app.Shape");
    }

    #[test]
    fn test_shared_interface() {
        let p = shapes();
        assert_eq!(resolve(&p, "app.Circle", "app.Wheel"), "app.Round");
        assert_eq!(resolve(&p, "app.Wheel", "app.Circle"), "app.Round");
    }

    #[test]
    fn test_ancestor_of_other() {
        let p = shapes();
        assert_eq!(resolve(&p, "app.Circle", "app.Shape"), "app.Shape");
        assert_eq!(resolve(&p, "app.Shape", "app.Circle"), "app.Shape");
    }

    #[test]
    fn test_marker_interfaces_ignored() {
        let p = shapes();
        assert_eq!(resolve(&p, "app.Shape", "app.Brick"), "raya.lang.Object");
    }

    #[test]
    fn test_root_and_identity() {
        let p = shapes();
        assert_eq!(resolve(&p, "app.Circle", "raya.lang.Object"), "raya.lang.Object");
        assert_eq!(resolve(&p, "raya.lang.Object", "app.Circle"), "raya.lang.Object");
        assert_eq!(resolve(&p, "app.Circle", "app.Circle"), "app.Circle");
    }

    #[test]
    fn test_unavailable_metadata_degrades_to_root() {
        let p = StaticProvider::new().class("app.Known", Some("app.Missing"), &[]);
        assert_eq!(resolve(&p, "app.Known", "app.Other"), "raya.lang.Object");
        assert_eq!(resolve(&p, "app.Ghost", "app.Other"), "raya.lang.Object");
    }

    #[test]
    fn test_cyclic_metadata_terminates() {
        let p = StaticProvider::new()
            .class("app.A", Some("app.B"), &[])
            .class("app.B", Some("app.A"), &[]);
        assert_eq!(resolve(&p, "app.A", "app.C"), "raya.lang.Object");
    }

    struct Counting<'a> {
        inner: &'a StaticProvider,
        reads: AtomicUsize,
    }

    impl TypeMetadataProvider for Counting<'_> {
        fn read_ancestors(&self, name: &TypeName) -> Option<crate::provider::TypeMetadata> {
            self.reads.fetch_add(1, Ordering::Relaxed);
            self.inner.read_ancestors(name)
        }
    }

    #[test]
    fn test_expansion_stops_at_first_shared() {
        let p = StaticProvider::new()
            .class("app.Left", Some("app.Mid"), &[])
            .class("app.Right", Some("app.Mid"), &[])
            .class("app.Mid", Some("app.Top"), &[])
            .class("app.Top", Some("raya.lang.Object"), &[]);
        let counting = Counting {
            inner: &p,
            reads: AtomicUsize::new(0),
        };
        let result = HierarchyResolver::new(&counting)
            .common_ancestor(&TypeName::new("app.Left"), &TypeName::new("app.Right"));
        assert_eq!(result.as_str(), "app.Mid");
        // Right, Mid, Top for the first side, Left for the second.
        assert_eq!(counting.reads.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn test_path_follows_recorded_edges() {
        let p = shapes();
        let mut resolution = Resolution::new(&p);
        resolution.claim(&TypeName::new("app.Wheel"), Origin::First);
        resolution.claim(&TypeName::new("app.Circle"), Origin::Second);
        assert_eq!(resolution.shared, vec![TypeName::new("app.Round")]);

        let path: Vec<&str> = resolution
            .path(&TypeName::new("app.Wheel"), &TypeName::new("app.Round"))
            .into_iter()
            .map(TypeName::as_str)
            .collect();
        assert_eq!(path, vec!["app.Wheel", "app.Round"]);
        assert!(resolution
            .path(&TypeName::new("app.Wheel"), &TypeName::new("app.Nowhere"))
            .is_empty());
    }

    #[test]
    fn test_common_superclass_uses_internal_names() {
        let p = shapes();
        let resolver = HierarchyResolver::new(&p);
        assert_eq!(resolver.common_superclass("app/Circle", "app/Square"), "app/Shape");
    }
}
