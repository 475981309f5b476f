//! Interface ancestor sets
//!
//! The matcher's fallback tiers and the dump selection look at every interface
//! a type declares or inherits through the interface graph. Superclasses are
//! never part of the set.

use crate::names::{MethodSig, TypeName};
use crate::provider::TypeMetadataProvider;
use rustc_hash::FxHashSet;

/// One interface of an ancestor set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ancestor {
    /// Interface name
    pub name: TypeName,
    /// Declared methods, `None` when the interface's metadata is unavailable
    pub methods: Option<Vec<MethodSig>>,
}

impl Ancestor {
    /// Whether the interface may declare `name` with `descriptor`
    ///
    /// Unknown method lists are treated as declaring everything.
    pub fn may_declare(&self, name: &str, descriptor: &str) -> bool {
        match &self.methods {
            None => true,
            Some(methods) => methods
                .iter()
                .any(|m| m.name == name && m.descriptor == descriptor),
        }
    }
}

/// Declared and inherited interfaces of a type, in lookup order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AncestorSet {
    entries: Vec<Ancestor>,
}

impl AncestorSet {
    /// Collect the ancestors of a type declaring `interfaces`
    ///
    /// Declared interfaces come first in declaration order, followed by
    /// inherited super-interfaces depth-first. The root type is excluded and
    /// every interface appears once.
    pub fn collect(interfaces: &[TypeName], provider: &dyn TypeMetadataProvider) -> Self {
        let mut set = AncestorSet::default();
        let mut seen = FxHashSet::default();
        let mut pending = Vec::new();

        for name in interfaces {
            if name.is_root() || !seen.insert(name.clone()) {
                continue;
            }
            let metadata = provider.read_ancestors(name);
            pending.push(
                metadata
                    .as_ref()
                    .map(|m| m.interfaces.clone())
                    .unwrap_or_default(),
            );
            set.entries.push(Ancestor {
                name: name.clone(),
                methods: metadata.map(|m| m.methods),
            });
        }
        for supers in pending {
            set.visit(&supers, provider, &mut seen);
        }
        set
    }

    fn visit(
        &mut self,
        interfaces: &[TypeName],
        provider: &dyn TypeMetadataProvider,
        seen: &mut FxHashSet<TypeName>,
    ) {
        for name in interfaces {
            if name.is_root() || !seen.insert(name.clone()) {
                continue;
            }
            let metadata = provider.read_ancestors(name);
            let supers = metadata
                .as_ref()
                .map(|m| m.interfaces.clone())
                .unwrap_or_default();
            self.entries.push(Ancestor {
                name: name.clone(),
                methods: metadata.map(|m| m.methods),
            });
            self.visit(&supers, provider, seen);
        }
    }

    /// Build a set from explicit entries, in lookup order
    pub fn from_entries(entries: impl IntoIterator<Item = Ancestor>) -> Self {
        let mut seen = FxHashSet::default();
        Self {
            entries: entries
                .into_iter()
                .filter(|a| !a.name.is_root() && seen.insert(a.name.clone()))
                .collect(),
        }
    }

    /// Entries in lookup order
    pub fn iter(&self) -> impl Iterator<Item = &Ancestor> {
        self.entries.iter()
    }

    /// Interface names in lookup order
    pub fn names(&self) -> impl Iterator<Item = &TypeName> {
        self.entries.iter().map(|a| &a.name)
    }

    /// Number of interfaces
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
