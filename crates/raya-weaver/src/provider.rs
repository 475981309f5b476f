//! Type metadata providers
//!
//! The resolver and the ancestor collection read supertypes through a
//! [`TypeMetadataProvider`] instead of loading types, so weaving never recurses
//! into the loader that invoked it.

use crate::names::{MethodSig, TypeName};
use raya_classfile::ClassUnit;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

/// Extension of class-unit files
pub const UNIT_EXTENSION: &str = "rcls";

/// Declared supertypes and methods of one type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeMetadata {
    /// Declared superclass, `None` for the root and for interfaces
    pub superclass: Option<TypeName>,
    /// Declared interfaces in declaration order
    pub interfaces: Vec<TypeName>,
    /// Whether the type is an interface
    pub is_interface: bool,
    /// Declared methods
    pub methods: Vec<MethodSig>,
}

impl TypeMetadata {
    /// Metadata of a decoded unit
    pub fn from_unit(unit: &ClassUnit) -> Self {
        Self {
            superclass: unit.super_name.as_deref().map(TypeName::new),
            interfaces: unit.interfaces.iter().map(TypeName::new).collect(),
            is_interface: unit.is_interface(),
            methods: unit
                .methods
                .iter()
                .map(|m| MethodSig::new(m.name.as_str(), m.descriptor.as_str()))
                .collect(),
        }
    }

    /// Whether the type declares `name` with `descriptor`
    pub fn declares(&self, name: &str, descriptor: &str) -> bool {
        self.methods
            .iter()
            .any(|m| m.name == name && m.descriptor == descriptor)
    }
}

/// Source of type metadata; `None` means unavailable
pub trait TypeMetadataProvider: Send + Sync {
    /// Read the declared supertypes of `name`
    fn read_ancestors(&self, name: &TypeName) -> Option<TypeMetadata>;
}

/// In-memory provider
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    types: FxHashMap<TypeName, TypeMetadata>,
}

impl StaticProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class (builder style)
    pub fn class(mut self, name: &str, superclass: Option<&str>, interfaces: &[&str]) -> Self {
        self.insert(
            TypeName::new(name),
            TypeMetadata {
                superclass: superclass.map(TypeName::new),
                interfaces: interfaces.iter().map(TypeName::new).collect(),
                is_interface: false,
                methods: Vec::new(),
            },
        );
        self
    }

    /// Add an interface with its super-interfaces and declared methods
    pub fn interface(mut self, name: &str, interfaces: &[&str], methods: &[(&str, &str)]) -> Self {
        self.insert(
            TypeName::new(name),
            TypeMetadata {
                superclass: None,
                interfaces: interfaces.iter().map(TypeName::new).collect(),
                is_interface: true,
                methods: methods.iter().map(|(n, d)| MethodSig::new(*n, *d)).collect(),
            },
        );
        self
    }

    /// Add or replace the metadata of `name`
    pub fn insert(&mut self, name: TypeName, metadata: TypeMetadata) {
        self.types.insert(name, metadata);
    }
}

impl TypeMetadataProvider for StaticProvider {
    fn read_ancestors(&self, name: &TypeName) -> Option<TypeMetadata> {
        self.types.get(name).cloned()
    }
}

/// Provider decoding `<root>/<internal name>.rcls` from a list of roots
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    roots: Vec<PathBuf>,
}

impl DirectoryProvider {
    /// Search `roots` in order
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    /// Roots searched by this provider
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn read_from(&self, root: &Path, name: &TypeName) -> Option<TypeMetadata> {
        let path = root.join(format!("{}.{}", name.internal(), UNIT_EXTENSION));
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "unreadable class unit");
                return None;
            }
        };
        match ClassUnit::decode(&bytes) {
            Ok(unit) => Some(TypeMetadata::from_unit(&unit)),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "undecodable class unit");
                None
            }
        }
    }
}

impl TypeMetadataProvider for DirectoryProvider {
    fn read_ancestors(&self, name: &TypeName) -> Option<TypeMetadata> {
        self.roots.iter().find_map(|root| self.read_from(root, name))
    }
}

/// Provider answering for one type locally and delegating the rest
pub struct Overlay<'p> {
    name: TypeName,
    metadata: TypeMetadata,
    inner: &'p dyn TypeMetadataProvider,
}

impl<'p> Overlay<'p> {
    /// Answer `metadata` for `name`, ask `inner` otherwise
    pub fn new(name: TypeName, metadata: TypeMetadata, inner: &'p dyn TypeMetadataProvider) -> Self {
        Self { name, metadata, inner }
    }
}

impl TypeMetadataProvider for Overlay<'_> {
    fn read_ancestors(&self, name: &TypeName) -> Option<TypeMetadata> {
        if *name == self.name {
            Some(self.metadata.clone())
        } else {
            self.inner.read_ancestors(name)
        }
    }
}
