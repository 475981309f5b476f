//! Type, method and metric names

use raya_classfile::ROOT_TYPE;
use std::fmt;

/// Fully-qualified type name in dotted canonical form (`org.example.Foo`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName(String);

impl TypeName {
    /// Create a name from either dotted or internal (`org/example/Foo`) form
    pub fn new(name: impl AsRef<str>) -> Self {
        TypeName(name.as_ref().replace('/', "."))
    }

    /// The universal root type
    pub fn root() -> Self {
        TypeName::new(ROOT_TYPE)
    }

    /// Whether this is the universal root type
    pub fn is_root(&self) -> bool {
        self.0 == "raya.lang.Object"
    }

    /// Dotted form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Internal form used inside class units
    pub fn internal(&self) -> String {
        self.0.replace('.', "/")
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeName {
    fn from(name: &str) -> Self {
        TypeName::new(name)
    }
}

/// Method name and descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodSig {
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
}

impl MethodSig {
    /// Create a signature
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

/// Name under which a probe reports
///
/// `owner.method`, followed directly by the descriptor when the rule that
/// produced it was descriptor-specific.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricName(String);

impl MetricName {
    /// Name for `method` of `owner`
    pub fn new(owner: &TypeName, method: &str, descriptor: Option<&str>) -> Self {
        match descriptor {
            Some(desc) => MetricName(format!("{}.{}{}", owner, method, desc)),
            None => MetricName(format!("{}.{}", owner, method)),
        }
    }

    /// The name as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_name_forms() {
        let name = TypeName::new("org/example/Foo");
        assert_eq!(name.as_str(), "org.example.Foo");
        assert_eq!(name.internal(), "org/example/Foo");
        assert_eq!(TypeName::from("org.example.Foo"), name);
        assert!(TypeName::root().is_root());
        assert!(!name.is_root());
    }

    #[test]
    fn test_metric_name() {
        let owner = TypeName::new("org.example.ExampleClass");
        assert_eq!(
            MetricName::new(&owner, "compute", None).as_str(),
            "org.example.ExampleClass.compute"
        );
        assert_eq!(
            MetricName::new(&owner, "compute", Some("(I)I")).as_str(),
            "org.example.ExampleClass.compute(I)I"
        );
    }
}
