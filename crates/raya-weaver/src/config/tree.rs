//! Configuration tree

use std::fmt;

/// A node of the configuration tree
///
/// Maps keep declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNode {
    /// String value
    Str(String),
    /// Boolean flag
    Bool(bool),
    /// Integer value
    Int(i64),
    /// List of values
    List(Vec<ConfigNode>),
    /// Ordered map
    Map(Vec<(String, ConfigNode)>),
}

impl ConfigNode {
    /// Child of a map node
    pub fn get(&self, key: &str) -> Option<&ConfigNode> {
        match self {
            ConfigNode::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Descendant reached by following `keys`
    pub fn path(&self, keys: &[&str]) -> Option<&ConfigNode> {
        keys.iter().try_fold(self, |node, key| node.get(key))
    }

    /// String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigNode::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Map entries
    pub fn as_map(&self) -> Option<&[(String, ConfigNode)]> {
        match self {
            ConfigNode::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Whether the node is `true` or the string `"true"`
    pub fn is_true(&self) -> bool {
        matches!(self, ConfigNode::Bool(true)) || self.as_str() == Some("true")
    }
}

impl From<toml::Value> for ConfigNode {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => ConfigNode::Str(s),
            toml::Value::Boolean(b) => ConfigNode::Bool(b),
            toml::Value::Integer(i) => ConfigNode::Int(i),
            toml::Value::Float(f) => ConfigNode::Str(f.to_string()),
            toml::Value::Datetime(d) => ConfigNode::Str(d.to_string()),
            toml::Value::Array(items) => ConfigNode::List(items.into_iter().map(ConfigNode::from).collect()),
            toml::Value::Table(table) => {
                ConfigNode::Map(table.into_iter().map(|(k, v)| (k, ConfigNode::from(v))).collect())
            }
        }
    }
}

impl fmt::Display for ConfigNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigNode::Str(s) => f.write_str(s),
            ConfigNode::Bool(b) => write!(f, "{}", b),
            ConfigNode::Int(i) => write!(f, "{}", i),
            ConfigNode::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            ConfigNode::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} = {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}
