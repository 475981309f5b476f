//! Weaving configuration
//!
//! A [`MetricsConfig`] is built once from TOML and is immutable afterwards;
//! the coordinator shares it by `Arc` across weaving threads.
//!
//! ```toml
//! [global]
//! exceptional_exits = true
//!
//! [global.dump]
//! output = "shapes.toml"
//! include = ["org\\.example\\..*"]
//!
//! [packages."org.example.web"]
//! service = "timer"
//!
//! ["org.example.Store"]
//! keyMethod = "getStatus"
//! load = "meter"
//!
//! ["org.example.Store".find]
//! "(I)Lorg/example/Item;" = "timer"
//! type = "count_return"
//! ```

mod load;
mod tree;

pub use tree::ConfigNode;

use regex::Regex;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Nested key naming a return rule kind
pub const TYPE_KEY: &str = "type";
/// Accessor modifier of return rules
pub const KEY_METHOD_KEY: &str = "keyMethod";
/// Helper modifier of return rules
pub const HELPER_CLASS_KEY: &str = "helperClass";
/// Type flag: write the woven unit to `class_dump_dir`
pub const DUMP_CLASS_KEY: &str = "_dumpClass";
/// Type flag: log every method checked
pub const MONITOR_CLASS_KEY: &str = "_monitor_class";

/// Errors that can occur while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the file failed
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A dump pattern is not a valid regular expression
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// Pattern as written
        pattern: String,
        /// Compilation error
        #[source]
        source: regex::Error,
    },

    /// A section has the wrong shape
    #[error("invalid [{section}] section: {message}")]
    Shape {
        /// Section name
        section: String,
        /// What is wrong
        message: String,
    },
}

/// `[global.dump]` settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DumpSettings {
    /// Call-shape dump file; dumping is off without it
    pub output: Option<PathBuf>,
    /// Patterns selecting types to dump; empty selects all
    pub include: Vec<String>,
    /// Patterns deselecting types; wins over `include`
    pub exclude: Vec<String>,
}

/// `[global]` settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Log every candidate type
    pub monitor: bool,
    /// Raise log verbosity
    pub debug: bool,
    /// Run exit actions of timers and guarded counts on exceptional exits
    pub exceptional_exits: bool,
    /// Verify every woven method
    pub verify: bool,
    /// Target directory for `_dumpClass`
    pub class_dump_dir: Option<PathBuf>,
    /// Call-shape dump
    pub dump: DumpSettings,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            monitor: false,
            debug: false,
            exceptional_exits: true,
            verify: true,
            class_dump_dir: None,
            dump: DumpSettings::default(),
        }
    }
}

/// Compiled dump selection patterns
#[derive(Debug, Clone, Default)]
pub(crate) struct DumpPatterns {
    pub(crate) include: Vec<Regex>,
    pub(crate) exclude: Vec<Regex>,
}

/// Immutable configuration snapshot
#[derive(Debug, Clone, Default)]
pub struct MetricsConfig {
    global: GlobalConfig,
    patterns: DumpPatterns,
    packages: Vec<(String, ConfigNode)>,
    types: FxHashMap<String, ConfigNode>,
}

impl MetricsConfig {
    /// Configuration that weaves nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Global settings
    pub fn global(&self) -> &GlobalConfig {
        &self.global
    }

    /// Entry keyed by the type name itself
    pub fn type_entry(&self, name: &str) -> Option<&ConfigNode> {
        self.types.get(name)
    }

    /// First package bucket whose prefix matches `name`, in declaration order
    pub fn package_entry(&self, name: &str) -> Option<(&str, &ConfigNode)> {
        self.packages
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix.as_str()))
            .map(|(prefix, node)| (prefix.as_str(), node))
    }

    /// Exact entry, then the matching package bucket
    ///
    /// A lookup that finds nothing in the exact entry continues in the bucket.
    pub fn entries(&self, name: &str) -> impl Iterator<Item = &ConfigNode> {
        self.type_entry(name)
            .into_iter()
            .chain(self.package_entry(name).map(|(_, node)| node))
    }

    /// Whether `flag` is set on the type's entry or its package bucket
    pub fn type_flag(&self, name: &str, flag: &str) -> bool {
        self.entries(name)
            .find_map(|entry| entry.get(flag))
            .map_or(false, ConfigNode::is_true)
    }

    /// Whether call shapes are recorded at all
    pub fn dump_enabled(&self) -> bool {
        self.global.dump.output.is_some()
    }

    /// Names of all configured types
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub(crate) fn patterns(&self) -> &DumpPatterns {
        &self.patterns
    }
}
