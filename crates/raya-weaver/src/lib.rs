//! Configuration-driven metrics weaving
//!
//! A [`WeavingHook`] receives each loaded class unit, decides from a
//! [`MetricsConfig`] which methods to instrument, and rewrites their bodies to
//! call the `raya.metrics` facade. Frame recomputation for rewritten bodies
//! resolves common ancestors through a [`TypeMetadataProvider`] so the hook
//! never loads types itself.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod ancestors;
pub mod config;
pub mod dump;
pub mod hierarchy;
pub mod hook;
pub mod matcher;
pub mod names;
pub mod provider;
pub mod weaver;

pub use ancestors::{Ancestor, AncestorSet};
pub use config::{ConfigError, ConfigNode, GlobalConfig, MetricsConfig};
pub use dump::DumpSink;
pub use hierarchy::HierarchyResolver;
pub use hook::{WeaveResult, WeavingHook};
pub use matcher::{ConfigDiagnostic, InstrumentationRule, Match, MethodMatcher, RuleKind};
pub use names::{MethodSig, MetricName, TypeName};
pub use provider::{DirectoryProvider, Overlay, StaticProvider, TypeMetadata, TypeMetadataProvider, UNIT_EXTENSION};
pub use weaver::{weave_method, MethodOutcome, SkipReason, WeaveError, WeaveOptions};
