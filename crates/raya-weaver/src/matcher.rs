//! Method matching
//!
//! Decides per method whether and how it is instrumented. Candidate owners are
//! tried in tiers: the type itself (exact entry, then package bucket), then
//! each ancestor interface that may declare the method. The first tier holding
//! a recognised rule wins. Inside a tier the descriptor-specific and name-only
//! entries are both read and the higher-priority kind is taken.

use crate::ancestors::AncestorSet;
use crate::config::{ConfigNode, MetricsConfig, HELPER_CLASS_KEY, KEY_METHOD_KEY, MONITOR_CLASS_KEY, TYPE_KEY};
use crate::names::{MethodSig, MetricName, TypeName};
use raya_metrics::ReturnKey;
use std::fmt;

/// Probe strategy, declared in dispatch priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleKind {
    /// Time the call
    Timer,
    /// Count calls
    Counter,
    /// Count outermost calls per thread
    ApiCounter,
    /// Mark a meter per call
    Meter,
    /// Count by returned value
    ReturnCount,
    /// Mark a meter by returned value
    ReturnMeter,
}

impl RuleKind {
    /// Every kind in priority order
    pub const ALL: [RuleKind; 6] = [
        RuleKind::Timer,
        RuleKind::Counter,
        RuleKind::ApiCounter,
        RuleKind::Meter,
        RuleKind::ReturnCount,
        RuleKind::ReturnMeter,
    ];

    /// Configuration literal
    pub fn literal(self) -> &'static str {
        match self {
            RuleKind::Timer => "timer",
            RuleKind::Counter => "counter",
            RuleKind::ApiCounter => "apicounter",
            RuleKind::Meter => "meter",
            RuleKind::ReturnCount => "count_return",
            RuleKind::ReturnMeter => "meter_return",
        }
    }

    /// Kind written directly as a method or descriptor value
    pub fn from_direct(literal: &str) -> Option<Self> {
        match literal {
            "timer" => Some(RuleKind::Timer),
            "counter" => Some(RuleKind::Counter),
            "apicounter" => Some(RuleKind::ApiCounter),
            "meter" => Some(RuleKind::Meter),
            _ => None,
        }
    }

    /// Kind written under a nested `type` key
    pub fn from_nested(literal: &str) -> Option<Self> {
        match literal {
            "count_return" => Some(RuleKind::ReturnCount),
            "meter_return" => Some(RuleKind::ReturnMeter),
            _ => None,
        }
    }

    /// Whether the probe consumes the return value
    pub fn captures_return(self) -> bool {
        matches!(self, RuleKind::ReturnCount | RuleKind::ReturnMeter)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.literal())
    }
}

/// Resolved rule for one method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentationRule {
    /// Probe strategy
    pub kind: RuleKind,
    /// Suffix derivation for return rules
    pub key: Option<ReturnKey>,
}

/// Outcome of a successful match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Rule to apply
    pub rule: InstrumentationRule,
    /// Metric the probe reports to
    pub metric: MetricName,
}

/// Configuration problem found after a type was visited
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigDiagnostic {
    /// A rule value is not a recognised kind literal
    UnknownKind {
        /// Configured type
        type_name: String,
        /// Method key
        method: String,
        /// Offending value
        value: String,
    },
    /// A rule names a method the type does not have
    UnusedMethod {
        /// Configured type
        type_name: String,
        /// Method key
        method: String,
        /// Descriptor key, `None` for a name-level rule
        descriptor: Option<String>,
    },
}

impl fmt::Display for ConfigDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigDiagnostic::UnknownKind {
                type_name,
                method,
                value,
            } => write!(
                f,
                "config option not valid for {} {}: {:?} should be one of {}",
                type_name,
                method,
                value,
                RuleKind::ALL.map(RuleKind::literal).join(", ")
            ),
            ConfigDiagnostic::UnusedMethod {
                type_name,
                method,
                descriptor: Some(desc),
            } => write!(f, "unused config for {} {}{}", type_name, method, desc),
            ConfigDiagnostic::UnusedMethod {
                type_name, method, ..
            } => write!(f, "unused config for {} {}", type_name, method),
        }
    }
}

/// Rule lookups against a configuration snapshot
#[derive(Clone, Copy)]
pub struct MethodMatcher<'c> {
    config: &'c MetricsConfig,
}

impl<'c> MethodMatcher<'c> {
    /// Match against `config`
    pub fn new(config: &'c MetricsConfig) -> Self {
        Self { config }
    }

    /// Rule and metric name for `name` + `descriptor` of `ty`, if any
    pub fn should_instrument(
        &self,
        ty: &TypeName,
        ancestors: &AncestorSet,
        name: &str,
        descriptor: &str,
    ) -> Option<Match> {
        if self.config.type_flag(ty.as_str(), MONITOR_CLASS_KEY) {
            tracing::info!(type_name = %ty, method = name, descriptor, "checking method");
        }

        let candidates = std::iter::once(ty).chain(
            ancestors
                .iter()
                .filter(|a| a.may_declare(name, descriptor))
                .map(|a| &a.name),
        );
        let (owner, (kind, specific)) = candidates
            .flat_map(move |owner| {
                self.config
                    .entries(owner.as_str())
                    .filter_map(move |entry| tier_kind(entry, name, descriptor).map(|found| (owner, found)))
            })
            .next()?;
        let key = if kind.captures_return() {
            self.return_key(ty, ancestors, name, descriptor)
        } else {
            None
        };
        let metric = MetricName::new(owner, name, specific.then_some(descriptor));
        tracing::debug!(type_name = %ty, method = name, descriptor, kind = %kind, metric = %metric, "rule matched");
        Some(Match {
            rule: InstrumentationRule { kind, key },
            metric,
        })
    }

    /// Suffix derivation for a return rule
    ///
    /// `helperClass` wins over `keyMethod`. Each is read at the descriptor
    /// entry, then the name entry, then the class-level default, over the type
    /// followed by its ancestors.
    pub fn return_key(&self, ty: &TypeName, ancestors: &AncestorSet, name: &str, descriptor: &str) -> Option<ReturnKey> {
        let lookup = |field: &str| -> Option<String> {
            let levels: [&[&str]; 3] = [&[name, descriptor, field], &[name, field], &[field]];
            levels.iter().find_map(|path| {
                std::iter::once(ty)
                    .chain(ancestors.names())
                    .flat_map(|owner| self.config.entries(owner.as_str()))
                    .find_map(|entry| entry.path(path).and_then(ConfigNode::as_str))
                    .map(str::to_string)
            })
        };
        lookup(HELPER_CLASS_KEY)
            .map(ReturnKey::Helper)
            .or_else(|| lookup(KEY_METHOD_KEY).map(ReturnKey::Accessor))
    }

    /// Whether any method of `ty` can be woven
    pub fn should_weave_type(&self, ty: &TypeName, ancestors: &AncestorSet) -> bool {
        if self.config.global().monitor {
            tracing::info!(type_name = %ty, "loading type");
        }
        if self.include_in_dump(ty, ancestors) {
            tracing::info!(type_name = %ty, "dumping type");
            return true;
        }
        std::iter::once(ty)
            .chain(ancestors.names())
            .any(|owner| self.config.entries(owner.as_str()).next().is_some())
    }

    /// Whether `ty` is selected for call-shape recording
    pub fn include_in_dump(&self, ty: &TypeName, ancestors: &AncestorSet) -> bool {
        if !self.config.dump_enabled() {
            return false;
        }
        let patterns = self.config.patterns();
        let matches_any = |set: &[regex::Regex]| {
            std::iter::once(ty)
                .chain(ancestors.names())
                .any(|n| set.iter().any(|p| p.is_match(n.as_str())))
        };
        let included = patterns.include.is_empty() || matches_any(&patterns.include);
        included && !matches_any(&patterns.exclude)
    }

    /// Compare the type's own entry against the methods it declares
    pub fn check_unused(&self, ty: &TypeName, observed: &[MethodSig]) -> Vec<ConfigDiagnostic> {
        let Some(entries) = self.config.type_entry(ty.as_str()).and_then(ConfigNode::as_map) else {
            return Vec::new();
        };
        let type_name = ty.to_string();
        let has_name = |method: &str| observed.iter().any(|m| m.name == method);
        let has_sig = |method: &str, desc: &str| observed.iter().any(|m| m.name == method && m.descriptor == desc);

        let mut diagnostics = Vec::new();
        let mut unknown = |method: &str, value: &ConfigNode| {
            diagnostics.push(ConfigDiagnostic::UnknownKind {
                type_name: type_name.clone(),
                method: method.to_string(),
                value: value.to_string(),
            })
        };
        let mut unused = Vec::new();

        for (method, value) in entries {
            if method.starts_with('_') || method == KEY_METHOD_KEY || method == HELPER_CLASS_KEY {
                continue;
            }
            match value {
                ConfigNode::Map(descs) => {
                    if !has_name(method) {
                        unused.push((method.clone(), None));
                    }
                    for (key, rule) in descs {
                        match key.as_str() {
                            TYPE_KEY => {
                                if rule.as_str().and_then(RuleKind::from_nested).is_none() {
                                    unknown(method, rule);
                                }
                            }
                            KEY_METHOD_KEY | HELPER_CLASS_KEY => {}
                            desc => {
                                if !direct_or_nested(rule) {
                                    unknown(method, rule);
                                }
                                if !desc.is_empty() && has_name(method) && !has_sig(method, desc) {
                                    unused.push((method.clone(), Some(desc.to_string())));
                                }
                            }
                        }
                    }
                }
                other => {
                    if other.as_str().and_then(RuleKind::from_direct).is_none() {
                        unknown(method, other);
                    }
                    if !has_name(method) {
                        unused.push((method.clone(), None));
                    }
                }
            }
        }

        diagnostics.extend(unused.into_iter().map(|(method, descriptor)| ConfigDiagnostic::UnusedMethod {
            type_name: type_name.clone(),
            method,
            descriptor,
        }));
        diagnostics
    }
}

/// Whether a descriptor-level value holds a recognised rule
fn direct_or_nested(rule: &ConfigNode) -> bool {
    match rule {
        ConfigNode::Str(s) => RuleKind::from_direct(s).is_some(),
        ConfigNode::Map(_) => rule
            .get(TYPE_KEY)
            .and_then(ConfigNode::as_str)
            .and_then(RuleKind::from_nested)
            .is_some(),
        _ => false,
    }
}

/// Highest-priority kind in one entry and whether it was descriptor-specific
///
/// An empty descriptor key is a name-level rule covering every overload.
fn tier_kind(entry: &ConfigNode, name: &str, descriptor: &str) -> Option<(RuleKind, bool)> {
    let method = entry.get(name)?;
    let levels = [
        (method.get(descriptor).filter(|_| !descriptor.is_empty()), true),
        (method.get(""), false),
        (Some(method), false),
    ];

    levels
        .into_iter()
        .filter_map(|(node, specific)| node.map(|n| (n, specific)))
        .flat_map(|(node, specific)| {
            let direct = node.as_str().and_then(RuleKind::from_direct);
            let nested = node
                .get(TYPE_KEY)
                .and_then(ConfigNode::as_str)
                .and_then(RuleKind::from_nested);
            [direct, nested].into_iter().flatten().map(move |kind| (kind, specific))
        })
        .min_by_key(|&(kind, specific)| (kind, !specific))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ancestors::Ancestor;

    fn config(src: &str) -> MetricsConfig {
        MetricsConfig::from_toml_str(src).unwrap()
    }

    fn interfaces(names: &[(&str, Option<&[(&str, &str)]>)]) -> AncestorSet {
        AncestorSet::from_entries(names.iter().map(|(name, methods)| Ancestor {
            name: TypeName::new(name),
            methods: methods.map(|ms| ms.iter().map(|(n, d)| MethodSig::new(*n, *d)).collect()),
        }))
    }

    fn matched(config: &MetricsConfig, ty: &str, ancestors: &AncestorSet, name: &str, desc: &str) -> Option<(RuleKind, String)> {
        MethodMatcher::new(config)
            .should_instrument(&TypeName::new(ty), ancestors, name, desc)
            .map(|m| (m.rule.kind, m.metric.to_string()))
    }

    #[test]
    fn test_exact_name_rule_matches_all_overloads() {
        let c = config("[\"app.ExampleClass\"]\ncompute = \"timer\"\n");
        let none = AncestorSet::default();
        for desc in ["()V", "(I)I", "(Lraya/lang/String;)J"] {
            assert_eq!(
                matched(&c, "app.ExampleClass", &none, "compute", desc),
                Some((RuleKind::Timer, "app.ExampleClass.compute".into()))
            );
        }
        assert_eq!(matched(&c, "app.ExampleClass", &none, "other", "()V"), None);
        assert_eq!(matched(&c, "app.Other", &none, "compute", "()V"), None);
    }

    #[test]
    fn test_descriptor_rule_names_metric_with_descriptor() {
        let c = config(
            r#"
            ["app.Store".find]
            "(I)V" = "counter"
            "#,
        );
        let none = AncestorSet::default();
        assert_eq!(
            matched(&c, "app.Store", &none, "find", "(I)V"),
            Some((RuleKind::Counter, "app.Store.find(I)V".into()))
        );
        assert_eq!(matched(&c, "app.Store", &none, "find", "(J)V"), None);
    }

    #[test]
    fn test_empty_descriptor_key_covers_overloads() {
        let c = config(
            r#"
            ["app.Store".find]
            "" = "meter"
            "(I)V" = "timer"
            "#,
        );
        let none = AncestorSet::default();
        assert_eq!(
            matched(&c, "app.Store", &none, "find", "(J)V"),
            Some((RuleKind::Meter, "app.Store.find".into()))
        );
        assert_eq!(
            matched(&c, "app.Store", &none, "find", "(I)V"),
            Some((RuleKind::Timer, "app.Store.find(I)V".into()))
        );
        let observed = vec![MethodSig::new("find", "(I)V")];
        assert!(MethodMatcher::new(&c).check_unused(&"app.Store".into(), &observed).is_empty());
    }

    #[test]
    fn test_priority_within_tier() {
        let c = config(
            r#"
            ["app.Store".find]
            "(I)V" = "meter"
            type = "count_return"

            ["app.Store".load]
            "(I)V" = "counter"
            "#,
        );
        let none = AncestorSet::default();
        // Meter (descriptor) outranks ReturnCount (name-only).
        assert_eq!(
            matched(&c, "app.Store", &none, "find", "(I)V"),
            Some((RuleKind::Meter, "app.Store.find(I)V".into()))
        );
        // Other overloads fall back to the name-only return rule.
        assert_eq!(
            matched(&c, "app.Store", &none, "find", "(J)J"),
            Some((RuleKind::ReturnCount, "app.Store.find".into()))
        );
    }

    #[test]
    fn test_interface_fallback() {
        let c = config("[\"app.Computable\"]\ncompute = \"apicounter\"\n");
        let declared = interfaces(&[("app.Computable", Some(&[("compute", "()I")]))]);
        assert_eq!(
            matched(&c, "app.ExampleClass", &declared, "compute", "()I"),
            Some((RuleKind::ApiCounter, "app.Computable.compute".into()))
        );
        // The interface does not declare this overload.
        assert_eq!(matched(&c, "app.ExampleClass", &declared, "compute", "(I)I"), None);

        let unknown = interfaces(&[("app.Computable", None)]);
        assert_eq!(
            matched(&c, "app.ExampleClass", &unknown, "compute", "(I)I"),
            Some((RuleKind::ApiCounter, "app.Computable.compute".into()))
        );

        let none = AncestorSet::default();
        assert_eq!(matched(&c, "app.ExampleClass", &none, "compute", "()I"), None);
    }

    #[test]
    fn test_type_tier_beats_interface() {
        let c = config(
            r#"
            ["app.ExampleClass"]
            compute = "meter"
            ["app.Computable"]
            compute = "timer"
            "#,
        );
        let declared = interfaces(&[("app.Computable", None)]);
        assert_eq!(
            matched(&c, "app.ExampleClass", &declared, "compute", "()I"),
            Some((RuleKind::Meter, "app.ExampleClass.compute".into()))
        );
    }

    #[test]
    fn test_package_bucket() {
        let c = config(
            r#"
            [packages."app.web"]
            handle = "timer"
            [packages."api"]
            call = "counter"
            "#,
        );
        let none = AncestorSet::default();
        assert_eq!(
            matched(&c, "app.web.Handler", &none, "handle", "()V"),
            Some((RuleKind::Timer, "app.web.Handler.handle".into()))
        );

        let declared = interfaces(&[("api.Remote", None)]);
        assert_eq!(
            matched(&c, "app.Client", &declared, "call", "()V"),
            Some((RuleKind::Counter, "api.Remote.call".into()))
        );
    }

    #[test]
    fn test_package_bucket_behind_type_entry() {
        let c = config(
            r#"
            [packages."app.web"]
            handle = "timer"
            keyMethod = "getCode"

            ["app.web.Handler"]
            other = "meter"
            status = "count_return"
            "#,
        );
        let none = AncestorSet::default();
        assert_eq!(
            matched(&c, "app.web.Handler", &none, "handle", "()V"),
            Some((RuleKind::Timer, "app.web.Handler.handle".into()))
        );
        assert_eq!(
            matched(&c, "app.web.Handler", &none, "other", "()V"),
            Some((RuleKind::Meter, "app.web.Handler.other".into()))
        );

        let status = MethodMatcher::new(&c)
            .should_instrument(&TypeName::new("app.web.Handler"), &none, "status", "()Lapp/Status;")
            .unwrap();
        assert_eq!(status.rule.key, Some(ReturnKey::Accessor("getCode".into())));
    }

    #[test]
    fn test_unknown_literal_is_not_a_rule() {
        let c = config("[\"app.Store\"]\nfind = \"stopwatch\"\nload = \"count_return\"\n");
        let none = AncestorSet::default();
        assert_eq!(matched(&c, "app.Store", &none, "find", "()V"), None);
        assert_eq!(matched(&c, "app.Store", &none, "load", "()V"), None);
    }

    #[test]
    fn test_return_key_lookup() {
        let c = config(
            r#"
            ["app.Store"]
            keyMethod = "getCode"

            ["app.Store".find]
            type = "meter_return"
            "(I)Lapp/Item;" = { type = "count_return", keyMethod = "getStatus" }

            ["app.Store".list]
            type = "count_return"
            helperClass = "app.ListHelper"

            ["app.Store".size]
            type = "count_return"
            "#,
        );
        let m = MethodMatcher::new(&c);
        let ty = TypeName::new("app.Store");
        let none = AncestorSet::default();

        let found = m.should_instrument(&ty, &none, "find", "(I)Lapp/Item;").unwrap();
        assert_eq!(found.rule.kind, RuleKind::ReturnCount);
        assert_eq!(found.rule.key, Some(ReturnKey::Accessor("getStatus".into())));
        assert_eq!(found.metric.as_str(), "app.Store.find(I)Lapp/Item;");

        let other = m.should_instrument(&ty, &none, "find", "()Lapp/Item;").unwrap();
        assert_eq!(other.rule.kind, RuleKind::ReturnMeter);
        assert_eq!(other.metric.as_str(), "app.Store.find");
        assert_eq!(other.rule.key, Some(ReturnKey::Accessor("getCode".into())));

        let list = m.should_instrument(&ty, &none, "list", "()Lapp/List;").unwrap();
        assert_eq!(list.rule.key, Some(ReturnKey::Helper("app.ListHelper".into())));

        let size = m.should_instrument(&ty, &none, "size", "()I").unwrap();
        assert_eq!(size.rule.key, Some(ReturnKey::Accessor("getCode".into())));
    }

    #[test]
    fn test_helper_wins_over_accessor() {
        let c = config(
            r#"
            ["app.Store"]
            helperClass = "app.StoreHelper"
            ["app.Store".find]
            type = "count_return"
            keyMethod = "getStatus"
            "#,
        );
        let key = MethodMatcher::new(&c).return_key(&"app.Store".into(), &AncestorSet::default(), "find", "()I");
        assert_eq!(key, Some(ReturnKey::Helper("app.StoreHelper".into())));
    }

    #[test]
    fn test_should_weave_type() {
        let c = config("[\"app.Computable\"]\ncompute = \"timer\"\n[packages.\"lib\"]\nrun = \"meter\"\n");
        let m = MethodMatcher::new(&c);
        let none = AncestorSet::default();
        assert!(m.should_weave_type(&"lib.Task".into(), &none));
        assert!(!m.should_weave_type(&"app.Plain".into(), &none));
        let declared = interfaces(&[("app.Computable", None)]);
        assert!(m.should_weave_type(&"app.Plain".into(), &declared));
    }

    #[test]
    fn test_dump_selection() {
        let c = config(
            r#"
            [global.dump]
            output = "shapes.toml"
            include = ["app\\..*", "api\\.Listener"]
            exclude = ["app\\.internal\\..*", "api\\.Hidden"]
            "#,
        );
        let m = MethodMatcher::new(&c);
        let none = AncestorSet::default();
        assert!(m.include_in_dump(&"app.Service".into(), &none));
        assert!(!m.include_in_dump(&"app.internal.Cache".into(), &none));
        assert!(!m.include_in_dump(&"lib.Task".into(), &none));
        // Full match only.
        assert!(!m.include_in_dump(&"xapp.Service".into(), &none));

        let listener = interfaces(&[("api.Listener", None)]);
        assert!(m.include_in_dump(&"lib.Task".into(), &listener));
        let hidden = interfaces(&[("api.Listener", None), ("api.Hidden", None)]);
        assert!(!m.include_in_dump(&"lib.Task".into(), &hidden));

        let all = config("[global.dump]\noutput = \"shapes.toml\"\n");
        assert!(MethodMatcher::new(&all).include_in_dump(&"any.Type".into(), &none));
        let off = config("[global.dump]\ninclude = [\".*\"]\n");
        assert!(!MethodMatcher::new(&off).include_in_dump(&"any.Type".into(), &none));
    }

    #[test]
    fn test_check_unused() {
        let c = config(
            r#"
            ["app.Store"]
            _dumpClass = true
            keyMethod = "getCode"
            load = "meter"
            save = "stopwatch"
            gone = "timer"

            ["app.Store".find]
            "(I)V" = "counter"
            "(J)V" = "counter"
            type = "sum_return"
            "#,
        );
        let observed = vec![
            MethodSig::new("load", "()V"),
            MethodSig::new("save", "()V"),
            MethodSig::new("find", "(I)V"),
        ];
        let diags = MethodMatcher::new(&c).check_unused(&"app.Store".into(), &observed);
        assert_eq!(
            diags,
            vec![
                ConfigDiagnostic::UnknownKind {
                    type_name: "app.Store".into(),
                    method: "save".into(),
                    value: "stopwatch".into(),
                },
                ConfigDiagnostic::UnknownKind {
                    type_name: "app.Store".into(),
                    method: "find".into(),
                    value: "sum_return".into(),
                },
                ConfigDiagnostic::UnusedMethod {
                    type_name: "app.Store".into(),
                    method: "gone".into(),
                    descriptor: None,
                },
                ConfigDiagnostic::UnusedMethod {
                    type_name: "app.Store".into(),
                    method: "find".into(),
                    descriptor: Some("(J)V".into()),
                },
            ]
        );
        assert!(diags[0].to_string().contains("stopwatch"));
        assert!(MethodMatcher::new(&c).check_unused(&"app.Other".into(), &observed).is_empty());
    }
}
