//! Weaving coordinator
//!
//! [`WeavingHook`] is invoked once per loaded type with its raw bytes and
//! returns the bytes to load instead. Types it cannot or should not touch come
//! back unchanged; per-method failures leave that method unchanged and the
//! rest of the type woven.

use crate::ancestors::AncestorSet;
use crate::config::{MetricsConfig, DUMP_CLASS_KEY};
use crate::dump::DumpSink;
use crate::hierarchy::HierarchyResolver;
use crate::matcher::{ConfigDiagnostic, InstrumentationRule, Match, MethodMatcher, RuleKind};
use crate::names::{MethodSig, MetricName, TypeName};
use crate::provider::{Overlay, TypeMetadata, TypeMetadataProvider, UNIT_EXTENSION};
use crate::weaver::{weave_method, MethodOutcome, SkipReason, WeaveError, WeaveOptions};
use raya_classfile::{verify_method, ClassUnit, FrameComputer, MethodContext};
use raya_metrics::symbols::FACADE_MODULE;
use std::io;
use std::sync::Arc;

/// Result of visiting one type
#[derive(Debug, Clone, Default)]
pub struct WeaveResult {
    /// Bytes to load: rewritten when `woven`, the input otherwise
    pub bytes: Vec<u8>,
    /// Whether at least one method was rewritten
    pub woven: bool,
    /// Whether the loaded type needs the metrics facade module
    pub requires_facade_import: bool,
    /// Outcome of every method a rule or the dump selected
    pub outcomes: Vec<(MethodSig, MethodOutcome)>,
    /// Every method the type declares
    pub observed: Vec<MethodSig>,
    /// Configuration diagnostics; filled by [`WeavingHook::weave`]
    pub unused_rules: Vec<ConfigDiagnostic>,
}

impl WeaveResult {
    fn unchanged(raw: &[u8]) -> Self {
        Self {
            bytes: raw.to_vec(),
            ..Self::default()
        }
    }

    /// Number of rewritten methods
    pub fn methods_woven(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_woven()).count()
    }

    /// Number of selected methods left unchanged
    pub fn methods_skipped(&self) -> usize {
        self.outcomes.len() - self.methods_woven()
    }
}

/// Rewrites loaded types according to a configuration snapshot
pub struct WeavingHook {
    config: Arc<MetricsConfig>,
    provider: Arc<dyn TypeMetadataProvider>,
    dump: Option<DumpSink>,
}

impl WeavingHook {
    /// Create a hook without a call-shape dump
    pub fn new(config: Arc<MetricsConfig>, provider: Arc<dyn TypeMetadataProvider>) -> Self {
        Self {
            config,
            provider,
            dump: None,
        }
    }

    /// Create a hook, opening the dump file the configuration names
    pub fn open(config: Arc<MetricsConfig>, provider: Arc<dyn TypeMetadataProvider>) -> io::Result<Self> {
        let dump = match &config.global().dump.output {
            Some(path) => Some(DumpSink::create(path)?),
            None => None,
        };
        Ok(Self {
            config,
            provider,
            dump,
        })
    }

    /// Record call shapes into `sink`
    pub fn with_dump_sink(mut self, sink: DumpSink) -> Self {
        self.dump = Some(sink);
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Visit and finish `name` in one call
    pub fn weave(&self, name: &TypeName, raw: &[u8]) -> WeaveResult {
        let mut result = self.visit_type(name, raw);
        result.unused_rules = self.finish_type(name, &result.observed);
        result
    }

    /// Rewrite the methods of `name` that a rule selects
    pub fn visit_type(&self, name: &TypeName, raw: &[u8]) -> WeaveResult {
        let mut unit = match ClassUnit::decode(raw) {
            Ok(unit) => unit,
            Err(e) => {
                tracing::debug!(type_name = %name, error = %e, "undecodable unit left unchanged");
                return WeaveResult::unchanged(raw);
            }
        };
        if unit.is_interface() && !unit.methods.iter().any(|m| m.has_body()) {
            tracing::debug!(type_name = %name, "interface without bodies");
            return WeaveResult::unchanged(raw);
        }

        let interfaces: Vec<TypeName> = unit.interfaces.iter().map(TypeName::new).collect();
        let ancestors = AncestorSet::collect(&interfaces, self.provider.as_ref());
        let matcher = MethodMatcher::new(&self.config);
        if !matcher.should_weave_type(name, &ancestors) {
            return WeaveResult::unchanged(raw);
        }
        let dumping = matcher.include_in_dump(name, &ancestors);

        let observed: Vec<MethodSig> = unit
            .methods
            .iter()
            .map(|m| MethodSig::new(m.name.as_str(), m.descriptor.as_str()))
            .collect();

        let overlay = Overlay::new(name.clone(), TypeMetadata::from_unit(&unit), self.provider.as_ref());
        let resolver = HierarchyResolver::new(&overlay);
        let options = WeaveOptions {
            exceptional_exits: self.config.global().exceptional_exits,
        };

        let mut outcomes = Vec::new();
        for idx in 0..unit.methods.len() {
            let sig = observed[idx].clone();
            let selected = match matcher.should_instrument(name, &ancestors, &sig.name, &sig.descriptor) {
                Some(m) => m,
                None if dumping && unit.methods[idx].has_body() => Match {
                    rule: InstrumentationRule {
                        kind: RuleKind::Timer,
                        key: None,
                    },
                    metric: MetricName::new(name, &sig.name, Some(&sig.descriptor)),
                },
                None => continue,
            };

            let pool = unit.constants.clone();
            let outcome = match self.weave_one(&mut unit, idx, &selected, options, &resolver) {
                Ok(()) => {
                    tracing::info!(type_name = %name, method = %sig, kind = %selected.rule.kind, metric = %selected.metric, "woven");
                    MethodOutcome::Woven {
                        kind: selected.rule.kind,
                        metric: selected.metric,
                    }
                }
                Err(e) => {
                    unit.constants = pool;
                    let reason = e.skip_reason();
                    match reason {
                        SkipReason::Failed(_) => {
                            tracing::error!(type_name = %name, method = %sig, error = %e, "weaving failed, method left unchanged")
                        }
                        _ => tracing::debug!(type_name = %name, method = %sig, reason = %reason, "method skipped"),
                    }
                    MethodOutcome::Skipped(reason)
                }
            };
            outcomes.push((sig, outcome));
        }

        if dumping {
            if let Some(sink) = &self.dump {
                let shapes: Vec<MethodSig> = unit
                    .methods
                    .iter()
                    .zip(&observed)
                    .filter(|(m, _)| m.has_body())
                    .map(|(_, sig)| sig.clone())
                    .collect();
                if let Err(e) = sink.record(name, &ancestors, &shapes) {
                    tracing::warn!(type_name = %name, path = %sink.path().display(), error = %e, "call-shape dump failed");
                }
            }
        }

        let woven = outcomes.iter().any(|(_, o)| o.is_woven());
        if !woven {
            return WeaveResult {
                bytes: raw.to_vec(),
                outcomes,
                observed,
                ..WeaveResult::default()
            };
        }

        unit.add_import(FACADE_MODULE);
        let bytes = unit.encode();
        if self.config.type_flag(name.as_str(), DUMP_CLASS_KEY) {
            self.write_class_dump(name, &bytes);
        }

        WeaveResult {
            bytes,
            woven,
            requires_facade_import: true,
            outcomes,
            observed,
            unused_rules: Vec::new(),
        }
    }

    /// Configuration diagnostics for a visited type
    pub fn finish_type(&self, name: &TypeName, observed: &[MethodSig]) -> Vec<ConfigDiagnostic> {
        let diagnostics = MethodMatcher::new(&self.config).check_unused(name, observed);
        for diagnostic in &diagnostics {
            tracing::warn!(type_name = %name, "{}", diagnostic);
        }
        diagnostics
    }

    /// Weave, recompute frames and verify method `idx` of `unit`
    ///
    /// On error the unit's methods are untouched; its pool may have grown.
    fn weave_one(
        &self,
        unit: &mut ClassUnit,
        idx: usize,
        selected: &Match,
        options: WeaveOptions,
        resolver: &HierarchyResolver<'_>,
    ) -> Result<(), WeaveError> {
        let mut method = unit.methods[idx].clone();
        weave_method(&mut unit.constants, &mut method, &selected.rule, &selected.metric, options)?;

        let is_static = method.is_static();
        let ctx = MethodContext {
            owner: &unit.name,
            descriptor: &method.descriptor,
            is_static,
            pool: &unit.constants,
        };
        if let Some(code) = method.code.as_mut() {
            FrameComputer::new(resolver).apply(&ctx, code)?;
        }
        if self.config.global().verify {
            verify_method(unit, &method)?;
        }
        unit.methods[idx] = method;
        Ok(())
    }

    fn write_class_dump(&self, name: &TypeName, bytes: &[u8]) {
        let Some(dir) = &self.config.global().class_dump_dir else {
            tracing::warn!(type_name = %name, "_dumpClass set without class_dump_dir");
            return;
        };
        let path = dir.join(format!("{}.{}", name, UNIT_EXTENSION));
        let written = std::fs::create_dir_all(dir).and_then(|()| std::fs::write(&path, bytes));
        match written {
            Ok(()) => tracing::debug!(type_name = %name, path = %path.display(), "woven unit written"),
            Err(e) => tracing::warn!(type_name = %name, path = %path.display(), error = %e, "class dump failed"),
        }
    }
}
