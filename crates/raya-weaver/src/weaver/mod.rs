//! Instrumentation weaver
//!
//! Rewrites one method body per call according to a resolved rule. The
//! rewritten body carries no stack-map frames; the caller recomputes them with
//! a [`FrameComputer`](raya_classfile::FrameComputer) before the unit is
//! encoded.

mod capture;
mod count;
mod facade;
mod guarded;
mod timer;

use crate::matcher::{InstrumentationRule, RuleKind};
use crate::names::MetricName;
use facade::FacadeCalls;
use raya_classfile::{
    access, Code, CodeError, ConstantPool, DescriptorError, FrameError, Insn, InsnList, Label, MethodDef,
    MethodDescriptor, Node, Opcode, PoolFull, TryCatchBlock, VerifyError,
};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while weaving a method
#[derive(Debug, Error)]
pub enum WeaveError {
    /// The method carries probes already
    #[error("method is already woven")]
    AlreadyWoven,

    /// Abstract, native or body-less method
    #[error("method has no body")]
    NoBody,

    /// Return capture requested on a method returning nothing
    #[error("cannot capture the return value of a void method")]
    VoidCapture,

    /// The body could not be decoded or re-assembled
    #[error("malformed body: {0}")]
    Code(#[from] CodeError),

    /// The unit's constant pool has no room for the probe constants
    #[error(transparent)]
    PoolFull(#[from] PoolFull),

    /// The method descriptor is malformed
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// Frames of the rewritten body could not be computed
    #[error("frame computation failed: {0}")]
    Frames(#[from] FrameError),

    /// The rewritten body failed verification
    #[error("verification failed: {0}")]
    Verify(#[from] VerifyError),
}

impl WeaveError {
    /// Reason reported for the skipped method
    pub fn skip_reason(&self) -> SkipReason {
        match self {
            WeaveError::AlreadyWoven => SkipReason::AlreadyWoven,
            WeaveError::NoBody => SkipReason::NoBody,
            WeaveError::VoidCapture => SkipReason::VoidReturn,
            other => SkipReason::Failed(other.to_string()),
        }
    }
}

/// Why a matched method was left unchanged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Flagged as woven by an earlier pass
    AlreadyWoven,
    /// Nothing to rewrite
    NoBody,
    /// Return rule on a void method
    VoidReturn,
    /// Weaving failed; the message describes why
    Failed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyWoven => f.write_str("already woven"),
            SkipReason::NoBody => f.write_str("no body"),
            SkipReason::VoidReturn => f.write_str("void return"),
            SkipReason::Failed(msg) => write!(f, "failed: {}", msg),
        }
    }
}

/// Per-method result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodOutcome {
    /// Probes inserted
    Woven {
        /// Strategy applied
        kind: RuleKind,
        /// Metric reported to
        metric: MetricName,
    },
    /// Left unchanged
    Skipped(SkipReason),
}

impl MethodOutcome {
    /// Whether probes were inserted
    pub fn is_woven(&self) -> bool {
        matches!(self, MethodOutcome::Woven { .. })
    }
}

/// Weaving switches taken from the global configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeaveOptions {
    /// Run exit actions on exceptional exits too
    pub exceptional_exits: bool,
}

impl Default for WeaveOptions {
    fn default() -> Self {
        Self {
            exceptional_exits: true,
        }
    }
}

/// Rewrite `method` in place according to `rule`
///
/// Constants the probes need are added to `pool`. On success the method is
/// flagged [`access::WOVEN`] and its frames are cleared.
pub fn weave_method(
    pool: &mut ConstantPool,
    method: &mut MethodDef,
    rule: &InstrumentationRule,
    metric: &MetricName,
    options: WeaveOptions,
) -> Result<(), WeaveError> {
    if method.is_woven() {
        return Err(WeaveError::AlreadyWoven);
    }
    if !method.has_body() {
        return Err(WeaveError::NoBody);
    }
    let Some(code) = method.code.as_ref() else {
        return Err(WeaveError::NoBody);
    };

    let descriptor = MethodDescriptor::parse(&method.descriptor)?;
    let receiver = if method.is_static() { 0 } else { 1 };
    let first_free = code.max_locals.max(descriptor.param_slots() + receiver);
    let max_stack = code.max_stack;

    let mut list = InsnList::decode(code)?;
    let mut calls = FacadeCalls::new(pool);
    let name = metric.as_str();
    let extra_locals = match rule.kind {
        RuleKind::Timer => {
            timer::weave(&mut list, &mut calls, name, first_free, options)?;
            1
        }
        RuleKind::Counter => {
            count::weave(&mut list, &mut calls, raya_metrics::symbols::COUNT, name)?;
            0
        }
        RuleKind::Meter => {
            count::weave(&mut list, &mut calls, raya_metrics::symbols::MARK, name)?;
            0
        }
        RuleKind::ApiCounter => {
            guarded::weave(&mut list, &mut calls, name, options)?;
            0
        }
        RuleKind::ReturnCount | RuleKind::ReturnMeter => {
            capture::weave(
                &mut list,
                &mut calls,
                name,
                rule.key.as_ref(),
                &descriptor,
                rule.kind == RuleKind::ReturnMeter,
            )?;
            0
        }
    };

    let assembled = list.assemble()?;
    method.code = Some(Code {
        max_stack,
        max_locals: first_free + extra_locals,
        bytes: assembled.bytes,
        handlers: assembled.handlers,
        frames: Vec::new(),
    });
    method.access |= access::WOVEN;
    Ok(())
}

/// Insert `probe` at method entry
fn at_entry(list: &mut InsnList, probe: Vec<Node>) {
    list.insert(0, probe);
}

/// Insert `probe` before every instruction whose opcode satisfies `pred`
fn before_each(list: &mut InsnList, pred: impl Fn(Opcode) -> bool, probe: &[Node]) {
    for idx in list.positions(|insn| pred(insn.opcode)).into_iter().rev() {
        list.insert(idx, probe.iter().copied());
    }
}

/// Cover everything after `start` with a catch-all running `exit` and rethrowing
fn on_exceptional_exit(list: &mut InsnList, start: Label, exit: &[Node]) {
    let end = list.new_label();
    let handler = list.new_label();
    list.push(Node::Label(end));
    list.push(Node::Label(handler));
    for node in exit {
        list.push(*node);
    }
    list.push(Insn::op(Opcode::AThrow));
    list.add_try_catch(TryCatchBlock {
        start,
        end,
        handler,
        catch_type: None,
    });
}

#[cfg(test)]
pub(crate) mod testing {
    //! Unit builders shared by weaving tests

    use raya_classfile::{access, ClassUnit, Code, ConstantPool, Insn, InsnList, MethodDef, Opcode};

    /// Assemble `build`'s instructions into a method of `unit`
    pub(crate) fn add_method(
        unit: &mut ClassUnit,
        name: &str,
        descriptor: &str,
        is_static: bool,
        build: impl FnOnce(&mut InsnList, &mut ConstantPool),
    ) {
        let mut list = InsnList::new();
        build(&mut list, &mut unit.constants);
        let assembled = list.assemble().unwrap();
        let mut flags = access::PUBLIC;
        if is_static {
            flags |= access::STATIC;
        }
        unit.methods.push(MethodDef {
            access: flags,
            name: name.into(),
            descriptor: descriptor.into(),
            code: Some(Code {
                max_stack: 4,
                max_locals: 4,
                bytes: assembled.bytes,
                handlers: assembled.handlers,
                frames: Vec::new(),
            }),
        });
    }

    /// `int size(int n) { if (n == 0) return 0; return n; }`
    pub(crate) fn branching_int(list: &mut InsnList, _pool: &mut ConstantPool) {
        let nonzero = list.new_label();
        list.push(Insn::local(Opcode::ILoad, 1));
        list.push(Insn::jump(Opcode::IfNe, nonzero));
        list.push(Insn::int(0));
        list.push(Insn::op(Opcode::IReturn));
        list.push(raya_classfile::Node::Label(nonzero));
        list.push(Insn::local(Opcode::ILoad, 1));
        list.push(Insn::op(Opcode::IReturn));
    }

    /// Opcodes of a method body in order
    pub(crate) fn opcodes(code: &Code) -> Vec<Opcode> {
        raya_classfile::decode_instructions(&code.bytes)
            .unwrap()
            .into_iter()
            .map(|i| i.opcode)
            .collect()
    }

    /// Names of the methods invoked by a body, in order
    pub(crate) fn invoked(unit: &ClassUnit, code: &Code) -> Vec<String> {
        raya_classfile::decode_instructions(&code.bytes)
            .unwrap()
            .into_iter()
            .filter(|i| i.opcode.is_invoke())
            .map(|i| match i.operand {
                raya_classfile::Operand::Const(idx) => unit.constants.get_method(idx).unwrap().name.clone(),
                _ => unreachable!(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use raya_classfile::{verify_method, ClassUnit, FrameComputer, MethodContext, RootOnly};

    fn rule(kind: RuleKind) -> InstrumentationRule {
        InstrumentationRule { kind, key: None }
    }

    fn metric() -> MetricName {
        MetricName::new(&"app.Store".into(), "size", None)
    }

    fn finish(unit: &mut ClassUnit, idx: usize) {
        let ClassUnit {
            name,
            constants,
            methods,
            ..
        } = unit;
        let method = &mut methods[idx];
        let ctx = MethodContext {
            owner: name,
            descriptor: &method.descriptor,
            is_static: method.is_static(),
            pool: constants,
        };
        let code = method.code.as_mut().unwrap();
        FrameComputer::new(&RootOnly).apply(&ctx, code).unwrap();
        verify_method(unit, &unit.methods[idx]).unwrap();
    }

    #[test]
    fn test_counter_and_meter_probe_entry_only() {
        for (kind, call) in [(RuleKind::Counter, "count"), (RuleKind::Meter, "mark")] {
            let mut unit = ClassUnit::new("app/Store", Some("raya/lang/Object"));
            add_method(&mut unit, "size", "(I)I", false, branching_int);
            let mut method = unit.methods[0].clone();
            weave_method(&mut unit.constants, &mut method, &rule(kind), &metric(), WeaveOptions::default()).unwrap();
            unit.methods[0] = method;
            finish(&mut unit, 0);

            let code = unit.methods[0].code.as_ref().unwrap();
            assert_eq!(&opcodes(code)[..3], &[Opcode::Ldc, Opcode::InvokeStatic, Opcode::ILoad]);
            assert_eq!(invoked(&unit, code), vec![call.to_string()]);
            assert!(code.handlers.is_empty());
            assert!(unit.methods[0].is_woven());
        }
    }

    #[test]
    fn test_already_woven_and_bodiless() {
        let mut unit = ClassUnit::new("app/Store", Some("raya/lang/Object"));
        add_method(&mut unit, "size", "(I)I", false, branching_int);
        let mut method = unit.methods[0].clone();
        method.access |= access::WOVEN;
        let err = weave_method(&mut unit.constants, &mut method, &rule(RuleKind::Timer), &metric(), WeaveOptions::default())
            .unwrap_err();
        assert_eq!(err.skip_reason(), SkipReason::AlreadyWoven);

        let mut abstract_method = MethodDef {
            access: access::PUBLIC | access::ABSTRACT,
            name: "size".into(),
            descriptor: "(I)I".into(),
            code: None,
        };
        let err = weave_method(
            &mut unit.constants,
            &mut abstract_method,
            &rule(RuleKind::Counter),
            &metric(),
            WeaveOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.skip_reason(), SkipReason::NoBody);
    }

    #[test]
    fn test_malformed_body_is_an_error() {
        let mut unit = ClassUnit::new("app/Store", Some("raya/lang/Object"));
        let mut method = MethodDef {
            access: access::PUBLIC,
            name: "size".into(),
            descriptor: "()V".into(),
            code: Some(Code {
                max_stack: 1,
                max_locals: 1,
                bytes: vec![0xEE],
                ..Code::default()
            }),
        };
        let err = weave_method(&mut unit.constants, &mut method, &rule(RuleKind::Meter), &metric(), WeaveOptions::default())
            .unwrap_err();
        assert!(matches!(err.skip_reason(), SkipReason::Failed(_)));
        assert!(!method.is_woven());
    }
}
