//! Return-value capture probes
//!
//! Before every value return the returned value is duplicated and handed to a
//! capture function together with the metric name and, when configured, the
//! accessor or helper that derives the suffix.

use super::facade::FacadeCalls;
use super::{before_each, WeaveError};
use raya_classfile::{Insn, InsnList, MethodDescriptor, Opcode};
use raya_metrics::{symbols, ReturnKey};

pub(super) fn weave(
    list: &mut InsnList,
    calls: &mut FacadeCalls<'_>,
    metric: &str,
    key: Option<&ReturnKey>,
    descriptor: &MethodDescriptor,
    meter: bool,
) -> Result<(), WeaveError> {
    let ret = descriptor.ret.as_ref().ok_or(WeaveError::VoidCapture)?;
    let value_type = symbols::capture_value_type(&ret.to_string()).ok_or(WeaveError::VoidCapture)?;

    let (function, key_name) = match key {
        None => (plain(meter), None),
        Some(ReturnKey::Accessor(accessor)) => (plain(meter), Some(accessor.as_str())),
        Some(ReturnKey::Helper(helper)) => {
            let function = if meter {
                symbols::MARK_CAPTURE_HELPER
            } else {
                symbols::COUNT_CAPTURE_HELPER
            };
            (function, Some(helper.as_str()))
        }
    };

    let dup = if ret.is_wide() { Opcode::Dup2 } else { Opcode::Dup };
    let mut probe = vec![Insn::op(dup).into(), calls.string(metric)?];
    if let Some(name) = key_name {
        probe.push(calls.string(name)?);
    }
    probe.push(calls.capture(function, &symbols::capture_descriptor(value_type, key_name.is_some()))?);

    before_each(list, |op| op.is_return() && op.returns_value(), &probe);
    Ok(())
}

fn plain(meter: bool) -> &'static str {
    if meter {
        symbols::MARK_CAPTURE
    } else {
        symbols::COUNT_CAPTURE
    }
}
