//! Structural verification of class units

use crate::code::{decode_instructions, CodeError, Operand};
use crate::constants::Constant;
use crate::descriptor::MethodDescriptor;
use crate::opcode::Opcode;
use crate::unit::{ClassUnit, MethodDef};
use std::collections::BTreeSet;
use thiserror::Error;

/// Verification errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Body could not be decoded
    #[error("{method}: {source}")]
    Code {
        /// Method name and descriptor
        method: String,
        /// Underlying error
        source: CodeError,
    },

    /// Malformed method descriptor
    #[error("{method}: invalid descriptor")]
    InvalidDescriptor {
        /// Method name and descriptor
        method: String,
    },

    /// Invalid jump target
    #[error("{method}: invalid jump target {target} at offset {offset}")]
    InvalidJumpTarget {
        /// Method name and descriptor
        method: String,
        /// Target offset
        target: u32,
        /// Branch offset
        offset: u32,
    },

    /// Invalid constant pool reference
    #[error("{method}: invalid constant reference #{index} at offset {offset}")]
    InvalidConstantRef {
        /// Method name and descriptor
        method: String,
        /// Pool index
        index: u16,
        /// Instruction offset
        offset: u32,
    },

    /// Invalid local variable reference
    #[error("{method}: local {index} out of range (max {max}) at offset {offset}")]
    InvalidLocalRef {
        /// Method name and descriptor
        method: String,
        /// Slot
        index: u16,
        /// `max_locals`
        max: u16,
        /// Instruction offset
        offset: u32,
    },

    /// Exception range is empty, inverted or misaligned
    #[error("{method}: invalid handler range [{start}, {end}) -> {handler}")]
    InvalidHandler {
        /// Method name and descriptor
        method: String,
        /// Range start
        start: u32,
        /// Range end
        end: u32,
        /// Handler offset
        handler: u32,
    },

    /// Execution falls off end
    #[error("{method}: execution falls off the end of the body")]
    FallOffEnd {
        /// Method name and descriptor
        method: String,
    },

    /// Abstract or native method carrying a body, or a concrete method without one
    #[error("{method}: body presence does not match access flags")]
    BodyMismatch {
        /// Method name and descriptor
        method: String,
    },
}

/// Verify every method of a unit
pub fn verify_unit(unit: &ClassUnit) -> Result<(), VerifyError> {
    for method in &unit.methods {
        verify_method(unit, method)?;
    }
    Ok(())
}

/// Verify a single method body against its unit's constant pool
pub fn verify_method(unit: &ClassUnit, method: &MethodDef) -> Result<(), VerifyError> {
    let id = format!("{}.{}{}", unit.name, method.name, method.descriptor);
    let descriptor = MethodDescriptor::parse(&method.descriptor)
        .map_err(|_| VerifyError::InvalidDescriptor { method: id.clone() })?;

    let bodiless = method.is_abstract() || method.access & crate::unit::access::NATIVE != 0;
    let code = match (&method.code, bodiless) {
        (None, true) => return Ok(()),
        (Some(code), false) => code,
        _ => return Err(VerifyError::BodyMismatch { method: id }),
    };

    let insns = decode_instructions(&code.bytes).map_err(|source| VerifyError::Code {
        method: id.clone(),
        source,
    })?;
    let Some(last) = insns.last() else {
        return Err(VerifyError::FallOffEnd { method: id });
    };
    if !last.opcode.is_terminator() {
        return Err(VerifyError::FallOffEnd { method: id });
    }

    let end = code.bytes.len() as u32;
    let boundaries: BTreeSet<u32> = insns.iter().map(|i| i.offset).collect();

    let receiver = if method.is_static() { 0 } else { 1 };
    let params = receiver + descriptor.param_slots();
    if params > code.max_locals {
        return Err(VerifyError::InvalidLocalRef {
            method: id,
            index: params.saturating_sub(1),
            max: code.max_locals,
            offset: 0,
        });
    }

    for insn in &insns {
        match insn.operand {
            Operand::Branch(target) => {
                if !boundaries.contains(&target) {
                    return Err(VerifyError::InvalidJumpTarget {
                        method: id,
                        target,
                        offset: insn.offset,
                    });
                }
            }
            Operand::Local(slot) => {
                let width = if matches!(
                    insn.opcode,
                    Opcode::LLoad | Opcode::DLoad | Opcode::LStore | Opcode::DStore
                ) {
                    2
                } else {
                    1
                };
                if slot as u32 + width > code.max_locals as u32 {
                    return Err(VerifyError::InvalidLocalRef {
                        method: id,
                        index: slot,
                        max: code.max_locals,
                        offset: insn.offset,
                    });
                }
            }
            Operand::Const(index) => {
                let entry = unit.constants.get(index);
                let ok = match insn.opcode {
                    Opcode::Ldc => !matches!(entry, None | Some(Constant::Method(_))),
                    Opcode::InvokeVirtual
                    | Opcode::InvokeSpecial
                    | Opcode::InvokeStatic
                    | Opcode::InvokeInterface => match entry {
                        Some(Constant::Method(m)) => {
                            m.interface == (insn.opcode == Opcode::InvokeInterface)
                                && MethodDescriptor::parse(&m.descriptor).is_ok()
                        }
                        _ => false,
                    },
                    _ => matches!(entry, Some(Constant::Class(_))),
                };
                if !ok {
                    return Err(VerifyError::InvalidConstantRef {
                        method: id,
                        index,
                        offset: insn.offset,
                    });
                }
            }
            _ => {}
        }
    }

    for h in &code.handlers {
        let catch_ok = match h.catch_type {
            None => true,
            Some(idx) => unit.constants.get_class(idx).is_some(),
        };
        let valid = h.start < h.end
            && boundaries.contains(&h.start)
            && (h.end == end || boundaries.contains(&h.end))
            && boundaries.contains(&h.handler)
            && catch_ok;
        if !valid {
            return Err(VerifyError::InvalidHandler {
                method: id,
                start: h.start,
                end: h.end,
                handler: h.handler,
            });
        }
    }

    Ok(())
}
