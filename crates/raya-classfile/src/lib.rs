//! Raya class-unit format
//!
//! This crate provides the binary container for single-type program units,
//! the instruction set of their method bodies, editable instruction lists,
//! stack-map frame computation and a structural verifier.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod code;
pub mod constants;
pub mod descriptor;
pub mod encoder;
pub mod frames;
pub mod opcode;
pub mod unit;
pub mod verify;

pub use code::{decode_instructions, disassemble, Assembled, CodeError, Insn, InsnList, Instruction, Label, Node, Operand, TryCatchBlock};
pub use constants::{Constant, ConstantPool, MethodRef, PoolFull};
pub use descriptor::{DescriptorError, FieldType, MethodDescriptor};
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use frames::{CommonSuperclass, ComputedFrames, FrameComputer, FrameError, MethodContext, RootOnly};
pub use opcode::{Opcode, OperandKind};
pub use unit::{access, ClassUnit, Code, ExceptionHandler, MethodDef, ModuleError, StackMapFrame, VType, ROOT_TYPE};
pub use verify::{verify_method, verify_unit, VerifyError};
