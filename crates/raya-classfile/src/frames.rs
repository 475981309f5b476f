//! Stack-map frame computation
//!
//! After a body has been edited its `max_stack`, `max_locals` and stack-map
//! frames are recomputed by data-flow over the control-flow graph. Whenever
//! two different reference types meet at a merge point the computer asks a
//! [`CommonSuperclass`] implementation for a safe merge type.

use crate::code::{decode_instructions, CodeError, Instruction, Operand};
use crate::constants::{Constant, ConstantPool};
use crate::descriptor::{DescriptorError, FieldType, MethodDescriptor};
use crate::opcode::Opcode;
use crate::unit::{Code, StackMapFrame, VType, ROOT_TYPE};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use thiserror::Error;

/// Type of a caught throwable when the handler catches everything
pub const THROWABLE_TYPE: &str = "raya/lang/Throwable";

/// Type pushed by string constants
pub const STRING_TYPE: &str = "raya/lang/String";

/// Type pushed by class constants
pub const CLASS_TYPE: &str = "raya/lang/Class";

/// Frame computation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The body could not be decoded
    #[error(transparent)]
    Code(#[from] CodeError),

    /// A descriptor in the method or a referenced method is malformed
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// Pop from an empty stack
    #[error("Stack underflow at offset {0}")]
    StackUnderflow(u32),

    /// Value of the wrong kind on the stack or in a local
    #[error("Type mismatch at offset {offset}: expected {expected}, found {found:?}")]
    TypeMismatch {
        /// Offset of the instruction
        offset: u32,
        /// Expected kind
        expected: &'static str,
        /// Value found
        found: VType,
    },

    /// Two paths reach an instruction with different stack heights
    #[error("Stack height mismatch at offset {offset}: {left} vs {right}")]
    StackHeightMismatch {
        /// Merge point
        offset: u32,
        /// Height already recorded
        left: usize,
        /// Incoming height
        right: usize,
    },

    /// Two paths reach an instruction with incompatible stack entries
    #[error("Incompatible stack entries at offset {offset}: {left:?} vs {right:?}")]
    IncompatibleStack {
        /// Merge point
        offset: u32,
        /// Entry already recorded
        left: VType,
        /// Incoming entry
        right: VType,
    },

    /// Constant pool index missing or of the wrong tag
    #[error("Bad constant reference #{index} at offset {offset}")]
    BadConstant {
        /// Offset of the instruction
        offset: u32,
        /// Pool index
        index: u16,
    },

    /// Control flows past the last instruction
    #[error("Execution falls off the end of the body after offset {0}")]
    FallOffEnd(u32),
}

/// Computes a common ancestor of two reference types
///
/// Both arguments are internal names, distinct, and neither is the root
/// type. The result must be a type both are assignable to.
pub trait CommonSuperclass {
    /// Common ancestor of `a` and `b` in internal form
    fn common_superclass(&self, a: &str, b: &str) -> String;
}

/// Merges everything to the root type
#[derive(Debug, Clone, Copy, Default)]
pub struct RootOnly;

impl CommonSuperclass for RootOnly {
    fn common_superclass(&self, _a: &str, _b: &str) -> String {
        ROOT_TYPE.to_string()
    }
}

/// Method facts needed to seed the entry frame
#[derive(Debug, Clone, Copy)]
pub struct MethodContext<'a> {
    /// Internal name of the declaring type
    pub owner: &'a str,
    /// Method descriptor
    pub descriptor: &'a str,
    /// Whether the method has no receiver
    pub is_static: bool,
    /// Constant pool of the declaring unit
    pub pool: &'a ConstantPool,
}

/// Result of frame computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedFrames {
    /// Maximum stack depth in slots
    pub max_stack: u16,
    /// Number of local slots
    pub max_locals: u16,
    /// Frames at merge points, ordered by offset
    pub frames: Vec<StackMapFrame>,
}

#[derive(Debug, Clone, PartialEq)]
struct State {
    locals: Vec<VType>,
    stack: Vec<VType>,
}

/// Data-flow frame computer
pub struct FrameComputer<'h> {
    hierarchy: &'h dyn CommonSuperclass,
}

impl<'h> FrameComputer<'h> {
    /// Create a computer that resolves merges through `hierarchy`
    pub fn new(hierarchy: &'h dyn CommonSuperclass) -> Self {
        Self { hierarchy }
    }

    /// Recompute and store frames, `max_stack` and `max_locals` on `code`
    pub fn apply(&self, ctx: &MethodContext<'_>, code: &mut Code) -> Result<(), FrameError> {
        let computed = self.compute(ctx, code)?;
        code.max_stack = computed.max_stack;
        code.max_locals = computed.max_locals;
        code.frames = computed.frames;
        Ok(())
    }

    /// Compute frames for `code` without modifying it
    pub fn compute(&self, ctx: &MethodContext<'_>, code: &Code) -> Result<ComputedFrames, FrameError> {
        let insns = decode_instructions(&code.bytes)?;
        let descriptor = MethodDescriptor::parse(ctx.descriptor)?;

        let mut entry = Vec::new();
        if !ctx.is_static {
            entry.push(VType::Object(ctx.owner.to_string()));
        }
        for param in &descriptor.params {
            push_slots(&mut entry, vtype_of(param));
        }
        let mut max_locals = entry.len().max(code.max_locals as usize);
        let mut max_stack = 0usize;

        if insns.is_empty() {
            return Ok(ComputedFrames {
                max_stack: 0,
                max_locals: max_locals as u16,
                frames: Vec::new(),
            });
        }

        let index_of: FxHashMap<u32, usize> = insns
            .iter()
            .enumerate()
            .map(|(idx, insn)| (insn.offset, idx))
            .collect();
        let target_index = |insn: &Instruction, target: u32| {
            index_of
                .get(&target)
                .copied()
                .ok_or(CodeError::InvalidBranchTarget {
                    offset: insn.offset,
                    target: target as i64,
                })
        };

        let mut handlers = Vec::with_capacity(code.handlers.len());
        for h in &code.handlers {
            let handler_idx = index_of.get(&h.handler).copied().ok_or(CodeError::InvalidHandlerRange {
                start: h.start,
                end: h.end,
                handler: h.handler,
            })?;
            let caught = match h.catch_type {
                None => THROWABLE_TYPE.to_string(),
                Some(idx) => ctx
                    .pool
                    .get_class(idx)
                    .ok_or(FrameError::BadConstant {
                        offset: h.handler,
                        index: idx,
                    })?
                    .to_string(),
            };
            handlers.push((h.start, h.end, handler_idx, caught));
        }

        let mut frame_points = BTreeSet::new();
        for (idx, insn) in insns.iter().enumerate() {
            if let Operand::Branch(target) = insn.operand {
                frame_points.insert(target_index(insn, target)?);
            }
            if insn.opcode.is_terminator() && idx + 1 < insns.len() {
                frame_points.insert(idx + 1);
            }
        }
        for (_, _, handler_idx, _) in &handlers {
            frame_points.insert(*handler_idx);
        }

        let mut states: Vec<Option<State>> = vec![None; insns.len()];
        states[0] = Some(State {
            locals: entry,
            stack: Vec::new(),
        });
        let mut worklist = vec![0usize];

        while let Some(idx) = worklist.pop() {
            let Some(input) = states[idx].clone() else {
                continue;
            };
            let insn = &insns[idx];
            let mut state = input.clone();
            self.execute(ctx, insn, &mut state)?;
            max_stack = max_stack.max(state.stack.len()).max(input.stack.len());
            max_locals = max_locals.max(state.locals.len());

            for (start, end, handler_idx, caught) in &handlers {
                if insn.offset >= *start && insn.offset < *end {
                    for locals in [&input.locals, &state.locals] {
                        let incoming = State {
                            locals: locals.clone(),
                            stack: vec![VType::Object(caught.clone())],
                        };
                        max_stack = max_stack.max(1);
                        self.flow(&insns, &mut states, &mut worklist, *handler_idx, incoming)?;
                    }
                }
            }

            if let Operand::Branch(target) = insn.operand {
                let to = target_index(insn, target)?;
                self.flow(&insns, &mut states, &mut worklist, to, state.clone())?;
            }
            if !insn.opcode.is_terminator() {
                if idx + 1 >= insns.len() {
                    return Err(FrameError::FallOffEnd(insn.offset));
                }
                self.flow(&insns, &mut states, &mut worklist, idx + 1, state)?;
            }
        }

        let frames = frame_points
            .into_iter()
            .filter_map(|idx| {
                states[idx].as_ref().map(|s| StackMapFrame {
                    offset: insns[idx].offset,
                    locals: s.locals.clone(),
                    stack: s.stack.clone(),
                })
            })
            .collect();

        Ok(ComputedFrames {
            max_stack: max_stack as u16,
            max_locals: max_locals as u16,
            frames,
        })
    }

    fn flow(
        &self,
        insns: &[Instruction],
        states: &mut [Option<State>],
        worklist: &mut Vec<usize>,
        to: usize,
        incoming: State,
    ) -> Result<(), FrameError> {
        let offset = insns[to].offset;
        match &states[to] {
            None => {
                states[to] = Some(incoming);
                worklist.push(to);
            }
            Some(existing) => {
                let merged = self.merge(offset, existing, &incoming)?;
                if &merged != existing {
                    states[to] = Some(merged);
                    worklist.push(to);
                }
            }
        }
        Ok(())
    }

    fn merge(&self, offset: u32, a: &State, b: &State) -> Result<State, FrameError> {
        if a.stack.len() != b.stack.len() {
            return Err(FrameError::StackHeightMismatch {
                offset,
                left: a.stack.len(),
                right: b.stack.len(),
            });
        }
        let mut stack = Vec::with_capacity(a.stack.len());
        for (x, y) in a.stack.iter().zip(&b.stack) {
            let merged = self.merge_value(x, y).ok_or_else(|| FrameError::IncompatibleStack {
                offset,
                left: x.clone(),
                right: y.clone(),
            })?;
            stack.push(merged);
        }

        let len = a.locals.len().max(b.locals.len());
        let mut locals = Vec::with_capacity(len);
        for i in 0..len {
            let x = a.locals.get(i).unwrap_or(&VType::Top);
            let y = b.locals.get(i).unwrap_or(&VType::Top);
            locals.push(self.merge_value(x, y).unwrap_or(VType::Top));
        }
        // A wide value whose second half was lost is unusable.
        for i in 0..len {
            if locals[i].is_wide() && locals.get(i + 1) != Some(&VType::Top) {
                locals[i] = VType::Top;
            }
        }
        Ok(State { locals, stack })
    }

    fn merge_value(&self, a: &VType, b: &VType) -> Option<VType> {
        if a == b {
            return Some(a.clone());
        }
        match (a, b) {
            (VType::Null, r @ VType::Object(_)) | (r @ VType::Object(_), VType::Null) => Some(r.clone()),
            (VType::Object(x), VType::Object(y)) => {
                if x == ROOT_TYPE || y == ROOT_TYPE {
                    Some(VType::Object(ROOT_TYPE.to_string()))
                } else {
                    Some(VType::Object(self.hierarchy.common_superclass(x, y)))
                }
            }
            _ => None,
        }
    }

    fn execute(&self, ctx: &MethodContext<'_>, insn: &Instruction, state: &mut State) -> Result<(), FrameError> {
        use Opcode::*;
        let at = insn.offset;
        let stack = &mut state.stack;
        match insn.opcode {
            Nop | Goto | Return => {}
            AConstNull => stack.push(VType::Null),
            IConst => stack.push(VType::Integer),
            FConst => stack.push(VType::Float),
            LConst => push_slots(stack, VType::Long),
            DConst => push_slots(stack, VType::Double),
            Ldc => {
                let index = const_index(insn);
                let value = match ctx.pool.get(index) {
                    Some(Constant::Str(_)) => VType::Object(STRING_TYPE.to_string()),
                    Some(Constant::Class(_)) => VType::Object(CLASS_TYPE.to_string()),
                    Some(Constant::Int(_)) => VType::Integer,
                    Some(Constant::Float(_)) => VType::Float,
                    Some(Constant::Long(_)) => VType::Long,
                    Some(Constant::Double(_)) => VType::Double,
                    Some(Constant::Method(_)) | None => {
                        return Err(FrameError::BadConstant { offset: at, index })
                    }
                };
                push_slots(stack, value);
            }
            ILoad | FLoad | LLoad | DLoad | ALoad => {
                let slot = local_index(insn);
                let value = state.locals.get(slot).cloned().unwrap_or(VType::Top);
                let ok = match insn.opcode {
                    ILoad => value == VType::Integer,
                    FLoad => value == VType::Float,
                    LLoad => value == VType::Long,
                    DLoad => value == VType::Double,
                    _ => value.is_reference(),
                };
                if !ok {
                    return Err(FrameError::TypeMismatch {
                        offset: at,
                        expected: load_store_kind(insn.opcode),
                        found: value,
                    });
                }
                push_slots(stack, value);
            }
            IStore | FStore | LStore | DStore | AStore => {
                let expected = load_store_kind(insn.opcode);
                let value = match insn.opcode {
                    IStore => pop_exact(stack, at, VType::Integer)?,
                    FStore => pop_exact(stack, at, VType::Float)?,
                    LStore => pop_exact(stack, at, VType::Long)?,
                    DStore => pop_exact(stack, at, VType::Double)?,
                    _ => pop_reference(stack, at, expected)?,
                };
                store_local(&mut state.locals, local_index(insn), value);
            }
            Pop => {
                pop_narrow(stack, at)?;
            }
            Pop2 => {
                pop_any(stack, at)?;
                pop_any(stack, at)?;
            }
            Dup => {
                let v = pop_narrow(stack, at)?;
                stack.push(v.clone());
                stack.push(v);
            }
            Dup2 => {
                let len = stack.len();
                if len < 2 {
                    return Err(FrameError::StackUnderflow(at));
                }
                let pair = stack[len - 2..].to_vec();
                stack.extend(pair);
            }
            Swap => {
                let a = pop_narrow(stack, at)?;
                let b = pop_narrow(stack, at)?;
                stack.push(a);
                stack.push(b);
            }
            IAdd | ISub | IMul | IDiv => {
                pop_exact(stack, at, VType::Integer)?;
                pop_exact(stack, at, VType::Integer)?;
                stack.push(VType::Integer);
            }
            LAdd | LSub | LMul => {
                pop_exact(stack, at, VType::Long)?;
                pop_exact(stack, at, VType::Long)?;
                push_slots(stack, VType::Long);
            }
            FAdd | FMul => {
                pop_exact(stack, at, VType::Float)?;
                pop_exact(stack, at, VType::Float)?;
                stack.push(VType::Float);
            }
            DAdd | DMul => {
                pop_exact(stack, at, VType::Double)?;
                pop_exact(stack, at, VType::Double)?;
                push_slots(stack, VType::Double);
            }
            I2L => {
                pop_exact(stack, at, VType::Integer)?;
                push_slots(stack, VType::Long);
            }
            L2I => {
                pop_exact(stack, at, VType::Long)?;
                stack.push(VType::Integer);
            }
            I2D => {
                pop_exact(stack, at, VType::Integer)?;
                push_slots(stack, VType::Double);
            }
            IfEq | IfNe | IfLt | IfGe | IfGt | IfLe => {
                pop_exact(stack, at, VType::Integer)?;
            }
            IfICmpEq | IfICmpNe | IfICmpLt | IfICmpGe => {
                pop_exact(stack, at, VType::Integer)?;
                pop_exact(stack, at, VType::Integer)?;
            }
            IfNull | IfNonNull => {
                pop_reference(stack, at, "reference")?;
            }
            InvokeVirtual | InvokeSpecial | InvokeStatic | InvokeInterface => {
                let index = const_index(insn);
                let method = ctx
                    .pool
                    .get_method(index)
                    .ok_or(FrameError::BadConstant { offset: at, index })?;
                let desc = MethodDescriptor::parse(&method.descriptor)?;
                for param in desc.params.iter().rev() {
                    pop_field(stack, at, param)?;
                }
                if insn.opcode != InvokeStatic {
                    pop_reference(stack, at, "receiver")?;
                }
                if let Some(ret) = &desc.ret {
                    push_slots(stack, vtype_of(ret));
                }
            }
            New | CheckCast => {
                let index = const_index(insn);
                let class = ctx
                    .pool
                    .get_class(index)
                    .ok_or(FrameError::BadConstant { offset: at, index })?;
                if insn.opcode == CheckCast {
                    pop_reference(stack, at, "reference")?;
                }
                stack.push(VType::Object(class.to_string()));
            }
            InstanceOf => {
                pop_reference(stack, at, "reference")?;
                stack.push(VType::Integer);
            }
            IReturn => {
                pop_exact(stack, at, VType::Integer)?;
            }
            FReturn => {
                pop_exact(stack, at, VType::Float)?;
            }
            LReturn => {
                pop_exact(stack, at, VType::Long)?;
            }
            DReturn => {
                pop_exact(stack, at, VType::Double)?;
            }
            AReturn | AThrow => {
                pop_reference(stack, at, "reference")?;
            }
        }
        Ok(())
    }
}

/// Verification type of a descriptor type
pub fn vtype_of(ty: &FieldType) -> VType {
    match ty {
        FieldType::Int | FieldType::Boolean | FieldType::Byte | FieldType::Char | FieldType::Short => {
            VType::Integer
        }
        FieldType::Long => VType::Long,
        FieldType::Float => VType::Float,
        FieldType::Double => VType::Double,
        FieldType::Object(name) => VType::Object(name.clone()),
        array @ FieldType::Array(_) => VType::Object(array.to_string()),
    }
}

fn push_slots(slots: &mut Vec<VType>, value: VType) {
    let wide = value.is_wide();
    slots.push(value);
    if wide {
        slots.push(VType::Top);
    }
}

fn store_local(locals: &mut Vec<VType>, slot: usize, value: VType) {
    let width = if value.is_wide() { 2 } else { 1 };
    if locals.len() < slot + width {
        locals.resize(slot + width, VType::Top);
    }
    if slot > 0 && locals[slot - 1].is_wide() {
        locals[slot - 1] = VType::Top;
    }
    if locals.get(slot).map_or(false, VType::is_wide) && width == 1 {
        if let Some(next) = locals.get_mut(slot + 1) {
            *next = VType::Top;
        }
    }
    locals[slot] = value;
    if width == 2 {
        locals[slot + 1] = VType::Top;
    }
}

fn pop_any(stack: &mut Vec<VType>, at: u32) -> Result<VType, FrameError> {
    stack.pop().ok_or(FrameError::StackUnderflow(at))
}

/// Pop a value occupying a single slot.
fn pop_narrow(stack: &mut Vec<VType>, at: u32) -> Result<VType, FrameError> {
    let v = pop_any(stack, at)?;
    if v == VType::Top || v.is_wide() {
        return Err(FrameError::TypeMismatch {
            offset: at,
            expected: "single-slot value",
            found: v,
        });
    }
    Ok(v)
}

fn pop_exact(stack: &mut Vec<VType>, at: u32, expected: VType) -> Result<VType, FrameError> {
    let label = match expected {
        VType::Integer => "int",
        VType::Float => "float",
        VType::Long => "long",
        VType::Double => "double",
        _ => "value",
    };
    if expected.is_wide() {
        let high = pop_any(stack, at)?;
        if high != VType::Top {
            return Err(FrameError::TypeMismatch {
                offset: at,
                expected: label,
                found: high,
            });
        }
    }
    let v = pop_any(stack, at)?;
    if v != expected {
        return Err(FrameError::TypeMismatch {
            offset: at,
            expected: label,
            found: v,
        });
    }
    Ok(v)
}

fn pop_reference(stack: &mut Vec<VType>, at: u32, expected: &'static str) -> Result<VType, FrameError> {
    let v = pop_any(stack, at)?;
    if !v.is_reference() {
        return Err(FrameError::TypeMismatch {
            offset: at,
            expected,
            found: v,
        });
    }
    Ok(v)
}

fn pop_field(stack: &mut Vec<VType>, at: u32, ty: &FieldType) -> Result<VType, FrameError> {
    match vtype_of(ty) {
        VType::Object(_) => pop_reference(stack, at, "reference argument"),
        primitive => pop_exact(stack, at, primitive),
    }
}

fn local_index(insn: &Instruction) -> usize {
    match insn.operand {
        Operand::Local(slot) => slot as usize,
        _ => 0,
    }
}

fn const_index(insn: &Instruction) -> u16 {
    match insn.operand {
        Operand::Const(idx) => idx,
        _ => 0,
    }
}

fn load_store_kind(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::ILoad | Opcode::IStore => "int local",
        Opcode::FLoad | Opcode::FStore => "float local",
        Opcode::LLoad | Opcode::LStore => "long local",
        Opcode::DLoad | Opcode::DStore => "double local",
        _ => "reference local",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::BytecodeWriter;
    use crate::unit::ExceptionHandler;
    use std::cell::RefCell;

    struct Recording {
        calls: RefCell<Vec<(String, String)>>,
        answer: &'static str,
    }

    impl CommonSuperclass for Recording {
        fn common_superclass(&self, a: &str, b: &str) -> String {
            self.calls.borrow_mut().push((a.to_string(), b.to_string()));
            self.answer.to_string()
        }
    }

    fn code(bytes: Vec<u8>) -> Code {
        Code {
            bytes,
            ..Code::default()
        }
    }

    #[test]
    fn test_straight_line_maxima() {
        // lload 0; lload 0; ladd; lreturn
        let mut w = BytecodeWriter::new();
        w.emit_u8(Opcode::LLoad as u8);
        w.emit_u16(0);
        w.emit_u8(Opcode::LLoad as u8);
        w.emit_u16(0);
        w.emit_u8(Opcode::LAdd as u8);
        w.emit_u8(Opcode::LReturn as u8);

        let pool = ConstantPool::new();
        let ctx = MethodContext {
            owner: "a/B",
            descriptor: "(J)J",
            is_static: true,
            pool: &pool,
        };
        let computed = FrameComputer::new(&RootOnly)
            .compute(&ctx, &code(w.into_bytes()))
            .unwrap();
        assert_eq!(computed.max_stack, 4);
        assert_eq!(computed.max_locals, 2);
        assert!(computed.frames.is_empty());
    }

    /// aload 1; ifnull else; new A; goto join; else: new B; join: areturn
    fn diamond(pool: &mut ConstantPool) -> Code {
        let a = pool.add_class("org/x/A").unwrap();
        let b = pool.add_class("org/x/B").unwrap();
        let mut w = BytecodeWriter::new();
        w.emit_u8(Opcode::ALoad as u8); // 0
        w.emit_u16(1);
        w.emit_u8(Opcode::IfNull as u8); // 3
        w.emit_i32(13);
        w.emit_u8(Opcode::New as u8); // 8
        w.emit_u16(a);
        w.emit_u8(Opcode::Goto as u8); // 11
        w.emit_i32(8);
        w.emit_u8(Opcode::New as u8); // 16
        w.emit_u16(b);
        w.emit_u8(Opcode::AReturn as u8); // 19
        code(w.into_bytes())
    }

    #[test]
    fn test_reference_merge_uses_hierarchy() {
        let mut pool = ConstantPool::new();
        let body = diamond(&mut pool);
        let ctx = MethodContext {
            owner: "org/x/Owner",
            descriptor: "(Lraya/lang/Object;)Lorg/x/Base;",
            is_static: false,
            pool: &pool,
        };
        let hierarchy = Recording {
            calls: RefCell::new(Vec::new()),
            answer: "org/x/Base",
        };
        let computed = FrameComputer::new(&hierarchy).compute(&ctx, &body).unwrap();

        assert_eq!(hierarchy.calls.borrow().len(), 1);
        let join = computed.frames.iter().find(|f| f.offset == 19).unwrap();
        assert_eq!(join.stack, vec![VType::Object("org/x/Base".into())]);
        assert_eq!(join.locals[0], VType::Object("org/x/Owner".into()));
        assert_eq!(computed.frames.len(), 2);
    }

    #[test]
    fn test_handler_frame() {
        // nop; return; handler: athrow
        let body = Code {
            bytes: vec![Opcode::Nop as u8, Opcode::Return as u8, Opcode::AThrow as u8],
            handlers: vec![ExceptionHandler {
                start: 0,
                end: 2,
                handler: 2,
                catch_type: None,
            }],
            ..Code::default()
        };
        let pool = ConstantPool::new();
        let ctx = MethodContext {
            owner: "a/B",
            descriptor: "()V",
            is_static: true,
            pool: &pool,
        };
        let computed = FrameComputer::new(&RootOnly).compute(&ctx, &body).unwrap();
        assert_eq!(computed.frames.len(), 1);
        assert_eq!(computed.frames[0].offset, 2);
        assert_eq!(
            computed.frames[0].stack,
            vec![VType::Object(THROWABLE_TYPE.into())]
        );
        assert_eq!(computed.max_stack, 1);
    }

    #[test]
    fn test_stack_height_mismatch() {
        // iload 0; ifeq +8; iconst 1; (fallthrough with 1 on stack) return
        let mut w = BytecodeWriter::new();
        w.emit_u8(Opcode::ILoad as u8); // 0
        w.emit_u16(0);
        w.emit_u8(Opcode::IfEq as u8); // 3
        w.emit_i32(10);
        w.emit_u8(Opcode::IConst as u8); // 8
        w.emit_i32(1);
        w.emit_u8(Opcode::Return as u8); // 13
        let pool = ConstantPool::new();
        let ctx = MethodContext {
            owner: "a/B",
            descriptor: "(I)V",
            is_static: true,
            pool: &pool,
        };
        assert!(matches!(
            FrameComputer::new(&RootOnly).compute(&ctx, &code(w.into_bytes())),
            Err(FrameError::StackHeightMismatch { offset: 13, .. })
        ));
    }

    #[test]
    fn test_fall_off_end() {
        let pool = ConstantPool::new();
        let ctx = MethodContext {
            owner: "a/B",
            descriptor: "()V",
            is_static: true,
            pool: &pool,
        };
        assert_eq!(
            FrameComputer::new(&RootOnly).compute(&ctx, &code(vec![Opcode::Nop as u8])),
            Err(FrameError::FallOffEnd(0))
        );
    }

    #[test]
    fn test_wrong_load_kind() {
        let mut w = BytecodeWriter::new();
        w.emit_u8(Opcode::ILoad as u8);
        w.emit_u16(0);
        w.emit_u8(Opcode::IReturn as u8);
        let pool = ConstantPool::new();
        let ctx = MethodContext {
            owner: "a/B",
            descriptor: "(F)I",
            is_static: true,
            pool: &pool,
        };
        assert!(matches!(
            FrameComputer::new(&RootOnly).compute(&ctx, &code(w.into_bytes())),
            Err(FrameError::TypeMismatch { offset: 0, .. })
        ));
    }

    #[test]
    fn test_store_wide_local_clobbers_neighbour() {
        let mut locals = vec![VType::Long, VType::Top, VType::Integer];
        store_local(&mut locals, 1, VType::Integer);
        assert_eq!(locals, vec![VType::Top, VType::Integer, VType::Integer]);
        store_local(&mut locals, 2, VType::Double);
        assert_eq!(
            locals,
            vec![VType::Top, VType::Integer, VType::Double, VType::Top]
        );
    }
}
