//! Editable method bodies
//!
//! [`InsnList`] turns encoded instructions into a list of instruction and
//! label nodes. Branches and exception ranges refer to labels, so edits that
//! insert or remove instructions never have to patch offsets by hand;
//! [`InsnList::assemble`] resolves labels back into offsets.

use crate::constants::{Constant, ConstantPool};
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::opcode::{Opcode, OperandKind};
use crate::unit::{Code, ExceptionHandler};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Errors raised while decoding, editing or assembling a body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    /// Malformed instruction stream
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Branch target outside the body or not on an instruction boundary
    #[error("Invalid branch target {target} at offset {offset}")]
    InvalidBranchTarget {
        /// Offset of the branch instruction
        offset: u32,
        /// Resolved target offset
        target: i64,
    },

    /// Exception range boundaries do not fall on instruction boundaries
    #[error("Invalid exception range {start}..{end} -> {handler}")]
    InvalidHandlerRange {
        /// Range start
        start: u32,
        /// Range end
        end: u32,
        /// Handler offset
        handler: u32,
    },

    /// A referenced label was never placed in the list
    #[error("Label L{0} is referenced but never placed")]
    UnplacedLabel(u32),

    /// A label was placed more than once
    #[error("Label L{0} is placed more than once")]
    DuplicateLabel(u32),

    /// Opcode combined with an operand of the wrong shape
    #[error("Operand does not match opcode {0:?}")]
    OperandMismatch(Opcode),
}

/// Position marker inside an [`InsnList`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Instruction operand; `T` is the branch target representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand<T = Label> {
    /// No operand
    None,
    /// int literal
    I32(i32),
    /// long literal
    I64(i64),
    /// float literal
    F32(f32),
    /// double literal
    F64(f64),
    /// Local slot
    Local(u16),
    /// Constant pool index
    Const(u16),
    /// Branch target
    Branch(T),
}

impl<T> Operand<T> {
    fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::I32(_) => OperandKind::I32,
            Operand::I64(_) => OperandKind::I64,
            Operand::F32(_) => OperandKind::F32,
            Operand::F64(_) => OperandKind::F64,
            Operand::Local(_) => OperandKind::Local,
            Operand::Const(_) => OperandKind::Const,
            Operand::Branch(_) => OperandKind::Branch,
        }
    }
}

/// Instruction decoded at a fixed offset, with absolute branch targets
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Offset of the opcode byte
    pub offset: u32,
    /// Opcode
    pub opcode: Opcode,
    /// Operand with the branch target as an absolute offset
    pub operand: Operand<u32>,
}

impl Instruction {
    /// Offset just past this instruction
    pub fn next_offset(&self) -> u32 {
        self.offset + self.opcode.encoded_size() as u32
    }
}

/// Decode an encoded body into instructions
///
/// Branch targets are resolved to absolute offsets but not checked against
/// instruction boundaries.
pub fn decode_instructions(bytes: &[u8]) -> Result<Vec<Instruction>, CodeError> {
    let mut reader = BytecodeReader::new(bytes);
    let mut out = Vec::new();
    while reader.has_more() {
        let offset = reader.position();
        let byte = reader.read_u8()?;
        let opcode = Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, offset))?;
        let operand = match opcode.operand_kind() {
            OperandKind::None => Operand::None,
            OperandKind::I32 => Operand::I32(reader.read_i32()?),
            OperandKind::I64 => Operand::I64(reader.read_i64()?),
            OperandKind::F32 => Operand::F32(reader.read_f32()?),
            OperandKind::F64 => Operand::F64(reader.read_f64()?),
            OperandKind::Local => Operand::Local(reader.read_u16()?),
            OperandKind::Const => Operand::Const(reader.read_u16()?),
            OperandKind::Branch => {
                let rel = reader.read_i32()?;
                let target = offset as i64 + rel as i64;
                if target < 0 || target > bytes.len() as i64 {
                    return Err(CodeError::InvalidBranchTarget {
                        offset: offset as u32,
                        target,
                    });
                }
                Operand::Branch(target as u32)
            }
        };
        out.push(Instruction {
            offset: offset as u32,
            opcode,
            operand,
        });
    }
    Ok(out)
}

/// Instruction inside an [`InsnList`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Insn {
    /// Opcode
    pub opcode: Opcode,
    /// Operand, branch targets as labels
    pub operand: Operand,
}

impl Insn {
    /// Instruction without operand
    pub fn op(opcode: Opcode) -> Self {
        Self {
            opcode,
            operand: Operand::None,
        }
    }

    /// Local variable instruction
    pub fn local(opcode: Opcode, slot: u16) -> Self {
        Self {
            opcode,
            operand: Operand::Local(slot),
        }
    }

    /// Constant pool instruction (`Ldc`, invocations, type instructions)
    pub fn constant(opcode: Opcode, index: u16) -> Self {
        Self {
            opcode,
            operand: Operand::Const(index),
        }
    }

    /// `IConst` with the given value
    pub fn int(value: i32) -> Self {
        Self {
            opcode: Opcode::IConst,
            operand: Operand::I32(value),
        }
    }

    /// Branch to `target`
    pub fn jump(opcode: Opcode, target: Label) -> Self {
        Self {
            opcode,
            operand: Operand::Branch(target),
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.mnemonic())?;
        match self.operand {
            Operand::None => Ok(()),
            Operand::I32(v) => write!(f, " {}", v),
            Operand::I64(v) => write!(f, " {}L", v),
            Operand::F32(v) => write!(f, " {}f", v),
            Operand::F64(v) => write!(f, " {}d", v),
            Operand::Local(slot) => write!(f, " {}", slot),
            Operand::Const(idx) => write!(f, " #{}", idx),
            Operand::Branch(label) => write!(f, " {}", label),
        }
    }
}

/// A node of an instruction list
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    /// Label marking the position of the following instruction
    Label(Label),
    /// Instruction
    Insn(Insn),
}

impl From<Insn> for Node {
    fn from(insn: Insn) -> Self {
        Node::Insn(insn)
    }
}

/// Exception range expressed with labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryCatchBlock {
    /// Start of the covered range
    pub start: Label,
    /// End of the covered range (exclusive)
    pub end: Label,
    /// Handler entry
    pub handler: Label,
    /// Caught class pool index, `None` catches everything
    pub catch_type: Option<u16>,
}

/// Assembled body: encoded instructions and exception table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembled {
    /// Encoded instructions
    pub bytes: Vec<u8>,
    /// Exception table in list order
    pub handlers: Vec<ExceptionHandler>,
}

/// Editable list of instructions and labels
#[derive(Debug, Clone, Default)]
pub struct InsnList {
    nodes: Vec<Node>,
    try_catch: Vec<TryCatchBlock>,
    next_label: u32,
}

impl InsnList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a method body into an editable list
    pub fn decode(code: &Code) -> Result<Self, CodeError> {
        let instructions = decode_instructions(&code.bytes)?;
        let end = code.bytes.len() as u32;
        let boundaries: BTreeSet<u32> = instructions
            .iter()
            .map(|i| i.offset)
            .chain(std::iter::once(end))
            .collect();

        let mut targets = BTreeSet::new();
        for insn in &instructions {
            if let Operand::Branch(target) = insn.operand {
                if target == end || !boundaries.contains(&target) {
                    return Err(CodeError::InvalidBranchTarget {
                        offset: insn.offset,
                        target: target as i64,
                    });
                }
                targets.insert(target);
            }
        }
        for h in &code.handlers {
            let valid = h.start < h.end
                && boundaries.contains(&h.start)
                && boundaries.contains(&h.end)
                && h.handler < end
                && boundaries.contains(&h.handler);
            if !valid {
                return Err(CodeError::InvalidHandlerRange {
                    start: h.start,
                    end: h.end,
                    handler: h.handler,
                });
            }
            targets.insert(h.start);
            targets.insert(h.end);
            targets.insert(h.handler);
        }

        let mut list = InsnList::new();
        let labels: FxHashMap<u32, Label> = targets
            .iter()
            .map(|&offset| (offset, list.new_label()))
            .collect();

        for insn in &instructions {
            if let Some(&label) = labels.get(&insn.offset) {
                list.nodes.push(Node::Label(label));
            }
            let operand = match insn.operand {
                Operand::None => Operand::None,
                Operand::I32(v) => Operand::I32(v),
                Operand::I64(v) => Operand::I64(v),
                Operand::F32(v) => Operand::F32(v),
                Operand::F64(v) => Operand::F64(v),
                Operand::Local(s) => Operand::Local(s),
                Operand::Const(c) => Operand::Const(c),
                Operand::Branch(target) => Operand::Branch(labels[&target]),
            };
            list.nodes.push(Node::Insn(Insn {
                opcode: insn.opcode,
                operand,
            }));
        }
        if let Some(&label) = labels.get(&end) {
            list.nodes.push(Node::Label(label));
        }

        list.try_catch = code
            .handlers
            .iter()
            .map(|h| TryCatchBlock {
                start: labels[&h.start],
                end: labels[&h.end],
                handler: labels[&h.handler],
                catch_type: h.catch_type,
            })
            .collect();
        Ok(list)
    }

    /// Allocate a fresh label (not yet placed)
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// All nodes in order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the list has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Exception ranges in precedence order
    pub fn try_catch_blocks(&self) -> &[TryCatchBlock] {
        &self.try_catch
    }

    /// Iterate over instructions, skipping labels
    pub fn insns(&self) -> impl Iterator<Item = &Insn> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Insn(i) => Some(i),
            Node::Label(_) => None,
        })
    }

    /// Node indices of instructions satisfying `pred`
    pub fn positions(&self, mut pred: impl FnMut(&Insn) -> bool) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(idx, n)| match n {
                Node::Insn(i) if pred(i) => Some(idx),
                _ => None,
            })
            .collect()
    }

    /// Append a node
    pub fn push(&mut self, node: impl Into<Node>) {
        self.nodes.push(node.into());
    }

    /// Insert nodes so that the first inserted node lands at `index`
    pub fn insert(&mut self, index: usize, nodes: impl IntoIterator<Item = Node>) {
        let tail = self.nodes.split_off(index);
        self.nodes.extend(nodes);
        self.nodes.extend(tail);
    }

    /// Append an exception range; it takes lowest precedence
    pub fn add_try_catch(&mut self, block: TryCatchBlock) {
        self.try_catch.push(block);
    }

    /// Encode the list, resolving labels to offsets
    pub fn assemble(&self) -> Result<Assembled, CodeError> {
        let mut positions: FxHashMap<Label, u32> = FxHashMap::default();
        let mut offset = 0u32;
        for node in &self.nodes {
            match node {
                Node::Label(label) => {
                    if positions.insert(*label, offset).is_some() {
                        return Err(CodeError::DuplicateLabel(label.0));
                    }
                }
                Node::Insn(insn) => {
                    if insn.operand.kind() != insn.opcode.operand_kind() {
                        return Err(CodeError::OperandMismatch(insn.opcode));
                    }
                    offset += insn.opcode.encoded_size() as u32;
                }
            }
        }
        let resolve = |label: Label| {
            positions
                .get(&label)
                .copied()
                .ok_or(CodeError::UnplacedLabel(label.0))
        };

        let mut writer = BytecodeWriter::with_capacity(offset as usize);
        for node in &self.nodes {
            let Node::Insn(insn) = node else { continue };
            let start = writer.offset() as i64;
            writer.emit_u8(insn.opcode.to_u8());
            match insn.operand {
                Operand::None => {}
                Operand::I32(v) => writer.emit_i32(v),
                Operand::I64(v) => writer.emit_i64(v),
                Operand::F32(v) => writer.emit_f32(v),
                Operand::F64(v) => writer.emit_f64(v),
                Operand::Local(s) => writer.emit_u16(s),
                Operand::Const(c) => writer.emit_u16(c),
                Operand::Branch(label) => {
                    let target = resolve(label)? as i64;
                    writer.emit_i32((target - start) as i32);
                }
            }
        }

        let handlers = self
            .try_catch
            .iter()
            .map(|b| {
                Ok(ExceptionHandler {
                    start: resolve(b.start)?,
                    end: resolve(b.end)?,
                    handler: resolve(b.handler)?,
                    catch_type: b.catch_type,
                })
            })
            .collect::<Result<Vec<_>, CodeError>>()?;

        Ok(Assembled {
            bytes: writer.into_bytes(),
            handlers,
        })
    }
}

impl fmt::Display for InsnList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            match node {
                Node::Label(label) => writeln!(f, "{}:", label)?,
                Node::Insn(insn) => writeln!(f, "    {}", insn)?,
            }
        }
        for b in &self.try_catch {
            writeln!(
                f,
                "    try {} .. {} catch {} -> {}",
                b.start,
                b.end,
                b.catch_type.map_or("*".to_string(), |c| format!("#{}", c)),
                b.handler
            )?;
        }
        Ok(())
    }
}

/// Render a body as text, resolving constant pool references
pub fn disassemble(code: &Code, pool: &ConstantPool) -> Result<String, CodeError> {
    let mut out = String::new();
    for insn in decode_instructions(&code.bytes)? {
        let operand = match insn.operand {
            Operand::None => String::new(),
            Operand::I32(v) => format!(" {}", v),
            Operand::I64(v) => format!(" {}L", v),
            Operand::F32(v) => format!(" {}f", v),
            Operand::F64(v) => format!(" {}d", v),
            Operand::Local(s) => format!(" {}", s),
            Operand::Branch(t) => format!(" @{}", t),
            Operand::Const(idx) => match pool.get(idx) {
                Some(Constant::Str(s)) => format!(" {:?}", s),
                Some(Constant::Int(v)) => format!(" {}", v),
                Some(Constant::Long(v)) => format!(" {}L", v),
                Some(Constant::Float(v)) => format!(" {}f", v),
                Some(Constant::Double(v)) => format!(" {}d", v),
                Some(Constant::Class(c)) => format!(" {}", c),
                Some(Constant::Method(m)) => format!(" {}.{}{}", m.owner, m.name, m.descriptor),
                None => format!(" #{}?", idx),
            },
        };
        out.push_str(&format!("{:>6}: {}{}\n", insn.offset, insn.opcode.mnemonic(), operand));
    }
    for h in &code.handlers {
        let catch = h
            .catch_type
            .and_then(|idx| pool.get_class(idx))
            .unwrap_or("*");
        out.push_str(&format!(
            "  handler [{}, {}) -> {} catch {}\n",
            h.start, h.end, h.handler, catch
        ));
    }
    for frame in &code.frames {
        out.push_str(&format!(
            "  frame @{} locals={:?} stack={:?}\n",
            frame.offset, frame.locals, frame.stack
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(bytes: Vec<u8>, handlers: Vec<ExceptionHandler>) -> Code {
        Code {
            max_stack: 2,
            max_locals: 2,
            bytes,
            handlers,
            frames: vec![],
        }
    }

    /// iload 0; ifeq +9; iconst 1; ireturn; iconst 0; ireturn
    fn branchy() -> Code {
        let mut w = BytecodeWriter::new();
        w.emit_u8(Opcode::ILoad as u8);
        w.emit_u16(0);
        w.emit_u8(Opcode::IfEq as u8);
        w.emit_i32(11);
        w.emit_u8(Opcode::IConst as u8);
        w.emit_i32(1);
        w.emit_u8(Opcode::IReturn as u8);
        w.emit_u8(Opcode::IConst as u8);
        w.emit_i32(0);
        w.emit_u8(Opcode::IReturn as u8);
        body(w.into_bytes(), vec![])
    }

    #[test]
    fn test_decode_places_labels() {
        let list = InsnList::decode(&branchy()).unwrap();
        assert_eq!(list.insns().count(), 6);
        let labels = list
            .nodes()
            .iter()
            .filter(|n| matches!(n, Node::Label(_)))
            .count();
        assert_eq!(labels, 1);
        assert!(matches!(list.nodes()[4], Node::Label(_)));
    }

    #[test]
    fn test_assemble_unchanged_is_identity() {
        let code = branchy();
        let list = InsnList::decode(&code).unwrap();
        let assembled = list.assemble().unwrap();
        assert_eq!(assembled.bytes, code.bytes);
    }

    #[test]
    fn test_insert_shifts_branches() {
        let code = branchy();
        let mut list = InsnList::decode(&code).unwrap();
        let returns = list.positions(|i| i.opcode.is_return());
        assert_eq!(returns.len(), 2);
        for idx in returns.into_iter().rev() {
            list.insert(idx, [Node::Insn(Insn::op(Opcode::Nop))]);
        }
        let assembled = list.assemble().unwrap();
        assert_eq!(assembled.bytes.len(), code.bytes.len() + 2);

        let decoded = decode_instructions(&assembled.bytes).unwrap();
        let Operand::Branch(target) = decoded[1].operand else {
            panic!("expected branch");
        };
        let landing = decoded.iter().find(|i| i.offset == target).unwrap();
        assert_eq!(landing.opcode, Opcode::IConst);
        assert_eq!(landing.operand, Operand::I32(0));
    }

    #[test]
    fn test_try_catch_roundtrip() {
        let bytes = vec![Opcode::Nop as u8, Opcode::Return as u8, Opcode::AThrow as u8];
        let handlers = vec![ExceptionHandler {
            start: 0,
            end: 2,
            handler: 2,
            catch_type: None,
        }];
        let list = InsnList::decode(&body(bytes.clone(), handlers.clone())).unwrap();
        assert_eq!(list.try_catch_blocks().len(), 1);
        let assembled = list.assemble().unwrap();
        assert_eq!(assembled.bytes, bytes);
        assert_eq!(assembled.handlers, handlers);
    }

    #[test]
    fn test_invalid_branch_target() {
        // goto into the middle of its own operand
        let bytes = vec![Opcode::Goto as u8, 2, 0, 0, 0, Opcode::Return as u8];
        assert!(matches!(
            InsnList::decode(&body(bytes, vec![])),
            Err(CodeError::InvalidBranchTarget { offset: 0, target: 2 })
        ));
    }

    #[test]
    fn test_invalid_handler_range() {
        let bytes = vec![Opcode::Nop as u8, Opcode::Return as u8];
        let handlers = vec![ExceptionHandler {
            start: 1,
            end: 1,
            handler: 0,
            catch_type: None,
        }];
        assert!(matches!(
            InsnList::decode(&body(bytes, handlers)),
            Err(CodeError::InvalidHandlerRange { .. })
        ));
    }

    #[test]
    fn test_unplaced_label() {
        let mut list = InsnList::new();
        let label = list.new_label();
        list.push(Insn::jump(Opcode::Goto, label));
        assert_eq!(list.assemble(), Err(CodeError::UnplacedLabel(label.0)));
    }

    #[test]
    fn test_operand_mismatch() {
        let mut list = InsnList::new();
        list.push(Insn::op(Opcode::ALoad));
        assert_eq!(
            list.assemble(),
            Err(CodeError::OperandMismatch(Opcode::ALoad))
        );
    }

    #[test]
    fn test_disassemble() {
        let mut pool = ConstantPool::new();
        let idx = pool.add_string("svc.calls").unwrap();
        let bytes = vec![Opcode::Ldc as u8, idx as u8, 0, Opcode::Pop as u8, Opcode::Return as u8];
        let text = disassemble(&body(bytes, vec![]), &pool).unwrap();
        assert!(text.contains("ldc \"svc.calls\""));
        assert!(text.contains("return"));
    }
}
