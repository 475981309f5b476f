//! Instruction set of class-unit method bodies
//!
//! Every instruction is a single opcode byte followed by a fixed-size
//! operand whose shape is given by [`OperandKind`].
//!
//! Opcodes are organized into categories:
//! - 0x00-0x0F: Constants
//! - 0x10-0x1F: Local variables
//! - 0x20-0x2F: Stack manipulation
//! - 0x30-0x3F: Arithmetic & conversions
//! - 0x40-0x4F: Branches
//! - 0x50-0x5F: Invocations & objects
//! - 0x60-0x6F: Returns & throw

/// Operand encoding following an opcode byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand
    None,
    /// 32-bit signed integer literal
    I32,
    /// 64-bit signed integer literal
    I64,
    /// 32-bit float literal
    F32,
    /// 64-bit float literal
    F64,
    /// u16 local variable slot
    Local,
    /// u16 constant pool index
    Const,
    /// i32 branch offset, relative to the branch instruction
    Branch,
}

impl OperandKind {
    /// Encoded operand size in bytes
    pub fn size(self) -> usize {
        match self {
            OperandKind::None => 0,
            OperandKind::Local | OperandKind::Const => 2,
            OperandKind::I32 | OperandKind::F32 | OperandKind::Branch => 4,
            OperandKind::I64 | OperandKind::F64 => 8,
        }
    }
}

/// Bytecode opcode enumeration
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Constants (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Push null reference
    AConstNull = 0x01,
    /// Push int literal (operand: i32)
    IConst = 0x02,
    /// Push long literal (operand: i64)
    LConst = 0x03,
    /// Push float literal (operand: f32)
    FConst = 0x04,
    /// Push double literal (operand: f64)
    DConst = 0x05,
    /// Push constant from the pool (operand: u16 index)
    Ldc = 0x06,

    // ===== Local Variables (0x10-0x1F) =====
    /// Load int local (operand: u16 slot)
    ILoad = 0x10,
    /// Load long local
    LLoad = 0x11,
    /// Load float local
    FLoad = 0x12,
    /// Load double local
    DLoad = 0x13,
    /// Load reference local
    ALoad = 0x14,
    /// Store int local (operand: u16 slot)
    IStore = 0x18,
    /// Store long local
    LStore = 0x19,
    /// Store float local
    FStore = 0x1A,
    /// Store double local
    DStore = 0x1B,
    /// Store reference local
    AStore = 0x1C,

    // ===== Stack Manipulation (0x20-0x2F) =====
    /// Pop one category-1 value
    Pop = 0x20,
    /// Pop two slots (one wide value or two narrow ones)
    Pop2 = 0x21,
    /// Duplicate top category-1 value
    Dup = 0x22,
    /// Duplicate top two slots (one wide value or two narrow ones)
    Dup2 = 0x23,
    /// Swap top two category-1 values
    Swap = 0x24,

    // ===== Arithmetic & Conversions (0x30-0x3F) =====
    /// Int addition
    IAdd = 0x30,
    /// Int subtraction
    ISub = 0x31,
    /// Int multiplication
    IMul = 0x32,
    /// Int division
    IDiv = 0x33,
    /// Long addition
    LAdd = 0x34,
    /// Long subtraction
    LSub = 0x35,
    /// Long multiplication
    LMul = 0x36,
    /// Float addition
    FAdd = 0x37,
    /// Float multiplication
    FMul = 0x38,
    /// Double addition
    DAdd = 0x39,
    /// Double multiplication
    DMul = 0x3A,
    /// Int to long
    I2L = 0x3B,
    /// Long to int
    L2I = 0x3C,
    /// Int to double
    I2D = 0x3D,

    // ===== Branches (0x40-0x4F) =====
    /// Branch if int is zero (operand: i32 offset)
    IfEq = 0x40,
    /// Branch if int is non-zero
    IfNe = 0x41,
    /// Branch if int < 0
    IfLt = 0x42,
    /// Branch if int >= 0
    IfGe = 0x43,
    /// Branch if int > 0
    IfGt = 0x44,
    /// Branch if int <= 0
    IfLe = 0x45,
    /// Branch if ints are equal
    IfICmpEq = 0x46,
    /// Branch if ints differ
    IfICmpNe = 0x47,
    /// Branch if a < b
    IfICmpLt = 0x48,
    /// Branch if a >= b
    IfICmpGe = 0x49,
    /// Branch if reference is null
    IfNull = 0x4A,
    /// Branch if reference is not null
    IfNonNull = 0x4B,
    /// Unconditional branch
    Goto = 0x4C,

    // ===== Invocations & Objects (0x50-0x5F) =====
    /// Virtual dispatch (operand: u16 method ref)
    InvokeVirtual = 0x50,
    /// Non-virtual dispatch (constructors, private and super calls)
    InvokeSpecial = 0x51,
    /// Static call
    InvokeStatic = 0x52,
    /// Interface dispatch
    InvokeInterface = 0x53,
    /// Allocate instance (operand: u16 class ref)
    New = 0x58,
    /// Checked reference cast (operand: u16 class ref)
    CheckCast = 0x59,
    /// Type test, pushes int (operand: u16 class ref)
    InstanceOf = 0x5A,

    // ===== Returns & Throw (0x60-0x6F) =====
    /// Return int-category value
    IReturn = 0x60,
    /// Return long
    LReturn = 0x61,
    /// Return float
    FReturn = 0x62,
    /// Return double
    DReturn = 0x63,
    /// Return reference
    AReturn = 0x64,
    /// Return from void method
    Return = 0x65,
    /// Throw reference on top of stack
    AThrow = 0x66,
}

impl Opcode {
    /// Convert a byte to an opcode
    pub fn from_u8(byte: u8) -> Option<Self> {
        use Opcode::*;
        let op = match byte {
            0x00 => Nop,
            0x01 => AConstNull,
            0x02 => IConst,
            0x03 => LConst,
            0x04 => FConst,
            0x05 => DConst,
            0x06 => Ldc,
            0x10 => ILoad,
            0x11 => LLoad,
            0x12 => FLoad,
            0x13 => DLoad,
            0x14 => ALoad,
            0x18 => IStore,
            0x19 => LStore,
            0x1A => FStore,
            0x1B => DStore,
            0x1C => AStore,
            0x20 => Pop,
            0x21 => Pop2,
            0x22 => Dup,
            0x23 => Dup2,
            0x24 => Swap,
            0x30 => IAdd,
            0x31 => ISub,
            0x32 => IMul,
            0x33 => IDiv,
            0x34 => LAdd,
            0x35 => LSub,
            0x36 => LMul,
            0x37 => FAdd,
            0x38 => FMul,
            0x39 => DAdd,
            0x3A => DMul,
            0x3B => I2L,
            0x3C => L2I,
            0x3D => I2D,
            0x40 => IfEq,
            0x41 => IfNe,
            0x42 => IfLt,
            0x43 => IfGe,
            0x44 => IfGt,
            0x45 => IfLe,
            0x46 => IfICmpEq,
            0x47 => IfICmpNe,
            0x48 => IfICmpLt,
            0x49 => IfICmpGe,
            0x4A => IfNull,
            0x4B => IfNonNull,
            0x4C => Goto,
            0x50 => InvokeVirtual,
            0x51 => InvokeSpecial,
            0x52 => InvokeStatic,
            0x53 => InvokeInterface,
            0x58 => New,
            0x59 => CheckCast,
            0x5A => InstanceOf,
            0x60 => IReturn,
            0x61 => LReturn,
            0x62 => FReturn,
            0x63 => DReturn,
            0x64 => AReturn,
            0x65 => Return,
            0x66 => AThrow,
            _ => return None,
        };
        Some(op)
    }

    /// Convert opcode to byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Shape of the operand following this opcode
    pub fn operand_kind(self) -> OperandKind {
        use Opcode::*;
        match self {
            IConst => OperandKind::I32,
            LConst => OperandKind::I64,
            FConst => OperandKind::F32,
            DConst => OperandKind::F64,
            ILoad | LLoad | FLoad | DLoad | ALoad | IStore | LStore | FStore | DStore | AStore => {
                OperandKind::Local
            }
            Ldc | InvokeVirtual | InvokeSpecial | InvokeStatic | InvokeInterface | New
            | CheckCast | InstanceOf => OperandKind::Const,
            IfEq | IfNe | IfLt | IfGe | IfGt | IfLe | IfICmpEq | IfICmpNe | IfICmpLt
            | IfICmpGe | IfNull | IfNonNull | Goto => OperandKind::Branch,
            _ => OperandKind::None,
        }
    }

    /// Encoded size of the instruction including the opcode byte
    pub fn encoded_size(self) -> usize {
        1 + self.operand_kind().size()
    }

    /// Check if this opcode is a branch
    pub fn is_branch(self) -> bool {
        self.operand_kind() == OperandKind::Branch
    }

    /// Check if this opcode returns normally from the method
    pub fn is_return(self) -> bool {
        matches!(
            self,
            Opcode::IReturn
                | Opcode::LReturn
                | Opcode::FReturn
                | Opcode::DReturn
                | Opcode::AReturn
                | Opcode::Return
        )
    }

    /// Check if this opcode returns a value (every return except `Return`)
    pub fn returns_value(self) -> bool {
        self.is_return() && self != Opcode::Return
    }

    /// Check if this opcode returns a 64-bit value
    pub fn returns_wide(self) -> bool {
        matches!(self, Opcode::LReturn | Opcode::DReturn)
    }

    /// Check if control never falls through to the next instruction
    pub fn is_terminator(self) -> bool {
        self.is_return() || matches!(self, Opcode::AThrow | Opcode::Goto)
    }

    /// Check if this opcode is a method invocation
    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Opcode::InvokeVirtual
                | Opcode::InvokeSpecial
                | Opcode::InvokeStatic
                | Opcode::InvokeInterface
        )
    }

    /// Mnemonic used by the disassembler
    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Nop => "nop",
            AConstNull => "aconst_null",
            IConst => "iconst",
            LConst => "lconst",
            FConst => "fconst",
            DConst => "dconst",
            Ldc => "ldc",
            ILoad => "iload",
            LLoad => "lload",
            FLoad => "fload",
            DLoad => "dload",
            ALoad => "aload",
            IStore => "istore",
            LStore => "lstore",
            FStore => "fstore",
            DStore => "dstore",
            AStore => "astore",
            Pop => "pop",
            Pop2 => "pop2",
            Dup => "dup",
            Dup2 => "dup2",
            Swap => "swap",
            IAdd => "iadd",
            ISub => "isub",
            IMul => "imul",
            IDiv => "idiv",
            LAdd => "ladd",
            LSub => "lsub",
            LMul => "lmul",
            FAdd => "fadd",
            FMul => "fmul",
            DAdd => "dadd",
            DMul => "dmul",
            I2L => "i2l",
            L2I => "l2i",
            I2D => "i2d",
            IfEq => "ifeq",
            IfNe => "ifne",
            IfLt => "iflt",
            IfGe => "ifge",
            IfGt => "ifgt",
            IfLe => "ifle",
            IfICmpEq => "if_icmpeq",
            IfICmpNe => "if_icmpne",
            IfICmpLt => "if_icmplt",
            IfICmpGe => "if_icmpge",
            IfNull => "ifnull",
            IfNonNull => "ifnonnull",
            Goto => "goto",
            InvokeVirtual => "invokevirtual",
            InvokeSpecial => "invokespecial",
            InvokeStatic => "invokestatic",
            InvokeInterface => "invokeinterface",
            New => "new",
            CheckCast => "checkcast",
            InstanceOf => "instanceof",
            IReturn => "ireturn",
            LReturn => "lreturn",
            FReturn => "freturn",
            DReturn => "dreturn",
            AReturn => "areturn",
            Return => "return",
            AThrow => "athrow",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for byte in 0..=u8::MAX {
            if let Some(op) = Opcode::from_u8(byte) {
                assert_eq!(op.to_u8(), byte);
            }
        }
    }

    #[test]
    fn test_unknown_opcode() {
        assert_eq!(Opcode::from_u8(0x0F), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_return_classification() {
        assert!(Opcode::Return.is_return());
        assert!(!Opcode::Return.returns_value());
        assert!(Opcode::DReturn.returns_wide());
        assert!(!Opcode::AReturn.returns_wide());
        assert!(Opcode::AThrow.is_terminator());
        assert!(!Opcode::AThrow.is_return());
    }

    #[test]
    fn test_encoded_sizes() {
        assert_eq!(Opcode::Nop.encoded_size(), 1);
        assert_eq!(Opcode::ALoad.encoded_size(), 3);
        assert_eq!(Opcode::Goto.encoded_size(), 5);
        assert_eq!(Opcode::DConst.encoded_size(), 9);
    }
}
