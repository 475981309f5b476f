//! Class-unit container format
//!
//! A class unit holds exactly one type: its header, declared supertypes,
//! dynamic imports, constant pool and methods.

use crate::constants::ConstantPool;
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use thiserror::Error;

/// Magic number for class units: "RCLS"
pub const MAGIC: [u8; 4] = *b"RCLS";

/// Current unit format version
pub const VERSION: u32 = 1;

/// Size of the fixed header (magic + version + checksum)
pub const HEADER_SIZE: usize = 12;

/// Universal root type, in internal form
pub const ROOT_TYPE: &str = "raya/lang/Object";

/// Unit encoding/decoding errors
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Decode error
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected RCLS, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Checksum stored in the header
        expected: u32,
        /// Checksum of the payload as read
        actual: u32,
    },
}

/// Access flags for types and methods
pub mod access {
    /// Visible everywhere
    pub const PUBLIC: u16 = 0x0001;
    /// Visible to the declaring type only
    pub const PRIVATE: u16 = 0x0002;
    /// No receiver
    pub const STATIC: u16 = 0x0008;
    /// Not overridable
    pub const FINAL: u16 = 0x0010;
    /// Implemented natively, no body
    pub const NATIVE: u16 = 0x0100;
    /// The type is an interface (types only)
    pub const INTERFACE: u16 = 0x0200;
    /// Declared without a body
    pub const ABSTRACT: u16 = 0x0400;
    /// Compiler generated
    pub const SYNTHETIC: u16 = 0x1000;
    /// The method body already carries metrics probes
    pub const WOVEN: u16 = 0x8000;
}

/// Verification type of a local slot or stack entry
///
/// Wide values take two slots: the `Long`/`Double` entry followed by `Top`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VType {
    /// Unusable or second half of a wide value
    Top,
    /// int, boolean, byte, char or short
    Integer,
    /// 32-bit float
    Float,
    /// 64-bit integer
    Long,
    /// 64-bit float
    Double,
    /// The null reference
    Null,
    /// Reference to an instance of the named type (internal form)
    Object(String),
}

impl VType {
    /// Whether the value occupies two slots
    pub fn is_wide(&self) -> bool {
        matches!(self, VType::Long | VType::Double)
    }

    /// Whether the value is a reference
    pub fn is_reference(&self) -> bool {
        matches!(self, VType::Null | VType::Object(_))
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        match self {
            VType::Top => writer.emit_u8(0),
            VType::Integer => writer.emit_u8(1),
            VType::Float => writer.emit_u8(2),
            VType::Long => writer.emit_u8(3),
            VType::Double => writer.emit_u8(4),
            VType::Null => writer.emit_u8(5),
            VType::Object(name) => {
                writer.emit_u8(6);
                writer.emit_string(name);
            }
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.position();
        Ok(match reader.read_u8()? {
            0 => VType::Top,
            1 => VType::Integer,
            2 => VType::Float,
            3 => VType::Long,
            4 => VType::Double,
            5 => VType::Null,
            6 => VType::Object(reader.read_string()?),
            tag => {
                return Err(DecodeError::InvalidTag {
                    what: "verification type",
                    tag,
                    offset,
                })
            }
        })
    }
}

/// Stack-map frame describing the machine state at a code offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapFrame {
    /// Code offset the frame applies to
    pub offset: u32,
    /// Local slots
    pub locals: Vec<VType>,
    /// Operand stack slots, bottom first
    pub stack: Vec<VType>,
}

/// Exception table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// First covered offset (inclusive)
    pub start: u32,
    /// End of the covered range (exclusive)
    pub end: u32,
    /// Handler entry offset
    pub handler: u32,
    /// Constant pool index of the caught class, `None` catches everything
    pub catch_type: Option<u16>,
}

/// Method body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Code {
    /// Maximum operand stack depth in slots
    pub max_stack: u16,
    /// Number of local slots including parameters
    pub max_locals: u16,
    /// Encoded instructions
    pub bytes: Vec<u8>,
    /// Exception table
    pub handlers: Vec<ExceptionHandler>,
    /// Stack-map frames, ordered by offset
    pub frames: Vec<StackMapFrame>,
}

impl Code {
    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u16(self.max_stack);
        writer.emit_u16(self.max_locals);
        writer.emit_u32(self.bytes.len() as u32);
        writer.emit_bytes(&self.bytes);

        writer.emit_u16(self.handlers.len() as u16);
        for h in &self.handlers {
            writer.emit_u32(h.start);
            writer.emit_u32(h.end);
            writer.emit_u32(h.handler);
            match h.catch_type {
                Some(idx) => {
                    writer.emit_u8(1);
                    writer.emit_u16(idx);
                }
                None => writer.emit_u8(0),
            }
        }

        writer.emit_u16(self.frames.len() as u16);
        for frame in &self.frames {
            writer.emit_u32(frame.offset);
            writer.emit_u16(frame.locals.len() as u16);
            for v in &frame.locals {
                v.encode(writer);
            }
            writer.emit_u16(frame.stack.len() as u16);
            for v in &frame.stack {
                v.encode(writer);
            }
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let max_stack = reader.read_u16()?;
        let max_locals = reader.read_u16()?;
        let len = reader.read_u32()? as usize;
        let bytes = reader.read_bytes(len)?;

        let handler_count = reader.read_u16()? as usize;
        let mut handlers = Vec::with_capacity(handler_count);
        for _ in 0..handler_count {
            let start = reader.read_u32()?;
            let end = reader.read_u32()?;
            let handler = reader.read_u32()?;
            let catch_type = match reader.read_u8()? {
                0 => None,
                _ => Some(reader.read_u16()?),
            };
            handlers.push(ExceptionHandler {
                start,
                end,
                handler,
                catch_type,
            });
        }

        let frame_count = reader.read_u16()? as usize;
        let mut frames = Vec::with_capacity(frame_count);
        for _ in 0..frame_count {
            let offset = reader.read_u32()?;
            let nlocals = reader.read_u16()? as usize;
            let mut locals = Vec::with_capacity(nlocals);
            for _ in 0..nlocals {
                locals.push(VType::decode(reader)?);
            }
            let nstack = reader.read_u16()? as usize;
            let mut stack = Vec::with_capacity(nstack);
            for _ in 0..nstack {
                stack.push(VType::decode(reader)?);
            }
            frames.push(StackMapFrame {
                offset,
                locals,
                stack,
            });
        }

        Ok(Self {
            max_stack,
            max_locals,
            bytes,
            handlers,
            frames,
        })
    }
}

/// Method definition
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// Access flags
    pub access: u16,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Body, absent for abstract and native methods
    pub code: Option<Code>,
}

impl MethodDef {
    /// Whether the method has no receiver
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }

    /// Whether the method is declared abstract
    pub fn is_abstract(&self) -> bool {
        self.access & access::ABSTRACT != 0
    }

    /// Whether the method already carries probes
    pub fn is_woven(&self) -> bool {
        self.access & access::WOVEN != 0
    }

    /// Whether the method has a body that can be rewritten
    pub fn has_body(&self) -> bool {
        self.code.is_some() && self.access & (access::ABSTRACT | access::NATIVE) == 0
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u16(self.access);
        writer.emit_string(&self.name);
        writer.emit_string(&self.descriptor);
        match &self.code {
            Some(code) => {
                writer.emit_u8(1);
                code.encode(writer);
            }
            None => writer.emit_u8(0),
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let access = reader.read_u16()?;
        let name = reader.read_string()?;
        let descriptor = reader.read_string()?;
        let code = match reader.read_u8()? {
            0 => None,
            _ => Some(Code::decode(reader)?),
        };
        Ok(Self {
            access,
            name,
            descriptor,
            code,
        })
    }
}

/// A single-type program unit
#[derive(Debug, Clone)]
pub struct ClassUnit {
    /// Access flags of the type
    pub access: u16,
    /// Internal name (`org/example/Foo`)
    pub name: String,
    /// Internal name of the superclass, `None` only for the root type
    pub super_name: Option<String>,
    /// Declared interfaces in declaration order
    pub interfaces: Vec<String>,
    /// Modules imported dynamically by the type
    pub imports: Vec<String>,
    /// Constant pool
    pub constants: ConstantPool,
    /// Method definitions
    pub methods: Vec<MethodDef>,
    /// Source file name
    pub source_file: Option<String>,
}

impl ClassUnit {
    /// Create an empty public type extending `super_name`
    pub fn new(name: &str, super_name: Option<&str>) -> Self {
        Self {
            access: access::PUBLIC,
            name: name.to_string(),
            super_name: super_name.map(str::to_string),
            interfaces: Vec::new(),
            imports: Vec::new(),
            constants: ConstantPool::new(),
            methods: Vec::new(),
            source_file: None,
        }
    }

    /// Whether the type is an interface
    pub fn is_interface(&self) -> bool {
        self.access & access::INTERFACE != 0
    }

    /// Find a method by name and descriptor
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Add a dynamic import unless already present; returns whether it was added
    pub fn add_import(&mut self, module: &str) -> bool {
        if self.imports.iter().any(|m| m == module) {
            return false;
        }
        self.imports.push(module.to_string());
        true
    }

    /// Encode the unit to binary format (.rcls)
    ///
    /// Format:
    /// - Header: magic (4 bytes) + version (u32) + checksum (u32)
    /// - Access flags, name, optional superclass
    /// - Interfaces, imports
    /// - Constant pool
    /// - Methods
    /// - Optional source file
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::with_capacity(256);

        writer.emit_bytes(&MAGIC);
        writer.emit_u32(VERSION);
        let checksum_offset = writer.offset();
        writer.emit_u32(0);

        writer.emit_u16(self.access);
        writer.emit_string(&self.name);
        writer.emit_opt_string(self.super_name.as_deref());

        writer.emit_u16(self.interfaces.len() as u16);
        for iface in &self.interfaces {
            writer.emit_string(iface);
        }
        writer.emit_u16(self.imports.len() as u16);
        for import in &self.imports {
            writer.emit_string(import);
        }

        self.constants.encode(&mut writer);

        writer.emit_u16(self.methods.len() as u16);
        for method in &self.methods {
            method.encode(&mut writer);
        }

        writer.emit_opt_string(self.source_file.as_deref());

        let checksum = crc32fast::hash(&writer.buffer[HEADER_SIZE..]);
        writer.patch_u32(checksum_offset, checksum);
        writer.into_bytes()
    }

    /// Decode a unit from binary format
    pub fn decode(data: &[u8]) -> Result<Self, ModuleError> {
        let mut reader = BytecodeReader::new(data);

        let magic_bytes = reader.read_bytes(4)?;
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&magic_bytes);
        if magic != MAGIC {
            return Err(ModuleError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ModuleError::UnsupportedVersion(version));
        }

        let stored_checksum = reader.read_u32()?;
        let calculated = crc32fast::hash(&data[HEADER_SIZE..]);
        if stored_checksum != calculated {
            return Err(ModuleError::ChecksumMismatch {
                expected: stored_checksum,
                actual: calculated,
            });
        }

        let access = reader.read_u16()?;
        let name = reader.read_string()?;
        let super_name = reader.read_opt_string()?;

        let iface_count = reader.read_u16()? as usize;
        let mut interfaces = Vec::with_capacity(iface_count);
        for _ in 0..iface_count {
            interfaces.push(reader.read_string()?);
        }
        let import_count = reader.read_u16()? as usize;
        let mut imports = Vec::with_capacity(import_count);
        for _ in 0..import_count {
            imports.push(reader.read_string()?);
        }

        let constants = ConstantPool::decode(&mut reader)?;

        let method_count = reader.read_u16()? as usize;
        let mut methods = Vec::with_capacity(method_count);
        for _ in 0..method_count {
            methods.push(MethodDef::decode(&mut reader)?);
        }

        let source_file = reader.read_opt_string()?;
        if reader.has_more() {
            return Err(DecodeError::TrailingBytes(reader.remaining()).into());
        }

        Ok(Self {
            access,
            name,
            super_name,
            interfaces,
            imports,
            constants,
            methods,
            source_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;

    fn sample_unit() -> ClassUnit {
        let mut unit = ClassUnit::new("org/example/Service", Some(ROOT_TYPE));
        unit.interfaces.push("org/example/Api".to_string());
        unit.source_file = Some("Service.raya".to_string());
        unit.methods.push(MethodDef {
            access: access::PUBLIC,
            name: "compute".to_string(),
            descriptor: "()I".to_string(),
            code: Some(Code {
                max_stack: 1,
                max_locals: 1,
                bytes: vec![Opcode::IConst as u8, 42, 0, 0, 0, Opcode::IReturn as u8],
                handlers: vec![],
                frames: vec![],
            }),
        });
        unit.methods.push(MethodDef {
            access: access::PUBLIC | access::ABSTRACT,
            name: "describe".to_string(),
            descriptor: "()Lraya/lang/String;".to_string(),
            code: None,
        });
        unit
    }

    #[test]
    fn test_encode_decode_unit() {
        let unit = sample_unit();
        let bytes = unit.encode();
        assert_eq!(&bytes[..4], b"RCLS");

        let decoded = ClassUnit::decode(&bytes).unwrap();
        assert_eq!(decoded.name, "org/example/Service");
        assert_eq!(decoded.super_name.as_deref(), Some(ROOT_TYPE));
        assert_eq!(decoded.interfaces, vec!["org/example/Api".to_string()]);
        assert_eq!(decoded.methods, unit.methods);
        assert_eq!(decoded.source_file.as_deref(), Some("Service.raya"));
        assert!(decoded.methods[0].has_body());
        assert!(!decoded.methods[1].has_body());
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut bytes = sample_unit().encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            ClassUnit::decode(&bytes),
            Err(ModuleError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_bad_magic_and_version() {
        let mut bytes = sample_unit().encode();
        bytes[0] = b'X';
        assert!(matches!(
            ClassUnit::decode(&bytes),
            Err(ModuleError::InvalidMagic(_))
        ));

        let mut bytes = sample_unit().encode();
        bytes[4] = 9;
        assert!(matches!(
            ClassUnit::decode(&bytes),
            Err(ModuleError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(
            ClassUnit::decode(b"RCL"),
            Err(ModuleError::DecodeError(DecodeError::UnexpectedEnd(0)))
        ));
    }

    #[test]
    fn test_frames_roundtrip() {
        let mut unit = ClassUnit::new("a/B", Some(ROOT_TYPE));
        unit.methods.push(MethodDef {
            access: access::STATIC | access::WOVEN,
            name: "f".into(),
            descriptor: "(J)V".into(),
            code: Some(Code {
                max_stack: 0,
                max_locals: 2,
                bytes: vec![Opcode::Return as u8],
                handlers: vec![ExceptionHandler {
                    start: 0,
                    end: 1,
                    handler: 0,
                    catch_type: None,
                }],
                frames: vec![StackMapFrame {
                    offset: 0,
                    locals: vec![VType::Long, VType::Top],
                    stack: vec![VType::Object("raya/lang/Throwable".into())],
                }],
            }),
        });
        let decoded = ClassUnit::decode(&unit.encode()).unwrap();
        assert_eq!(decoded.methods, unit.methods);
        assert!(decoded.methods[0].is_woven());
    }

    #[test]
    fn test_add_import_once() {
        let mut unit = ClassUnit::new("a/B", Some(ROOT_TYPE));
        assert!(unit.add_import("raya.metrics"));
        assert!(!unit.add_import("raya.metrics"));
        assert_eq!(unit.imports.len(), 1);
    }
}
