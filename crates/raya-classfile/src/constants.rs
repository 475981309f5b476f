//! Constant pool for class units
//!
//! Entries are tagged and addressed by a u16 index. The `add_*` helpers
//! deduplicate, so adding the same string or method reference twice yields
//! the same index.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Largest number of entries a pool can hold; the count is encoded as a u16
pub const MAX_ENTRIES: usize = u16::MAX as usize;

/// A new entry would need an index past the u16 range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("constant pool is full ({MAX_ENTRIES} entries)")]
pub struct PoolFull;

/// Reference to a method of another (or the same) type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Internal name of the declaring type (`raya/metrics/Metrics`)
    pub owner: String,
    /// Method name
    pub name: String,
    /// Method descriptor (`(Lraya/lang/String;)V`)
    pub descriptor: String,
    /// Whether the owner is an interface
    pub interface: bool,
}

impl MethodRef {
    /// Create a method reference
    pub fn new(owner: &str, name: &str, descriptor: &str, interface: bool) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            interface,
        }
    }
}

/// A single constant pool entry
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// UTF-8 string literal
    Str(String),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// Type reference by internal name
    Class(String),
    /// Method reference
    Method(MethodRef),
}

mod tag {
    pub const STR: u8 = 1;
    pub const INT: u8 = 2;
    pub const LONG: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const DOUBLE: u8 = 5;
    pub const CLASS: u8 = 6;
    pub const METHOD: u8 = 7;
}

/// Hashable identity of a constant; floats compare by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Str(String),
    Int(i32),
    Long(i64),
    Float(u32),
    Double(u64),
    Class(String),
    Method(MethodRef),
}

impl Constant {
    fn key(&self) -> ConstKey {
        match self {
            Constant::Str(s) => ConstKey::Str(s.clone()),
            Constant::Int(v) => ConstKey::Int(*v),
            Constant::Long(v) => ConstKey::Long(*v),
            Constant::Float(v) => ConstKey::Float(v.to_bits()),
            Constant::Double(v) => ConstKey::Double(v.to_bits()),
            Constant::Class(s) => ConstKey::Class(s.clone()),
            Constant::Method(m) => ConstKey::Method(m.clone()),
        }
    }

    /// Whether loading this constant pushes a two-slot value
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        match self {
            Constant::Str(s) => {
                writer.emit_u8(tag::STR);
                writer.emit_string(s);
            }
            Constant::Int(v) => {
                writer.emit_u8(tag::INT);
                writer.emit_i32(*v);
            }
            Constant::Long(v) => {
                writer.emit_u8(tag::LONG);
                writer.emit_i64(*v);
            }
            Constant::Float(v) => {
                writer.emit_u8(tag::FLOAT);
                writer.emit_f32(*v);
            }
            Constant::Double(v) => {
                writer.emit_u8(tag::DOUBLE);
                writer.emit_f64(*v);
            }
            Constant::Class(name) => {
                writer.emit_u8(tag::CLASS);
                writer.emit_string(name);
            }
            Constant::Method(m) => {
                writer.emit_u8(tag::METHOD);
                writer.emit_string(&m.owner);
                writer.emit_string(&m.name);
                writer.emit_string(&m.descriptor);
                writer.emit_u8(m.interface as u8);
            }
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.position();
        let constant = match reader.read_u8()? {
            tag::STR => Constant::Str(reader.read_string()?),
            tag::INT => Constant::Int(reader.read_i32()?),
            tag::LONG => Constant::Long(reader.read_i64()?),
            tag::FLOAT => Constant::Float(reader.read_f32()?),
            tag::DOUBLE => Constant::Double(reader.read_f64()?),
            tag::CLASS => Constant::Class(reader.read_string()?),
            tag::METHOD => Constant::Method(MethodRef {
                owner: reader.read_string()?,
                name: reader.read_string()?,
                descriptor: reader.read_string()?,
                interface: reader.read_u8()? != 0,
            }),
            other => {
                return Err(DecodeError::InvalidTag {
                    what: "constant",
                    tag: other,
                    offset,
                })
            }
        };
        Ok(constant)
    }
}

/// Constant pool of a class unit
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    index: FxHashMap<ConstKey, u16>,
}

impl ConstantPool {
    /// Create a new empty constant pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in index order
    pub fn entries(&self) -> &[Constant] {
        &self.entries
    }

    /// Get an entry by index
    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get(index as usize)
    }

    /// Add an entry (deduplicated) and return its index
    ///
    /// Fails once the pool holds [`MAX_ENTRIES`] entries and `constant` is not
    /// among them.
    pub fn add(&mut self, constant: Constant) -> Result<u16, PoolFull> {
        let key = constant.key();
        if let Some(&idx) = self.index.get(&key) {
            return Ok(idx);
        }
        if self.entries.len() >= MAX_ENTRIES {
            return Err(PoolFull);
        }
        let idx = self.entries.len() as u16;
        self.entries.push(constant);
        self.index.insert(key, idx);
        Ok(idx)
    }

    /// Add a string constant and return its index
    pub fn add_string(&mut self, s: &str) -> Result<u16, PoolFull> {
        self.add(Constant::Str(s.to_string()))
    }

    /// Add an integer constant and return its index
    pub fn add_int(&mut self, v: i32) -> Result<u16, PoolFull> {
        self.add(Constant::Int(v))
    }

    /// Add a long constant and return its index
    pub fn add_long(&mut self, v: i64) -> Result<u16, PoolFull> {
        self.add(Constant::Long(v))
    }

    /// Add a type reference and return its index
    pub fn add_class(&mut self, internal_name: &str) -> Result<u16, PoolFull> {
        self.add(Constant::Class(internal_name.to_string()))
    }

    /// Add a method reference and return its index
    pub fn add_method(&mut self, owner: &str, name: &str, descriptor: &str, interface: bool) -> Result<u16, PoolFull> {
        self.add(Constant::Method(MethodRef::new(owner, name, descriptor, interface)))
    }

    /// Get a string constant by index
    pub fn get_string(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            Constant::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get a type reference by index
    pub fn get_class(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            Constant::Class(s) => Some(s),
            _ => None,
        }
    }

    /// Get a method reference by index
    pub fn get_method(&self, index: u16) -> Option<&MethodRef> {
        match self.get(index)? {
            Constant::Method(m) => Some(m),
            _ => None,
        }
    }

    /// Encode the constant pool
    ///
    /// Format: entry count (u16), then one tagged entry each. The count fits
    /// because [`add`](Self::add) and [`decode`](Self::decode) never grow the
    /// pool past [`MAX_ENTRIES`].
    pub fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u16(self.entries.len() as u16);
        for entry in &self.entries {
            entry.encode(writer);
        }
    }

    /// Decode the constant pool
    pub fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u16()? as usize;
        let mut pool = ConstantPool::new();
        pool.entries.reserve(count);
        for _ in 0..count {
            let constant = Constant::decode(reader)?;
            let idx = pool.entries.len() as u16;
            pool.index.entry(constant.key()).or_insert(idx);
            pool.entries.push(constant);
        }
        Ok(pool)
    }
}
