//! Type and method descriptors
//!
//! Descriptors use the compact single-letter grammar: `I` int, `Z` boolean,
//! `B` byte, `C` char, `S` short, `J` long, `F` float, `D` double,
//! `Lpkg/Name;` references, `[T` arrays and `V` for a void return.

use std::fmt;
use thiserror::Error;

/// Descriptor parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// Input ended inside a descriptor
    #[error("Truncated descriptor {0:?}")]
    Truncated(String),

    /// Unknown type character
    #[error("Invalid type character {ch:?} in descriptor {descriptor:?}")]
    InvalidChar {
        /// Offending character
        ch: char,
        /// Full descriptor
        descriptor: String,
    },

    /// Method descriptor without parentheses
    #[error("Malformed method descriptor {0:?}")]
    Malformed(String),
}

/// A value type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `I`
    Int,
    /// `Z`
    Boolean,
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `S`
    Short,
    /// `J`
    Long,
    /// `F`
    Float,
    /// `D`
    Double,
    /// `L<internal name>;`
    Object(String),
    /// `[<element>`
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse a single field descriptor
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let mut chars = descriptor.char_indices().peekable();
        let ty = parse_field(descriptor, &mut chars)?;
        if chars.next().is_some() {
            return Err(DescriptorError::Malformed(descriptor.to_string()));
        }
        Ok(ty)
    }

    /// Number of local/stack slots a value of this type occupies
    pub fn slots(&self) -> u16 {
        if self.is_wide() {
            2
        } else {
            1
        }
    }

    /// Whether the type occupies two slots
    pub fn is_wide(&self) -> bool {
        matches!(self, FieldType::Long | FieldType::Double)
    }

    /// Whether the type is a reference (object or array)
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    /// Whether the type is carried as an int on the operand stack
    pub fn is_int_like(&self) -> bool {
        matches!(
            self,
            FieldType::Int | FieldType::Boolean | FieldType::Byte | FieldType::Char | FieldType::Short
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => f.write_str("I"),
            FieldType::Boolean => f.write_str("Z"),
            FieldType::Byte => f.write_str("B"),
            FieldType::Char => f.write_str("C"),
            FieldType::Short => f.write_str("S"),
            FieldType::Long => f.write_str("J"),
            FieldType::Float => f.write_str("F"),
            FieldType::Double => f.write_str("D"),
            FieldType::Object(name) => write!(f, "L{};", name),
            FieldType::Array(elem) => write!(f, "[{}", elem),
        }
    }
}

/// A parsed method descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub params: Vec<FieldType>,
    /// Return type, `None` for void
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parse a method descriptor such as `(ILraya/lang/String;)J`
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let malformed = || DescriptorError::Malformed(descriptor.to_string());
        let mut chars = descriptor.char_indices().peekable();
        match chars.next() {
            Some((_, '(')) => {}
            _ => return Err(malformed()),
        }

        let mut params = Vec::new();
        loop {
            match chars.peek() {
                Some((_, ')')) => {
                    chars.next();
                    break;
                }
                Some(_) => params.push(parse_field(descriptor, &mut chars)?),
                None => return Err(DescriptorError::Truncated(descriptor.to_string())),
            }
        }

        let ret = match chars.peek() {
            Some((_, 'V')) => {
                chars.next();
                None
            }
            Some(_) => Some(parse_field(descriptor, &mut chars)?),
            None => return Err(DescriptorError::Truncated(descriptor.to_string())),
        };
        if chars.next().is_some() {
            return Err(malformed());
        }
        Ok(Self { params, ret })
    }

    /// Total slots taken by the parameters (the receiver excluded)
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(FieldType::slots).sum()
    }

    /// Whether the method returns nothing
    pub fn is_void(&self) -> bool {
        self.ret.is_none()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for p in &self.params {
            write!(f, "{}", p)?;
        }
        f.write_str(")")?;
        match &self.ret {
            Some(r) => write!(f, "{}", r),
            None => f.write_str("V"),
        }
    }
}

fn parse_field(
    descriptor: &str,
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) -> Result<FieldType, DescriptorError> {
    let truncated = || DescriptorError::Truncated(descriptor.to_string());
    let (start, ch) = chars.next().ok_or_else(truncated)?;
    let ty = match ch {
        'I' => FieldType::Int,
        'Z' => FieldType::Boolean,
        'B' => FieldType::Byte,
        'C' => FieldType::Char,
        'S' => FieldType::Short,
        'J' => FieldType::Long,
        'F' => FieldType::Float,
        'D' => FieldType::Double,
        '[' => FieldType::Array(Box::new(parse_field(descriptor, chars)?)),
        'L' => {
            let name_start = start + 1;
            loop {
                match chars.next() {
                    Some((end, ';')) => {
                        if end == name_start {
                            return Err(DescriptorError::Malformed(descriptor.to_string()));
                        }
                        break FieldType::Object(descriptor[name_start..end].to_string());
                    }
                    Some(_) => {}
                    None => return Err(truncated()),
                }
            }
        }
        other => {
            return Err(DescriptorError::InvalidChar {
                ch: other,
                descriptor: descriptor.to_string(),
            })
        }
    };
    Ok(ty)
}
