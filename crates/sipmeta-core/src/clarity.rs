//! Clarity value decoding
//!
//! Read-only contract calls answer with a hex-encoded, consensus-serialized
//! Clarity value. Only decoding is needed: SIP-010 getters take no arguments.
//!
//! Wire format: one type-prefix byte followed by the payload. Lengths and
//! counts are big-endian u32 except tuple keys and contract names (u8).

use thiserror::Error;

/// Nesting limit for lists/tuples/optionals/responses
const MAX_DEPTH: usize = 32;

/// Upper bound on any single length prefix (1 MiB)
const MAX_LEN: usize = 1 << 20;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClarityError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("unexpected end of input at byte {0}")]
    UnexpectedEof(usize),

    #[error("unknown type prefix 0x{0:02x}")]
    UnknownType(u8),

    #[error("length {0} exceeds limit")]
    LengthLimit(usize),

    #[error("value nested deeper than 32 levels")]
    DepthLimit,

    #[error("invalid utf-8 in string payload")]
    InvalidUtf8,

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("contract returned (err {0})")]
    ErrResponse(String),
}

/// A decoded Clarity value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClarityValue {
    Int(i128),
    UInt(u128),
    Buffer(Vec<u8>),
    Bool(bool),
    StandardPrincipal {
        version: u8,
        hash160: [u8; 20],
    },
    ContractPrincipal {
        version: u8,
        hash160: [u8; 20],
        name: String,
    },
    ResponseOk(Box<ClarityValue>),
    ResponseErr(Box<ClarityValue>),
    None,
    Some(Box<ClarityValue>),
    List(Vec<ClarityValue>),
    Tuple(Vec<(String, ClarityValue)>),
    StringAscii(String),
    StringUtf8(String),
}

impl ClarityValue {
    /// Decode a `0x`-prefixed (or bare) hex string
    pub fn from_hex(hex_str: &str) -> Result<Self, ClarityError> {
        let trimmed = hex_str.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(trimmed).map_err(|e| ClarityError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Decode exactly one value from `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ClarityError> {
        let mut reader = Reader { bytes, pos: 0 };
        let value = reader.value(0)?;
        let rest = bytes.len() - reader.pos;
        if rest != 0 {
            return Err(ClarityError::TrailingBytes(rest));
        }
        Ok(value)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ClarityValue::Int(_) => "int",
            ClarityValue::UInt(_) => "uint",
            ClarityValue::Buffer(_) => "buffer",
            ClarityValue::Bool(_) => "bool",
            ClarityValue::StandardPrincipal { .. } => "principal",
            ClarityValue::ContractPrincipal { .. } => "contract-principal",
            ClarityValue::ResponseOk(_) => "ok-response",
            ClarityValue::ResponseErr(_) => "err-response",
            ClarityValue::None => "none",
            ClarityValue::Some(_) => "some",
            ClarityValue::List(_) => "list",
            ClarityValue::Tuple(_) => "tuple",
            ClarityValue::StringAscii(_) => "string-ascii",
            ClarityValue::StringUtf8(_) => "string-utf8",
        }
    }

    /// Unwrap `(ok v)`; `(err e)` becomes an error; other values pass through
    pub fn into_ok(self) -> Result<ClarityValue, ClarityError> {
        match self {
            ClarityValue::ResponseOk(inner) => Ok(*inner),
            ClarityValue::ResponseErr(inner) => Err(ClarityError::ErrResponse(inner.to_string())),
            other => Ok(other),
        }
    }

    /// `none` → None, `(some v)` → Some(v), anything else → Some(self)
    pub fn into_optional(self) -> Option<ClarityValue> {
        match self {
            ClarityValue::None => None,
            ClarityValue::Some(inner) => Some(*inner),
            other => Some(other),
        }
    }

    pub fn into_string(self) -> Result<String, ClarityError> {
        match self {
            ClarityValue::StringAscii(s) | ClarityValue::StringUtf8(s) => Ok(s),
            // Some contracts return the token URI as a buffer
            ClarityValue::Buffer(bytes) => String::from_utf8(bytes).map_err(|_| ClarityError::InvalidUtf8),
            other => Err(ClarityError::TypeMismatch {
                expected: "string",
                found: other.type_name(),
            }),
        }
    }

    pub fn into_u128(self) -> Result<u128, ClarityError> {
        match self {
            ClarityValue::UInt(v) => Ok(v),
            ClarityValue::Int(v) if v >= 0 => Ok(v as u128),
            other => Err(ClarityError::TypeMismatch {
                expected: "uint",
                found: other.type_name(),
            }),
        }
    }
}

impl std::fmt::Display for ClarityValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClarityValue::Int(v) => write!(f, "{}", v),
            ClarityValue::UInt(v) => write!(f, "u{}", v),
            ClarityValue::Buffer(b) => write!(f, "0x{}", hex::encode(b)),
            ClarityValue::Bool(b) => write!(f, "{}", b),
            ClarityValue::StandardPrincipal { version, hash160 } => {
                write!(f, "'principal(v{}:{})", version, hex::encode(hash160))
            }
            ClarityValue::ContractPrincipal {
                version,
                hash160,
                name,
            } => write!(f, "'principal(v{}:{}).{}", version, hex::encode(hash160), name),
            ClarityValue::ResponseOk(v) => write!(f, "(ok {})", v),
            ClarityValue::ResponseErr(v) => write!(f, "(err {})", v),
            ClarityValue::None => f.write_str("none"),
            ClarityValue::Some(v) => write!(f, "(some {})", v),
            ClarityValue::List(items) => {
                f.write_str("(list")?;
                for item in items {
                    write!(f, " {}", item)?;
                }
                f.write_str(")")
            }
            ClarityValue::Tuple(fields) => {
                f.write_str("(tuple")?;
                for (k, v) in fields {
                    write!(f, " ({} {})", k, v)?;
                }
                f.write_str(")")
            }
            ClarityValue::StringAscii(s) => write!(f, "{:?}", s),
            ClarityValue::StringUtf8(s) => write!(f, "u{:?}", s),
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ClarityError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(ClarityError::UnexpectedEof(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ClarityError> {
        Ok(self.take(1)?[0])
    }

    fn u32_len(&mut self) -> Result<usize, ClarityError> {
        let raw = self.take(4)?;
        let len = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        if len > MAX_LEN {
            return Err(ClarityError::LengthLimit(len));
        }
        Ok(len)
    }

    fn u128(&mut self) -> Result<u128, ClarityError> {
        let raw = self.take(16)?;
        let mut buf = [0u8; 16];
        buf.copy_from_slice(raw);
        Ok(u128::from_be_bytes(buf))
    }

    fn hash160(&mut self) -> Result<[u8; 20], ClarityError> {
        let raw = self.take(20)?;
        let mut buf = [0u8; 20];
        buf.copy_from_slice(raw);
        Ok(buf)
    }

    fn short_name(&mut self) -> Result<String, ClarityError> {
        let len = self.u8()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| ClarityError::InvalidUtf8)
    }

    fn value(&mut self, depth: usize) -> Result<ClarityValue, ClarityError> {
        if depth > MAX_DEPTH {
            return Err(ClarityError::DepthLimit);
        }

        let prefix = self.u8()?;
        let value = match prefix {
            0x00 => ClarityValue::Int(self.u128()? as i128),
            0x01 => ClarityValue::UInt(self.u128()?),
            0x02 => {
                let len = self.u32_len()?;
                ClarityValue::Buffer(self.take(len)?.to_vec())
            }
            0x03 => ClarityValue::Bool(true),
            0x04 => ClarityValue::Bool(false),
            0x05 => ClarityValue::StandardPrincipal {
                version: self.u8()?,
                hash160: self.hash160()?,
            },
            0x06 => ClarityValue::ContractPrincipal {
                version: self.u8()?,
                hash160: self.hash160()?,
                name: self.short_name()?,
            },
            0x07 => ClarityValue::ResponseOk(Box::new(self.value(depth + 1)?)),
            0x08 => ClarityValue::ResponseErr(Box::new(self.value(depth + 1)?)),
            0x09 => ClarityValue::None,
            0x0a => ClarityValue::Some(Box::new(self.value(depth + 1)?)),
            0x0b => {
                let count = self.u32_len()?;
                let mut items = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    items.push(self.value(depth + 1)?);
                }
                ClarityValue::List(items)
            }
            0x0c => {
                let count = self.u32_len()?;
                let mut fields = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let key = self.short_name()?;
                    fields.push((key, self.value(depth + 1)?));
                }
                ClarityValue::Tuple(fields)
            }
            0x0d => {
                let len = self.u32_len()?;
                let raw = self.take(len)?;
                if !raw.is_ascii() {
                    return Err(ClarityError::InvalidUtf8);
                }
                ClarityValue::StringAscii(String::from_utf8(raw.to_vec()).map_err(|_| ClarityError::InvalidUtf8)?)
            }
            0x0e => {
                let len = self.u32_len()?;
                let raw = self.take(len)?;
                ClarityValue::StringUtf8(String::from_utf8(raw.to_vec()).map_err(|_| ClarityError::InvalidUtf8)?)
            }
            other => return Err(ClarityError::UnknownType(other)),
        };
        Ok(value)
    }
}
