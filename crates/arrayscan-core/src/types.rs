//! Relational values and native values.
//!
//! `Value` is what the relational engine puts into predicate markers.
//! `NativeValue` is a value in a storage datatype. All datatype-dependent
//! behavior (ordering, min/max, exclusive-bound stepping, coercion, byte
//! encoding) dispatches once over the closed set of `NativeValue` variants.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{Datatype, RelationalType};

/// A relational value as carried by predicate markers.
///
/// REAL values travel as `Long` holding the sign-extended `i32` bit pattern of
/// the `f32` (see [`encode_real`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    Long(i64),
    Double(f64),
    Slice(Vec<u8>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Slice(s) => write!(f, "'{}'", String::from_utf8_lossy(s)),
        }
    }
}

/// Pack an `f32` into the wide-integer transport representation.
pub fn encode_real(v: f32) -> i64 {
    v.to_bits() as i32 as i64
}

/// Inverse of [`encode_real`]; rejects values that are not an `i32` pattern.
pub fn decode_real(v: i64) -> Result<f32> {
    let bits = i32::try_from(v)
        .map_err(|_| Error::Contract(format!("REAL value {v} is not a 32-bit pattern")))?;
    Ok(f32::from_bits(bits as u32))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NativeValue {
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Bytes(Vec<u8>),
}

/// Intermediate numeric form used while coercing relational values.
enum Num {
    Int(i128),
    Float(f64),
}

macro_rules! int_from_num {
    ($num:expr, $t:ty, $variant:ident, $datatype:expr) => {{
        let wide: i128 = match $num {
            Num::Int(i) => i,
            Num::Float(f) if f.is_finite() && f.fract() == 0.0 => f as i128,
            Num::Float(f) => {
                return Err(Error::Coercion {
                    value: f.to_string(),
                    datatype: $datatype,
                })
            }
        };
        <$t>::try_from(wide)
            .map(NativeValue::$variant)
            .map_err(|_| Error::Coercion {
                value: wide.to_string(),
                datatype: $datatype,
            })
    }};
}

impl NativeValue {
    fn variant_name(&self) -> &'static str {
        use NativeValue::*;
        match self {
            Int8(_) => "int8",
            UInt8(_) => "uint8",
            Int16(_) => "int16",
            UInt16(_) => "uint16",
            Int32(_) => "int32",
            UInt32(_) => "uint32",
            Int64(_) => "int64",
            UInt64(_) => "uint64",
            Float32(_) => "float32",
            Float64(_) => "float64",
            Bytes(_) => "bytes",
        }
    }

    /// Whether this value is the native representation of `datatype`.
    pub fn matches(&self, datatype: Datatype) -> bool {
        use Datatype as D;
        use NativeValue::*;
        matches!(
            (self, datatype),
            (Int8(_), D::Int8)
                | (UInt8(_), D::UInt8 | D::Bool)
                | (Int16(_), D::Int16)
                | (UInt16(_), D::UInt16)
                | (Int32(_), D::Int32)
                | (UInt32(_), D::UInt32)
                | (Int64(_), D::Int64 | D::DateTime(_))
                | (UInt64(_), D::UInt64)
                | (Float32(_), D::Float32)
                | (Float64(_), D::Float64)
                | (Bytes(_), D::Char | D::StringAscii | D::StringUtf8)
        )
    }

    /// Order two values of the same native type.
    pub fn native_cmp(&self, other: &Self) -> Result<Ordering> {
        use NativeValue::*;
        let ord = match (self, other) {
            (Int8(a), Int8(b)) => a.cmp(b),
            (UInt8(a), UInt8(b)) => a.cmp(b),
            (Int16(a), Int16(b)) => a.cmp(b),
            (UInt16(a), UInt16(b)) => a.cmp(b),
            (Int32(a), Int32(b)) => a.cmp(b),
            (UInt32(a), UInt32(b)) => a.cmp(b),
            (Int64(a), Int64(b)) => a.cmp(b),
            (UInt64(a), UInt64(b)) => a.cmp(b),
            (Float32(a), Float32(b)) => a
                .partial_cmp(b)
                .ok_or_else(|| Error::Contract(format!("cannot order {a} and {b}")))?,
            (Float64(a), Float64(b)) => a
                .partial_cmp(b)
                .ok_or_else(|| Error::Contract(format!("cannot order {a} and {b}")))?,
            (Bytes(a), Bytes(b)) => a.cmp(b),
            _ => {
                return Err(Error::Contract(format!(
                    "cannot compare {} with {}",
                    self.variant_name(),
                    other.variant_name()
                )))
            }
        };
        Ok(ord)
    }

    pub fn min(self, other: Self) -> Result<Self> {
        Ok(match self.native_cmp(&other)? {
            Ordering::Greater => other,
            _ => self,
        })
    }

    pub fn max(self, other: Self) -> Result<Self> {
        Ok(match self.native_cmp(&other)? {
            Ordering::Less => other,
            _ => self,
        })
    }

    /// Smallest representable value strictly greater than `self`.
    pub fn next_up(&self) -> Result<Self> {
        use NativeValue::*;
        let next = match self {
            Int8(v) => v.checked_add(1).map(Int8),
            UInt8(v) => v.checked_add(1).map(UInt8),
            Int16(v) => v.checked_add(1).map(Int16),
            UInt16(v) => v.checked_add(1).map(UInt16),
            Int32(v) => v.checked_add(1).map(Int32),
            UInt32(v) => v.checked_add(1).map(UInt32),
            Int64(v) => v.checked_add(1).map(Int64),
            UInt64(v) => v.checked_add(1).map(UInt64),
            Float32(v) => next_up_f32(*v).map(Float32),
            Float64(v) => next_up_f64(*v).map(Float64),
            Bytes(v) => {
                let mut succ = v.clone();
                succ.push(0);
                Some(Bytes(succ))
            }
        };
        next.ok_or_else(|| Error::Contract(format!("no representable value above {self}")))
    }

    /// Largest representable value strictly smaller than `self`.
    ///
    /// For byte strings the result is exact for any data that never contains
    /// a `0xFF` byte (all valid UTF-8).
    pub fn next_down(&self) -> Result<Self> {
        use NativeValue::*;
        let next = match self {
            Int8(v) => v.checked_sub(1).map(Int8),
            UInt8(v) => v.checked_sub(1).map(UInt8),
            Int16(v) => v.checked_sub(1).map(Int16),
            UInt16(v) => v.checked_sub(1).map(UInt16),
            Int32(v) => v.checked_sub(1).map(Int32),
            UInt32(v) => v.checked_sub(1).map(UInt32),
            Int64(v) => v.checked_sub(1).map(Int64),
            UInt64(v) => v.checked_sub(1).map(UInt64),
            Float32(v) => next_up_f32(-*v).map(|n| Float32(-n)),
            Float64(v) => next_up_f64(-*v).map(|n| Float64(-n)),
            Bytes(v) => bytes_predecessor(v).map(Bytes),
        };
        next.ok_or_else(|| Error::Contract(format!("no representable value below {self}")))
    }

    /// Convert a relational marker value into `datatype`.
    pub fn coerce(datatype: Datatype, column_type: RelationalType, value: &Value) -> Result<Self> {
        if datatype.is_textual() {
            return match value {
                Value::Slice(bytes) => Ok(NativeValue::Bytes(bytes.clone())),
                other => Err(Error::Coercion {
                    value: other.to_string(),
                    datatype,
                }),
            };
        }

        let num = match (column_type, value) {
            (RelationalType::Real, Value::Long(bits)) => Num::Float(decode_real(*bits)? as f64),
            (_, Value::Long(v)) => Num::Int(*v as i128),
            (_, Value::Double(v)) => Num::Float(*v),
            (_, Value::Boolean(b)) => Num::Int(*b as i128),
            (_, Value::Slice(_)) => {
                return Err(Error::Coercion {
                    value: value.to_string(),
                    datatype,
                })
            }
        };

        use Datatype as D;
        match datatype {
            D::Int8 => int_from_num!(num, i8, Int8, datatype),
            D::Bool | D::UInt8 => int_from_num!(num, u8, UInt8, datatype),
            D::Int16 => int_from_num!(num, i16, Int16, datatype),
            D::UInt16 => int_from_num!(num, u16, UInt16, datatype),
            D::Int32 => int_from_num!(num, i32, Int32, datatype),
            D::UInt32 => int_from_num!(num, u32, UInt32, datatype),
            D::Int64 | D::DateTime(_) => int_from_num!(num, i64, Int64, datatype),
            // BIGINT carries UInt64 as its bit pattern (see `as_i64`).
            D::UInt64 => match num {
                Num::Int(i) if (i128::from(i64::MIN)..0).contains(&i) => {
                    Ok(NativeValue::UInt64(i as i64 as u64))
                }
                num => int_from_num!(num, u64, UInt64, datatype),
            },
            D::Float32 => Ok(NativeValue::Float32(match num {
                Num::Int(i) => i as f32,
                Num::Float(f) => f as f32,
            })),
            D::Float64 => Ok(NativeValue::Float64(match num {
                Num::Int(i) => i as f64,
                Num::Float(f) => f,
            })),
            D::Char | D::StringAscii | D::StringUtf8 => {
                Err(Error::UnsupportedDatatype(datatype, "numeric coercion"))
            }
        }
    }

    /// Read one element of `datatype` from little-endian `bytes`. Textual
    /// datatypes take the whole span.
    pub fn decode(datatype: Datatype, bytes: &[u8]) -> Result<Self> {
        use Datatype as D;
        let v = match datatype {
            D::Int8 => NativeValue::Int8(i8::from_le_bytes(le(bytes, datatype)?)),
            D::Bool | D::UInt8 => NativeValue::UInt8(u8::from_le_bytes(le(bytes, datatype)?)),
            D::Int16 => NativeValue::Int16(i16::from_le_bytes(le(bytes, datatype)?)),
            D::UInt16 => NativeValue::UInt16(u16::from_le_bytes(le(bytes, datatype)?)),
            D::Int32 => NativeValue::Int32(i32::from_le_bytes(le(bytes, datatype)?)),
            D::UInt32 => NativeValue::UInt32(u32::from_le_bytes(le(bytes, datatype)?)),
            D::Int64 | D::DateTime(_) => {
                NativeValue::Int64(i64::from_le_bytes(le(bytes, datatype)?))
            }
            D::UInt64 => NativeValue::UInt64(u64::from_le_bytes(le(bytes, datatype)?)),
            D::Float32 => NativeValue::Float32(f32::from_le_bytes(le(bytes, datatype)?)),
            D::Float64 => NativeValue::Float64(f64::from_le_bytes(le(bytes, datatype)?)),
            D::Char | D::StringAscii | D::StringUtf8 => NativeValue::Bytes(bytes.to_vec()),
        };
        Ok(v)
    }

    /// Append the little-endian encoding to `out`.
    pub fn write_le(&self, out: &mut Vec<u8>) {
        use NativeValue::*;
        match self {
            Int8(v) => out.extend_from_slice(&v.to_le_bytes()),
            UInt8(v) => out.extend_from_slice(&v.to_le_bytes()),
            Int16(v) => out.extend_from_slice(&v.to_le_bytes()),
            UInt16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
            UInt32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
            UInt64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Float32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Float64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Bytes(v) => out.extend_from_slice(v),
        }
    }

    /// Encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        use NativeValue::*;
        match self {
            Int8(_) | UInt8(_) => 1,
            Int16(_) | UInt16(_) => 2,
            Int32(_) | UInt32(_) | Float32(_) => 4,
            Int64(_) | UInt64(_) | Float64(_) => 8,
            Bytes(v) => v.len(),
        }
    }

    /// Widen an integer-family value. `UInt64` wraps into the signed range.
    pub fn as_i64(&self) -> Result<i64> {
        use NativeValue::*;
        match self {
            Int8(v) => Ok(*v as i64),
            UInt8(v) => Ok(*v as i64),
            Int16(v) => Ok(*v as i64),
            UInt16(v) => Ok(*v as i64),
            Int32(v) => Ok(*v as i64),
            UInt32(v) => Ok(*v as i64),
            Int64(v) => Ok(*v),
            UInt64(v) => Ok(*v as i64),
            _ => Err(Error::Contract(format!(
                "{} is not an integer value",
                self.variant_name()
            ))),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            NativeValue::Float32(v) => Ok(*v as f64),
            NativeValue::Float64(v) => Ok(*v),
            _ => Err(Error::Contract(format!(
                "{} is not a floating-point value",
                self.variant_name()
            ))),
        }
    }
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use NativeValue::*;
        match self {
            Int8(v) => write!(f, "{v}"),
            UInt8(v) => write!(f, "{v}"),
            Int16(v) => write!(f, "{v}"),
            UInt16(v) => write!(f, "{v}"),
            Int32(v) => write!(f, "{v}"),
            UInt32(v) => write!(f, "{v}"),
            Int64(v) => write!(f, "{v}"),
            UInt64(v) => write!(f, "{v}"),
            Float32(v) => write!(f, "{v}"),
            Float64(v) => write!(f, "{v}"),
            Bytes(v) => write!(f, "{}", String::from_utf8_lossy(v)),
        }
    }
}

fn le<const N: usize>(bytes: &[u8], datatype: Datatype) -> Result<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            Error::Contract(format!(
                "{datatype:?} needs {N} bytes, got {}",
                bytes.len()
            ))
        })
}

fn next_up_f32(x: f32) -> Option<f32> {
    if x.is_nan() || x == f32::INFINITY {
        return None;
    }
    if x == 0.0 {
        return Some(f32::from_bits(1));
    }
    let bits = x.to_bits();
    Some(f32::from_bits(if x > 0.0 { bits + 1 } else { bits - 1 }))
}

fn next_up_f64(x: f64) -> Option<f64> {
    if x.is_nan() || x == f64::INFINITY {
        return None;
    }
    if x == 0.0 {
        return Some(f64::from_bits(1));
    }
    let bits = x.to_bits();
    Some(f64::from_bits(if x > 0.0 { bits + 1 } else { bits - 1 }))
}

fn bytes_predecessor(v: &[u8]) -> Option<Vec<u8>> {
    let (&last, head) = v.split_last()?;
    let mut pred = head.to_vec();
    if last != 0 {
        pred.push(last - 1);
        pred.push(0xFF);
    }
    Some(pred)
}
