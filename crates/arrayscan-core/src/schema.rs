//! Array schema reflection types and the relational column model.
//!
//! The storage engine describes itself with `ArraySchema`; the relational side
//! hands over `ColumnHandle`s. `field.rs` joins the two into `Field`s.

use serde::{Deserialize, Serialize};

/// Unit of a datetime datatype. Values count units since 1970-01-01T00:00:00Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
    Microsecond,
    Nanosecond,
    Picosecond,
    Femtosecond,
    Attosecond,
}

/// Native datatype of an attribute or dimension, as the storage engine sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datatype {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Char,
    StringAscii,
    StringUtf8,
    DateTime(TimeUnit),
}

impl Datatype {
    /// Width of one element in bytes.
    pub fn native_size(&self) -> usize {
        use Datatype::*;
        match self {
            Bool | Int8 | UInt8 | Char | StringAscii | StringUtf8 => 1,
            Int16 | UInt16 => 2,
            Int32 | UInt32 | Float32 => 4,
            Int64 | UInt64 | Float64 | DateTime(_) => 8,
        }
    }

    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            Datatype::Char | Datatype::StringAscii | Datatype::StringUtf8
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Datatype::Float32 | Datatype::Float64)
    }

    /// The relational type a column of this datatype surfaces as when the
    /// relational engine did not declare one (count-only scans).
    pub fn default_relational_type(&self) -> RelationalType {
        use Datatype::*;
        match self {
            Bool => RelationalType::Boolean,
            Int8 => RelationalType::TinyInt,
            UInt8 | Int16 => RelationalType::SmallInt,
            UInt16 | Int32 => RelationalType::Integer,
            UInt32 | Int64 | UInt64 => RelationalType::BigInt,
            Float32 => RelationalType::Real,
            Float64 => RelationalType::Double,
            Char | StringAscii | StringUtf8 => RelationalType::Varchar,
            DateTime(TimeUnit::Day)
            | DateTime(TimeUnit::Week)
            | DateTime(TimeUnit::Month)
            | DateTime(TimeUnit::Year) => RelationalType::Date,
            DateTime(_) => RelationalType::Timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub name: String,
    pub datatype: Datatype,
    pub var_len: bool,
    pub nullable: bool,
}

impl AttributeInfo {
    pub fn new(name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            name: name.into(),
            datatype,
            var_len: false,
            nullable: false,
        }
    }

    pub fn var_len(mut self) -> Self {
        self.var_len = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Dimensions are never nullable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionInfo {
    pub name: String,
    pub datatype: Datatype,
    pub var_len: bool,
}

impl DimensionInfo {
    pub fn new(name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            name: name.into(),
            datatype,
            var_len: false,
        }
    }

    pub fn var_len(mut self) -> Self {
        self.var_len = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArraySchema {
    pub attributes: Vec<AttributeInfo>,
    pub dimensions: Vec<DimensionInfo>,
}

impl ArraySchema {
    pub fn new(dimensions: Vec<DimensionInfo>, attributes: Vec<AttributeInfo>) -> Self {
        Self {
            attributes,
            dimensions,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Position of the dimension in the domain, with its metadata.
    pub fn dimension(&self, name: &str) -> Option<(usize, &DimensionInfo)> {
        self.dimensions
            .iter()
            .enumerate()
            .find(|(_, d)| d.name == name)
    }
}

/// Semantic type of a relational column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationalType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    /// 4-byte float; values travel as the `i32` bit pattern in a `Long`.
    Real,
    Double,
    Varchar,
    /// Days since the epoch.
    Date,
    /// Milliseconds since the epoch.
    Timestamp,
}

/// One projected column as handed over by the relational engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnHandle {
    pub name: String,
    pub column_type: RelationalType,
    pub is_dimension: bool,
}

impl ColumnHandle {
    pub fn new(name: impl Into<String>, column_type: RelationalType, is_dimension: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            is_dimension,
        }
    }

    pub fn dimension(name: impl Into<String>, column_type: RelationalType) -> Self {
        Self::new(name, column_type, true)
    }

    pub fn attribute(name: impl Into<String>, column_type: RelationalType) -> Self {
        Self::new(name, column_type, false)
    }
}
