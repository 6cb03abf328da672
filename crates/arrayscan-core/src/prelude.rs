//! Convenient re-exports for downstream crates.

pub use crate::budget::MemoryProbe;
pub use crate::config::ScanConfig;
pub use crate::error::{Error, Result};
pub use crate::field::{resolve_fields, Field, FieldKind};
pub use crate::id::ScanId;
pub use crate::predicate::{Bound, ColumnDomain, Domain, Marker, TupleDomain, ValueRange};
pub use crate::schema::{
    ArraySchema, AttributeInfo, ColumnHandle, Datatype, DimensionInfo, RelationalType, TimeUnit,
};
pub use crate::types::{decode_real, encode_real, NativeValue, Value};
