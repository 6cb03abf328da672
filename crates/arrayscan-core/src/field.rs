//! Projected fields: one record per selected column.
//!
//! The field's position in the resolved list is its ordinal, which equals the
//! relational engine's column index. Every per-field structure downstream
//! (buffers, decoded columns) is keyed by that ordinal.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{ArraySchema, ColumnHandle, Datatype, RelationalType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Coordinate axis; `position` is its index in the array domain.
    Dimension { position: usize },
    Attribute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub ordinal: usize,
    pub name: String,
    pub datatype: Datatype,
    pub var_len: bool,
    pub nullable: bool,
    pub column_type: RelationalType,
    pub kind: FieldKind,
}

impl Field {
    pub fn is_dimension(&self) -> bool {
        matches!(self.kind, FieldKind::Dimension { .. })
    }
}

/// Join the relational projection with the array schema.
///
/// An empty projection (count-only scans) selects the first dimension so the
/// storage engine still has something to estimate and fill.
pub fn resolve_fields(columns: &[ColumnHandle], schema: &ArraySchema) -> Result<Vec<Field>> {
    if columns.is_empty() {
        let dim = schema
            .dimensions
            .first()
            .ok_or_else(|| Error::Schema("array has no dimensions".into()))?;
        return Ok(vec![Field {
            ordinal: 0,
            name: dim.name.clone(),
            datatype: dim.datatype,
            var_len: dim.var_len,
            nullable: false,
            column_type: dim.datatype.default_relational_type(),
            kind: FieldKind::Dimension { position: 0 },
        }]);
    }

    let mut fields = Vec::with_capacity(columns.len());
    for (ordinal, column) in columns.iter().enumerate() {
        if fields.iter().any(|f: &Field| f.name == column.name) {
            return Err(Error::Schema(format!(
                "column '{}' projected twice",
                column.name
            )));
        }
        let field = if let Some(attr) = schema.attribute(&column.name) {
            Field {
                ordinal,
                name: attr.name.clone(),
                datatype: attr.datatype,
                var_len: attr.var_len,
                nullable: attr.nullable,
                column_type: column.column_type,
                kind: FieldKind::Attribute,
            }
        } else if let Some((position, dim)) = schema.dimension(&column.name) {
            Field {
                ordinal,
                name: dim.name.clone(),
                datatype: dim.datatype,
                var_len: dim.var_len,
                nullable: false,
                column_type: column.column_type,
                kind: FieldKind::Dimension { position },
            }
        } else {
            return Err(Error::Schema(format!(
                "column '{}' is neither an attribute nor a dimension",
                column.name
            )));
        };
        fields.push(field);
    }
    Ok(fields)
}
