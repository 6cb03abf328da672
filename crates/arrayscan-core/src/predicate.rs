//! Relational predicate model: per-column sets of disjoint value ranges.
//!
//! This is the shape in which the relational engine pushes constraints down.
//! The cursor only ever reads it; nothing here knows about the storage engine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::schema::RelationalType;
use crate::types::Value;

/// How a marker relates to its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bound {
    /// Just above the value (exclusive lower end).
    Above,
    /// The value itself (inclusive).
    Exactly,
    /// Just below the value (exclusive upper end).
    Below,
}

/// One end of a range. A missing value means unbounded on that side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub value: Option<Value>,
    pub bound: Bound,
}

impl Marker {
    pub fn unbounded() -> Self {
        Self {
            value: None,
            bound: Bound::Exactly,
        }
    }

    pub fn exactly(value: Value) -> Self {
        Self {
            value: Some(value),
            bound: Bound::Exactly,
        }
    }

    pub fn above(value: Value) -> Self {
        Self {
            value: Some(value),
            bound: Bound::Above,
        }
    }

    pub fn below(value: Value) -> Self {
        Self {
            value: Some(value),
            bound: Bound::Below,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.value.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub low: Marker,
    pub high: Marker,
}

impl ValueRange {
    pub fn new(low: Marker, high: Marker) -> Self {
        Self { low, high }
    }

    /// Equality constraint.
    pub fn single(value: Value) -> Self {
        Self {
            low: Marker::exactly(value.clone()),
            high: Marker::exactly(value),
        }
    }

    pub fn all() -> Self {
        Self {
            low: Marker::unbounded(),
            high: Marker::unbounded(),
        }
    }

    pub fn greater_than(value: Value) -> Self {
        Self::new(Marker::above(value), Marker::unbounded())
    }

    pub fn greater_than_or_equal(value: Value) -> Self {
        Self::new(Marker::exactly(value), Marker::unbounded())
    }

    pub fn less_than(value: Value) -> Self {
        Self::new(Marker::unbounded(), Marker::below(value))
    }

    pub fn less_than_or_equal(value: Value) -> Self {
        Self::new(Marker::unbounded(), Marker::exactly(value))
    }

    pub fn is_single_value(&self) -> bool {
        self.low.bound == Bound::Exactly
            && self.high.bound == Bound::Exactly
            && self.low.value.is_some()
            && self.low.value == self.high.value
    }
}

/// The set of values a column may take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Domain {
    /// No constraint.
    All,
    /// Nothing matches.
    None,
    /// Ordered, disjoint ranges.
    Ranges(Vec<ValueRange>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDomain {
    pub column_type: RelationalType,
    pub domain: Domain,
}

impl ColumnDomain {
    pub fn new(column_type: RelationalType, domain: Domain) -> Self {
        Self {
            column_type,
            domain,
        }
    }

    pub fn ranges(column_type: RelationalType, ranges: Vec<ValueRange>) -> Self {
        Self::new(column_type, Domain::Ranges(ranges))
    }

    pub fn is_all(&self) -> bool {
        match &self.domain {
            Domain::All => true,
            Domain::Ranges(ranges) => ranges
                .iter()
                .any(|r| r.low.is_unbounded() && r.high.is_unbounded()),
            Domain::None => false,
        }
    }
}

/// Column name -> constraint. Columns without an entry are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TupleDomain {
    domains: HashMap<String, ColumnDomain>,
}

impl TupleDomain {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, domain: ColumnDomain) -> Self {
        self.domains.insert(column.into(), domain);
        self
    }

    pub fn get(&self, column: &str) -> Option<&ColumnDomain> {
        self.domains.get(column)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}
