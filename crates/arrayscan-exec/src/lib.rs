#![forbid(unsafe_code)]
//! arrayscan-exec: the record cursor and everything it drives.
//!
//! `RecordCursor` resolves predicates into per-dimension ranges, sizes and
//! grows the native buffers, loops submits until a batch is ready and decodes
//! the batch for typed per-row access. Per-operation timings are collected
//! when stats are enabled.

pub mod cursor;
pub mod decode;
pub mod error;
pub mod metrics;
pub mod ranges;

pub use cursor::RecordCursor;
pub use decode::{
    datetime_from_relational, datetime_to_relational, Batch, DecodedColumn, Rounding,
};
pub use error::{Result, ScanError};
pub use metrics::{TimingReport, Timings};
pub use ranges::{bounds_for_dimension, bounds_for_range};
