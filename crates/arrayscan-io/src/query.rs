//! Storage engine interface consumed by the cursor.
//!
//! One `ArrayQuery` is an open array plus one read query against it. The
//! cursor owns it exclusively and closes it exactly once.

use serde::{Deserialize, Serialize};

use arrayscan_core::schema::ArraySchema;
use arrayscan_core::types::NativeValue;
use arrayscan_mem::{BufferLayout, FieldBuffers, ResultEstimate};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStatus {
    Uninitialized,
    /// Buffers were too small for the whole result; submit again.
    Incomplete,
    Completed,
}

/// Elements written to a field's buffers by the last submit.
///
/// For variable-length fields `offsets` counts cells and `values` counts
/// bytes; fixed-length fields report `offsets == 0` and `values` in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultElements {
    pub offsets: u64,
    pub values: u64,
}

pub trait ArrayQuery {
    fn schema(&self) -> Result<ArraySchema>;

    /// Bounding box of populated cells, one `(low, high)` per dimension in
    /// domain order. `None` when the array holds no cells.
    fn non_empty_domain(&self) -> Result<Option<Vec<(NativeValue, NativeValue)>>>;

    /// Value elements of a fixed-length, non-nullable field.
    fn est_result_size(&self, name: &str) -> Result<u64>;

    /// `(values, validity)` elements of a fixed-length, nullable field.
    fn est_result_size_nullable(&self, name: &str) -> Result<(u64, u64)>;

    /// `(offsets, values)` elements of a variable-length field.
    fn est_result_size_var(&self, name: &str) -> Result<(u64, u64)>;

    /// `(offsets, values, validity)` elements of a variable-length, nullable field.
    fn est_result_size_var_nullable(&self, name: &str) -> Result<(u64, u64, u64)>;

    /// Restrict a fixed-length dimension to `[low, high]`.
    fn add_range(&mut self, dim: usize, low: &NativeValue, high: &NativeValue) -> Result<()>;

    /// Restrict a variable-length dimension to `[low, high]`.
    fn add_range_var(&mut self, dim: usize, low: &[u8], high: &[u8]) -> Result<()>;

    /// Register buffer capacities for a field. Offsets and validity are
    /// present exactly when the field is variable-length / nullable.
    fn set_buffer(&mut self, name: &str, layout: BufferLayout) -> Result<()>;

    /// Forget every registered buffer.
    fn reset_buffers(&mut self);

    /// Run the query, writing into `buffers` (one entry per registered field).
    fn submit(&mut self, buffers: &mut [FieldBuffers]) -> Result<QueryStatus>;

    fn status(&self) -> QueryStatus;

    /// Per-field element counts of the last submit, in registration order.
    fn result_buffer_elements(&self) -> Result<Vec<(String, ResultElements)>>;

    fn set_stats_enabled(&mut self, _enabled: bool) {}

    /// Engine-internal statistics, if the engine keeps any.
    fn dump_stats(&self) -> Option<String> {
        None
    }

    /// Release the query and the array it was opened on.
    fn close(&mut self) -> Result<()>;

    /// Pick the estimate variant matching the field's shape.
    fn estimate(&self, name: &str, var_len: bool, nullable: bool) -> Result<ResultEstimate> {
        Ok(match (var_len, nullable) {
            (true, true) => {
                let (offsets, values, validity) = self.est_result_size_var_nullable(name)?;
                ResultEstimate::var(offsets, values).with_validity(validity)
            }
            (true, false) => {
                let (offsets, values) = self.est_result_size_var(name)?;
                ResultEstimate::var(offsets, values)
            }
            (false, true) => {
                let (values, validity) = self.est_result_size_nullable(name)?;
                ResultEstimate::fixed(values).with_validity(validity)
            }
            (false, false) => ResultEstimate::fixed(self.est_result_size(name)?),
        })
    }
}
