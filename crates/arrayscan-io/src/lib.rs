#![forbid(unsafe_code)]
//! arrayscan-io: the storage engine seam.
//!
//! `query::ArrayQuery` is everything the cursor needs from an array storage
//! engine: schema reflection, result-size estimation, range and buffer
//! registration, and the submit/status protocol. `memory_array` implements it
//! over cells held in memory, with tile-granular submits so incomplete
//! queries behave like they do against a real engine.

pub mod error;
pub mod memory_array;
pub mod query;

pub use error::{Result, StorageError};
pub use memory_array::{MemoryArray, MemoryArrayBuilder, MemoryQuery};
pub use query::{ArrayQuery, QueryStatus, ResultElements};
