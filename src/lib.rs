#![forbid(unsafe_code)]
//! arrayscan: a record cursor over sparse/dense multi-dimensional arrays.
//!
//! This facade re-exports the workspace crates; most users only need
//! [`RecordCursor`], an [`ArrayQuery`] implementation and a [`ScanConfig`].

pub use arrayscan_core::prelude::*;
pub use arrayscan_exec::{RecordCursor, ScanError};
pub use arrayscan_io::{ArrayQuery, MemoryArray, QueryStatus, ResultElements, StorageError};
