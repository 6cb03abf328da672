#![forbid(unsafe_code)]
//! arrayscan-core: shared vocabulary for the array scan cursor.
//!
//! Pure data and pure functions only. The storage engine interface lives in
//! `arrayscan-io`, buffer management in `arrayscan-mem`, and the cursor itself
//! in `arrayscan-exec`.

pub mod budget;
pub mod config;
pub mod error;
pub mod field;
pub mod id;
pub mod predicate;
pub mod prelude;
pub mod schema;
pub mod types;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
