#![forbid(unsafe_code)]
//! arrayscan-mem: native read buffers and their growth policy.
//!
//! Buffers are sized once from the storage engine's result estimate, clamped
//! to a per-field byte cap, and afterwards only ever double. Every doubling
//! passes a feasibility gate against the host's available memory first.
//!
//! The storage engine writes into these buffers during a submit; the cursor
//! owns them for the whole scan.

pub mod buffer;
pub mod error;
pub mod gate;
pub mod manager;
pub mod sizing;
pub mod tracking;

pub use buffer::{BufferLayout, BufferSet, FieldBuffers, NativeBuffer};
pub use gate::{FixedMemory, GrowthGate, SystemMemory};
pub use manager::{buffer_stats, footprint, BufferManager};
pub use sizing::{clamped_elements, ResultEstimate};
pub use tracking::FootprintTracker;
