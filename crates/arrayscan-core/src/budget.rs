//! Abstract memory probe interface.
//!
//! The concrete system-backed probe lives in `arrayscan-mem`. Only the trait
//! lives here so any crate can depend on the API without pulling `sysinfo`.

/// A reading of how much memory the host can still hand out.
///
/// Readings are best-effort snapshots: other scans may allocate between the
/// reading and the allocation it guards.
pub trait MemoryProbe: Send + Sync {
    /// Bytes currently available to new allocations.
    fn available_bytes(&self) -> u64;
}

impl<P: MemoryProbe + ?Sized> MemoryProbe for Box<P> {
    fn available_bytes(&self) -> u64 {
        (**self).available_bytes()
    }
}

impl<P: MemoryProbe + ?Sized> MemoryProbe for std::sync::Arc<P> {
    fn available_bytes(&self) -> u64 {
        (**self).available_bytes()
    }
}
