use thiserror::Error;

/// Result type local to arrayscan-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not enough memory to complete query: doubling {current} bytes of buffers needs more than {required} bytes, {available} available")]
    InsufficientMemory {
        current: u64,
        required: u64,
        available: u64,
    },

    #[error("buffer of {elements} elements x {width} bytes overflows the address space")]
    CapacityOverflow { elements: usize, width: usize },
}
