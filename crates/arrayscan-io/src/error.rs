use thiserror::Error;

use arrayscan_core::schema::Datatype;

/// Result type local to arrayscan-io.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Any failure reported by the storage engine.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("unknown attribute or dimension '{0}'")]
    UnknownField(String),

    #[error("dimension index {0} out of range")]
    DimensionOutOfRange(usize),

    #[error("'{name}' expects {expected:?} values, got {got}")]
    DatatypeMismatch {
        name: String,
        expected: Datatype,
        got: String,
    },

    #[error("invalid range on dimension {dim}: {reason}")]
    InvalidRange { dim: usize, reason: String },

    #[error("no buffer set for '{0}'")]
    BufferNotSet(String),

    #[error("{buffer} buffer of '{name}' holds {capacity} elements, {required} registered")]
    BufferTooSmall {
        name: String,
        buffer: &'static str,
        capacity: usize,
        required: usize,
    },

    #[error("invalid cell: {0}")]
    InvalidCell(String),

    #[error("query is closed")]
    Closed,

    #[error("storage backend error: {0}")]
    Backend(String),
}
