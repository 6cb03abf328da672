use thiserror::Error;

use arrayscan_io::StorageError;

/// Result type local to arrayscan-exec.
pub type Result<T> = std::result::Result<T, ScanError>;

/// Every way a scan can fail.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Malformed predicate, unsupported datatype or bad schema.
    #[error(transparent)]
    Contract(#[from] arrayscan_core::error::Error),

    #[error("storage engine error: {0}")]
    Storage(#[from] StorageError),

    /// Growing the read buffers was refused.
    #[error("cannot complete scan: {0}")]
    CannotComplete(#[from] arrayscan_mem::error::Error),

    #[error("no current row; advance the cursor first")]
    NoCurrentRow,

    #[error("field ordinal {0} out of range")]
    FieldOutOfRange(usize),
}
