use thiserror::Error;

use crate::schema::Datatype;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    /// A caller broke an invariant that well-formed predicates never break.
    #[error("Contract violation: {0}")]
    Contract(String),

    #[error("Unsupported datatype {0:?} for {1}")]
    UnsupportedDatatype(Datatype, &'static str),

    #[error("Cannot coerce {value} into {datatype:?}")]
    Coercion { value: String, datatype: Datatype },

    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e.to_string())
    }
}
