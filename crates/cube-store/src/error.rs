//! Error types for cube store inspection.

use flag_coding::FlagError;
use thiserror::Error;

/// Errors that can occur while reading a cube store.
#[derive(Error, Debug)]
pub enum CubeStoreError {
    /// The store path does not exist.
    #[error("store not found: {0}")]
    NotFound(String),

    /// The path exists but holds no Zarr metadata.
    #[error("not a Zarr store: {0}")]
    NotAStore(String),

    /// A metadata document is malformed.
    #[error("invalid metadata in {path}: {message}")]
    InvalidMetadata { path: String, message: String },

    /// Two arrays disagree on the size of a shared dimension.
    #[error("dimension '{dim}' has conflicting sizes {first} and {second}")]
    DimensionConflict { dim: String, first: u64, second: u64 },

    /// A variable is not present in the store.
    #[error("variable not found: {0}")]
    VariableNotFound(String),

    /// The variable is not a usable flag band.
    #[error("invalid flag band '{name}': {source}")]
    FlagBand {
        name: String,
        #[source]
        source: FlagError,
    },

    /// The array's data type cannot hold flag values.
    #[error("unsupported data type for flag band: {0}")]
    UnsupportedDataType(String),

    /// The dataset does not satisfy the cube conventions.
    #[error("{0}")]
    InvalidCube(String),

    /// Zarr array access error.
    #[error("Zarr error: {0}")]
    Zarr(String),

    /// Storage/IO error.
    #[error("storage error: {0}")]
    Io(String),

    /// A value could not be converted to JSON.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CubeStoreError {
    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a FlagBand error.
    pub fn flag_band(name: impl Into<String>, source: FlagError) -> Self {
        Self::FlagBand {
            name: name.into(),
            source,
        }
    }

    /// Create a Zarr error.
    pub fn zarr(msg: impl Into<String>) -> Self {
        Self::Zarr(msg.into())
    }
}

impl From<std::io::Error> for CubeStoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<walkdir::Error> for CubeStoreError {
    fn from(err: walkdir::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CubeStoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for cube store operations.
pub type Result<T> = std::result::Result<T, CubeStoreError>;
