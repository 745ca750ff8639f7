//! Error types for flag descriptors and flag codings.

use thiserror::Error;

/// Errors that can occur while reading, validating or decoding flag metadata.
#[derive(Error, Debug)]
pub enum FlagError {
    /// The descriptor violates one of its structural invariants.
    #[error("malformed flag descriptor: {0}")]
    MalformedDescriptor(String),

    /// A required attribute is absent or has the wrong JSON type.
    #[error("missing or invalid attribute '{name}': {message}")]
    InvalidAttribute { name: String, message: String },

    /// A mask value is neither a single bit nor the 32-bit sign bit.
    #[error("invalid flag mask {0}: must have exactly one bit set")]
    InvalidMask(i64),

    /// A flag name is not part of the coding.
    #[error("unknown flag '{0}'")]
    UnknownFlag(String),

    /// A flag coding name is not present in the registry.
    #[error("unknown flag coding '{0}'")]
    UnknownCoding(String),

    /// Registry document could not be parsed.
    #[error("invalid flag-coding registry: {0}")]
    Registry(String),

    /// IO error while reading a descriptor or registry file.
    #[error("io error: {0}")]
    Io(String),
}

impl FlagError {
    /// Create a MalformedDescriptor error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedDescriptor(msg.into())
    }

    /// Create an InvalidAttribute error.
    pub fn invalid_attribute(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a Registry error.
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }
}

impl From<std::io::Error> for FlagError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for FlagError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedDescriptor(err.to_string())
    }
}

impl From<serde_yaml::Error> for FlagError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Registry(err.to_string())
    }
}

/// Result type for flag operations.
pub type Result<T> = std::result::Result<T, FlagError>;
