use std::fmt;

/// Result type for minerva operations
pub type Result<T> = std::result::Result<T, MinervaError>;

/// Main error type for the minerva library.
///
/// Configuration problems (out-of-range layer or neuron counts, negative
/// rates) never show up here: they are clamped into range at construction.
/// Errors are reserved for I/O and serialization.
#[derive(Debug, Clone)]
pub enum MinervaError {
    /// IO errors (file operations)
    IoError(String),

    /// Serialization/deserialization errors
    SerializationError(String),
}

impl fmt::Display for MinervaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinervaError::IoError(msg) => write!(f, "IO error: {}", msg),
            MinervaError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for MinervaError {}

// Conversion from std::io::Error
impl From<std::io::Error> for MinervaError {
    fn from(err: std::io::Error) -> Self {
        MinervaError::IoError(err.to_string())
    }
}

// Conversion from bincode::Error
impl From<bincode::Error> for MinervaError {
    fn from(err: bincode::Error) -> Self {
        MinervaError::SerializationError(err.to_string())
    }
}
