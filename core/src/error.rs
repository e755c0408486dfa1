use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProfilerError {
    /// A required argument was absent
    #[error("Invalid argument: `{param}` must be present")]
    InvalidArgument { param: &'static str },

    /// Error (de)serializing a profiling session
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error loading or parsing options
    #[error("Config error: {0}")]
    Config(String),

    /// Error in a storage backend
    #[error("Storage error: {0}")]
    Storage(String),

    /// No profiler or session with this id
    #[error("No profiler found with id {0}")]
    NotFound(Uuid),
}

impl ProfilerError {
    /// Name of the missing parameter for [`ProfilerError::InvalidArgument`].
    pub fn param(&self) -> Option<&'static str> {
        match self {
            ProfilerError::InvalidArgument { param } => Some(param),
            _ => None,
        }
    }
}

/// Result type for profiler operations
pub type Result<T> = std::result::Result<T, ProfilerError>;
