//! Registry error types

use super::key::StreamKey;

/// Error type for provider registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Nothing registered under this key
    StreamNotFound(StreamKey),
    /// A live broadcast is already registered under this key
    StreamAlreadyPublishing(StreamKey),
    /// An on-demand source is already registered under this key
    AlreadyRegistered(StreamKey),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::StreamNotFound(key) => write!(f, "Stream not found: {}", key),
            RegistryError::StreamAlreadyPublishing(key) => {
                write!(f, "Stream already has a publisher: {}", key)
            }
            RegistryError::AlreadyRegistered(key) => {
                write!(f, "Source already registered: {}", key)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
