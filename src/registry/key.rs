//! Stream identity

use std::fmt;

/// Unique identifier for a stream (scope + stream name)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    /// Scope / application name (e.g., "live")
    pub scope: String,
    /// Stream name (e.g., "channel1")
    pub name: String,
}

impl StreamKey {
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.name)
    }
}
