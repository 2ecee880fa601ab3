//! Play items

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// One entry of a playlist
///
/// `start` is an offset into the source in milliseconds; negative values
/// are treated as zero for on-demand playback. `length` bounds how long the
/// item plays; `None` plays until the source runs dry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayItem {
    name: String,
    start: i64,
    length: Option<u64>,
    created: Option<i64>,
}

impl PlayItem {
    /// Create an unbounded item playing `name` from the beginning
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: 0,
            length: None,
            created: Some(now_millis()),
        }
    }

    /// Set the start offset in milliseconds
    pub fn start(mut self, start: i64) -> Self {
        self.start = start;
        self
    }

    /// Bound the item to `length` milliseconds
    pub fn length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    /// Set or clear the ordering tie-break timestamp
    pub fn created(mut self, created: Option<i64>) -> Self {
        self.created = created;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_offset(&self) -> i64 {
        self.start
    }

    pub fn length_ms(&self) -> Option<u64> {
        self.length
    }

    /// Ordering tie-break timestamp
    pub fn created_at(&self) -> Option<i64> {
        self.created
    }

    pub(crate) fn set_created(&mut self, created: i64) {
        self.created = Some(created);
    }
}

impl fmt::Display for PlayItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.length {
            Some(len) => write!(f, "{} [{}+{}ms]", self.name, self.start, len),
            None => write!(f, "{} [{}+]", self.name, self.start),
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
