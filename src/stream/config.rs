//! Server stream configuration

/// Server stream configuration options
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Scope the stream and its items are resolved in
    pub scope: String,

    /// Name the stream is broadcast under
    pub published_name: Option<String>,

    /// Frames due within this many milliseconds are sent immediately
    pub wait_threshold: i64,

    /// Keep interframes in the codec buffers (not only the keyframe)
    pub buffer_interframes: bool,

    /// Initial playlist repeat flag
    pub repeat: bool,

    /// Initial playlist random flag
    pub random: bool,

    /// Initial playlist rewind flag
    pub rewind: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            scope: "live".to_string(),
            published_name: None,
            wait_threshold: 0,
            buffer_interframes: false,
            repeat: false,
            random: false,
            rewind: false,
        }
    }
}

impl StreamConfig {
    /// Create a config publishing under `name`
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            published_name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Set the scope
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Set the published name
    pub fn published_name(mut self, name: impl Into<String>) -> Self {
        self.published_name = Some(name.into());
        self
    }

    /// Set the dispatch-immediately threshold (negative values clamp to 0)
    pub fn wait_threshold(mut self, ms: i64) -> Self {
        self.wait_threshold = ms.max(0);
        self
    }

    /// Enable interframe buffering
    pub fn buffer_interframes(mut self, enabled: bool) -> Self {
        self.buffer_interframes = enabled;
        self
    }

    pub fn repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn random(mut self, random: bool) -> Self {
        self.random = random;
        self
    }

    pub fn rewind(mut self, rewind: bool) -> Self {
        self.rewind = rewind;
        self
    }
}
