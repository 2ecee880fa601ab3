//! Collaborators a server stream depends on
//!
//! The stream owns none of these; they are handed in through
//! [`StreamServices`] when the stream is created.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::registry::{ProviderRegistry, StreamKey};
use crate::scheduling::{Clock, Timer};

use super::recording::RecordingFactory;

/// Stream lifecycle hooks of the hosting application
///
/// Every hook is optional. A hook that fails is logged and ignored.
pub trait StreamAwareHandler: Send + Sync {
    /// A stream started broadcasting with no recording attached
    fn stream_publish_start(&self, _stream: &StreamKey) -> Result<()> {
        Ok(())
    }

    /// A stream started broadcasting while recording
    fn stream_record_start(&self, _stream: &StreamKey) -> Result<()> {
        Ok(())
    }

    fn stream_broadcast_start(&self, _stream: &StreamKey) -> Result<()> {
        Ok(())
    }

    fn stream_broadcast_close(&self, _stream: &StreamKey) -> Result<()> {
        Ok(())
    }

    fn stream_record_stop(&self, _stream: &StreamKey) -> Result<()> {
        Ok(())
    }
}

/// Services handed to a server stream
#[derive(Clone)]
pub struct StreamServices {
    pub providers: Arc<dyn ProviderRegistry>,
    pub timer: Arc<dyn Timer>,
    pub clock: Arc<dyn Clock>,
    pub recorder: Option<Arc<dyn RecordingFactory>>,
    pub handler: Option<Arc<dyn StreamAwareHandler>>,
}

impl StreamServices {
    pub fn new(
        providers: Arc<dyn ProviderRegistry>,
        timer: Arc<dyn Timer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            providers,
            timer,
            clock,
            recorder: None,
            handler: None,
        }
    }

    /// Set the factory used by `save_as`
    pub fn recorder(mut self, factory: Arc<dyn RecordingFactory>) -> Self {
        self.recorder = Some(factory);
        self
    }

    /// Set the lifecycle hook handler
    pub fn handler(mut self, handler: Arc<dyn StreamAwareHandler>) -> Self {
        self.handler = Some(handler);
        self
    }
}

impl fmt::Debug for StreamServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamServices")
            .field("recorder", &self.recorder.is_some())
            .field("handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}
