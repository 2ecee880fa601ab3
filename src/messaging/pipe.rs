//! Pipe endpoints
//!
//! Traits for the collaborators on either side of a stream: upstream
//! sources (pull or push), the downstream sink, and listeners that observe
//! every media packet.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::registry::StreamKey;

use super::message::{ControlMessage, MediaPacket, Message};

/// Receives messages pushed by a source
pub trait MessageConsumer: Send + Sync {
    fn push_message(&self, message: Message) -> Result<()>;
}

/// Upstream end of a pipe
pub trait MessageSource: Send + Sync {
    /// Pull the next message, `None` when nothing is available
    fn pull(&self) -> Result<Option<Message>>;

    /// Attach a consumer; push-mode sources deliver to it from now on
    fn subscribe(
        &self,
        consumer: Arc<dyn MessageConsumer>,
        params: Option<HashMap<String, String>>,
    ) -> bool;

    /// Detach a consumer previously passed to [`subscribe`](Self::subscribe)
    fn unsubscribe(&self, consumer: &Arc<dyn MessageConsumer>) -> bool;

    /// Deliver an out-of-band control message from `consumer`
    fn send_control(&self, consumer: &Arc<dyn MessageConsumer>, message: ControlMessage);
}

/// Downstream end of a pipe
pub trait MessageSink: Send + Sync {
    fn push(&self, message: Message) -> Result<()>;

    /// Called when the providing stream detaches from this sink
    fn unsubscribe(&self) {}
}

/// Observer of every media packet a stream dispatches
pub trait StreamListener: Send + Sync {
    fn packet_received(&self, stream: &StreamKey, packet: &MediaPacket) -> Result<()>;
}

/// Compare two consumers by identity
pub fn same_consumer(a: &Arc<dyn MessageConsumer>, b: &Arc<dyn MessageConsumer>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
