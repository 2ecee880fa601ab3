//! In-memory sources
//!
//! [`MemorySource`] serves a fixed list of messages on demand (pull mode)
//! and honors `init`/`seek` control messages. [`LiveSource`] fans published
//! messages out to subscribed consumers (push mode) and never yields
//! anything when pulled.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::Result;
use crate::messaging::pipe::same_consumer;
use crate::messaging::{ControlMessage, Message, MessageConsumer, MessageSource};

#[derive(Default)]
struct Cursor {
    position: usize,
    controls: Vec<ControlMessage>,
    subscribers: Vec<Arc<dyn MessageConsumer>>,
}

/// Seekable on-demand source backed by a message list
pub struct MemorySource {
    messages: Arc<Vec<Message>>,
    cursor: Mutex<Cursor>,
}

impl MemorySource {
    pub fn new(messages: Vec<Message>) -> Self {
        Self::shared(Arc::new(messages))
    }

    /// Create a source over a shared message list
    pub fn shared(messages: Arc<Vec<Message>>) -> Self {
        Self {
            messages,
            cursor: Mutex::new(Cursor::default()),
        }
    }

    /// Index of the next message to be pulled
    pub fn position(&self) -> usize {
        self.cursor.lock().position
    }

    /// Control messages received so far
    pub fn controls(&self) -> Vec<ControlMessage> {
        self.cursor.lock().controls.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.cursor.lock().subscribers.len()
    }

    /// First index whose media timestamp is at or after `target`
    fn index_at(&self, target: i64) -> usize {
        self.messages
            .iter()
            .position(|m| matches!(m.packet(), Some(p) if p.timestamp as i64 >= target))
            .unwrap_or(self.messages.len())
    }
}

impl MessageSource for MemorySource {
    fn pull(&self) -> Result<Option<Message>> {
        let mut cursor = self.cursor.lock();
        let message = self.messages.get(cursor.position).cloned();
        if message.is_some() {
            cursor.position += 1;
        }
        Ok(message)
    }

    fn subscribe(
        &self,
        consumer: Arc<dyn MessageConsumer>,
        _params: Option<HashMap<String, String>>,
    ) -> bool {
        let mut cursor = self.cursor.lock();
        if cursor.subscribers.iter().any(|c| same_consumer(c, &consumer)) {
            return false;
        }
        cursor.subscribers.push(consumer);
        true
    }

    fn unsubscribe(&self, consumer: &Arc<dyn MessageConsumer>) -> bool {
        let mut cursor = self.cursor.lock();
        let before = cursor.subscribers.len();
        cursor.subscribers.retain(|c| !same_consumer(c, consumer));
        cursor.subscribers.len() != before
    }

    fn send_control(&self, _consumer: &Arc<dyn MessageConsumer>, message: ControlMessage) {
        let mut cursor = self.cursor.lock();
        if let Some(target) = message.target_timestamp() {
            let position = self.index_at(target);
            tracing::debug!(control = %message, position = position, "Repositioning source");
            cursor.position = position;
        }
        cursor.controls.push(message);
    }
}

/// Push-mode source for live broadcasts
pub struct LiveSource {
    consumers: RwLock<Vec<Arc<dyn MessageConsumer>>>,
}

impl LiveSource {
    pub fn new() -> Self {
        Self {
            consumers: RwLock::new(Vec::new()),
        }
    }

    /// Push `message` to every subscribed consumer
    ///
    /// Returns the number of consumers that accepted it.
    pub fn publish(&self, message: Message) -> usize {
        let consumers = self.consumers.read().clone();
        let mut delivered = 0;
        for consumer in consumers {
            match consumer.push_message(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(error = %e, "Live consumer rejected message"),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.consumers.read().len()
    }
}

impl Default for LiveSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageSource for LiveSource {
    fn pull(&self) -> Result<Option<Message>> {
        Ok(None)
    }

    fn subscribe(
        &self,
        consumer: Arc<dyn MessageConsumer>,
        _params: Option<HashMap<String, String>>,
    ) -> bool {
        let mut consumers = self.consumers.write();
        if consumers.iter().any(|c| same_consumer(c, &consumer)) {
            return false;
        }
        consumers.push(consumer);
        true
    }

    fn unsubscribe(&self, consumer: &Arc<dyn MessageConsumer>) -> bool {
        let mut consumers = self.consumers.write();
        let before = consumers.len();
        consumers.retain(|c| !same_consumer(c, consumer));
        consumers.len() != before
    }

    fn send_control(&self, _consumer: &Arc<dyn MessageConsumer>, message: ControlMessage) {
        tracing::debug!(control = %message, "Control message ignored by live source");
    }
}
