//! Provider registry
//!
//! Resolves stream names to inputs. On-demand names are registered up
//! front and get a fresh source (own cursor) per request; live names get a
//! shared [`LiveSource`], created on first request when asked to.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::messaging::{Message, MessageSource};
use crate::stream::ServerStream;

use super::error::RegistryError;
use super::key::StreamKey;
use super::source::{LiveSource, MemorySource};

/// Resolves inputs for server streams
pub trait ProviderRegistry: Send + Sync {
    /// On-demand input for `key`, if one exists
    fn vod_input(&self, key: &StreamKey) -> Option<Arc<dyn MessageSource>>;

    /// Live input for `key`, created first if `create` is set
    fn live_input(&self, key: &StreamKey, create: bool) -> Option<Arc<dyn MessageSource>>;

    /// Publish `stream` under `key`
    fn register_broadcast(&self, key: &StreamKey, stream: &Arc<ServerStream>) -> bool;
}

type VodFactory = Arc<dyn Fn() -> Arc<dyn MessageSource> + Send + Sync>;

/// In-memory provider registry
///
/// Thread-safe via `RwLock`; lookups vastly outnumber registrations.
#[derive(Default)]
pub struct ProviderStore {
    vod: RwLock<HashMap<StreamKey, VodFactory>>,
    live: RwLock<HashMap<StreamKey, Arc<LiveSource>>>,
    broadcasts: RwLock<HashMap<StreamKey, Weak<ServerStream>>>,
}

impl ProviderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an on-demand stream served from `messages`
    pub fn register_vod(&self, key: StreamKey, messages: Vec<Message>) -> Result<(), RegistryError> {
        let messages = Arc::new(messages);
        self.register_vod_with(key, move || {
            Arc::new(MemorySource::shared(Arc::clone(&messages))) as Arc<dyn MessageSource>
        })
    }

    /// Register an on-demand stream whose inputs come from `factory`
    pub fn register_vod_with<F>(&self, key: StreamKey, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Arc<dyn MessageSource> + Send + Sync + 'static,
    {
        let mut vod = self.vod.write();
        if vod.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered(key));
        }
        tracing::info!(stream = %key, "On-demand source registered");
        vod.insert(key, Arc::new(factory));
        Ok(())
    }

    pub fn unregister_vod(&self, key: &StreamKey) -> Result<(), RegistryError> {
        self.vod
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| RegistryError::StreamNotFound(key.clone()))
    }

    /// Live source for `key`, creating it if needed
    pub fn live_source(&self, key: &StreamKey) -> Arc<LiveSource> {
        if let Some(live) = self.live.read().get(key) {
            return Arc::clone(live);
        }
        let mut live = self.live.write();
        Arc::clone(live.entry(key.clone()).or_insert_with(|| {
            tracing::info!(stream = %key, "Live source created");
            Arc::new(LiveSource::new())
        }))
    }

    pub fn remove_live(&self, key: &StreamKey) -> Option<Arc<LiveSource>> {
        self.live.write().remove(key)
    }

    /// Registered stream for `key`, if it is still alive
    pub fn broadcast(&self, key: &StreamKey) -> Option<Arc<ServerStream>> {
        self.broadcasts.read().get(key).and_then(Weak::upgrade)
    }

    pub fn unregister_broadcast(&self, key: &StreamKey) -> Result<(), RegistryError> {
        self.broadcasts
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| RegistryError::StreamNotFound(key.clone()))
    }

    /// Drop broadcast entries whose stream no longer exists
    pub fn cleanup(&self) -> usize {
        let mut broadcasts = self.broadcasts.write();
        let before = broadcasts.len();
        broadcasts.retain(|key, stream| {
            let alive = stream.strong_count() > 0;
            if !alive {
                tracing::info!(stream = %key, "Broadcast removed by cleanup");
            }
            alive
        });
        before - broadcasts.len()
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.read().len()
    }
}

impl ProviderRegistry for ProviderStore {
    fn vod_input(&self, key: &StreamKey) -> Option<Arc<dyn MessageSource>> {
        let factory = self.vod.read().get(key).cloned()?;
        Some(factory())
    }

    fn live_input(&self, key: &StreamKey, create: bool) -> Option<Arc<dyn MessageSource>> {
        if create {
            return Some(self.live_source(key) as Arc<dyn MessageSource>);
        }
        self.live
            .read()
            .get(key)
            .map(|live| Arc::clone(live) as Arc<dyn MessageSource>)
    }

    fn register_broadcast(&self, key: &StreamKey, stream: &Arc<ServerStream>) -> bool {
        let mut broadcasts = self.broadcasts.write();
        if let Some(existing) = broadcasts.get(key) {
            if existing.strong_count() > 0 && !std::ptr::eq(existing.as_ptr(), Arc::as_ptr(stream)) {
                let err = RegistryError::StreamAlreadyPublishing(key.clone());
                tracing::warn!(stream = %key, error = %err, "Broadcast registration refused");
                return false;
            }
        }
        broadcasts.insert(key.clone(), Arc::downgrade(stream));
        tracing::info!(stream = %key, "Broadcast registered");
        true
    }
}
