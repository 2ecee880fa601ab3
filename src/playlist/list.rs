//! Playlist with a current-item cursor
//!
//! Items are kept in a copy-on-write vector: readers take an `Arc` snapshot
//! and never observe a half-applied mutation. The cursor is advisory; a
//! reader that needs the cursor and the items to agree must serialize with
//! writers itself.
//!
//! Cursor rules:
//! - `-1` means no item selected
//! - inserting at or before the cursor shifts it right by one
//! - removing before or at the cursor shifts it left by one
//! - removing everything resets it to `0`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::item::PlayItem;

#[derive(Debug)]
struct Entries {
    items: Arc<Vec<Arc<PlayItem>>>,
    current_index: i32,
}

/// Ordered play items plus playback flags
#[derive(Debug)]
pub struct Playlist {
    entries: RwLock<Entries>,
    current_item: RwLock<Option<Arc<PlayItem>>>,
    repeat: AtomicBool,
    random: AtomicBool,
    rewind: AtomicBool,
}

impl Playlist {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Entries {
                items: Arc::new(Vec::new()),
                current_index: -1,
            }),
            current_item: RwLock::new(None),
            repeat: AtomicBool::new(false),
            random: AtomicBool::new(false),
            rewind: AtomicBool::new(false),
        }
    }

    /// Append an item
    pub fn add_item(&self, item: PlayItem) {
        let mut entries = self.entries.write();
        let mut items = Vec::clone(&entries.items);
        items.push(Arc::new(item));
        entries.items = Arc::new(items);
    }

    /// Insert an item at `index`
    ///
    /// The inserted item takes over the tie-break timestamp of the item it
    /// displaces, minus one, so timestamp-ordered consumers sort it first.
    /// Returns `false` (and inserts nothing) if `index` is past the end.
    pub fn insert_item(&self, mut item: PlayItem, index: usize) -> bool {
        let mut entries = self.entries.write();
        if index > entries.items.len() {
            tracing::warn!(index = index, size = entries.items.len(), "Insert index out of range");
            return false;
        }

        if let Some(created) = entries.items.get(index).and_then(|prev| prev.created_at()) {
            item.set_created(created.saturating_sub(1));
        }

        let mut items = Vec::clone(&entries.items);
        items.insert(index, Arc::new(item));
        entries.items = Arc::new(items);

        if index as i32 <= entries.current_index {
            entries.current_index += 1;
        }
        true
    }

    /// Remove the item at `index`; out-of-range indexes are ignored
    ///
    /// Removing the current item moves the cursor back without selecting or
    /// stopping anything; the detached item stays the current item.
    pub fn remove_item(&self, index: usize) {
        let mut entries = self.entries.write();
        if index >= entries.items.len() {
            return;
        }

        let mut items = Vec::clone(&entries.items);
        items.remove(index);
        entries.items = Arc::new(items);

        // TODO: re-select (or stop) when the current item itself is removed
        if index as i32 <= entries.current_index {
            entries.current_index -= 1;
        }
    }

    /// Remove every item; the cursor goes to `0`, not `-1`
    pub fn remove_all_items(&self) {
        let mut entries = self.entries.write();
        entries.items = Arc::new(Vec::new());
        entries.current_index = 0;
    }

    pub fn size(&self) -> usize {
        self.entries.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Snapshot of the items
    pub fn items(&self) -> Arc<Vec<Arc<PlayItem>>> {
        Arc::clone(&self.entries.read().items)
    }

    pub fn item(&self, index: usize) -> Option<Arc<PlayItem>> {
        self.entries.read().items.get(index).cloned()
    }

    pub fn current_index(&self) -> i32 {
        self.entries.read().current_index
    }

    pub fn set_current_index(&self, index: i32) {
        self.entries.write().current_index = index;
    }

    pub fn current_item(&self) -> Option<Arc<PlayItem>> {
        self.current_item.read().clone()
    }

    pub fn set_current_item(&self, item: Option<Arc<PlayItem>>) {
        *self.current_item.write() = item;
    }

    /// Whether advancing would find another item
    pub fn has_more_items(&self, repeat: bool) -> bool {
        if repeat {
            return true;
        }
        let entries = self.entries.read();
        (entries.current_index + 1) < entries.items.len() as i32
    }

    pub fn is_repeat(&self) -> bool {
        self.repeat.load(Ordering::Relaxed)
    }

    pub fn set_repeat(&self, repeat: bool) {
        self.repeat.store(repeat, Ordering::Relaxed);
    }

    pub fn is_random(&self) -> bool {
        self.random.load(Ordering::Relaxed)
    }

    pub fn set_random(&self, random: bool) {
        self.random.store(random, Ordering::Relaxed);
    }

    pub fn is_rewind(&self) -> bool {
        self.rewind.load(Ordering::Relaxed)
    }

    pub fn set_rewind(&self, rewind: bool) {
        self.rewind.store(rewind, Ordering::Relaxed);
    }
}

impl Default for Playlist {
    fn default() -> Self {
        Self::new()
    }
}
