//! Playlists
//!
//! This module provides:
//! - Play items (name, start offset, optional length, tie-break timestamp)
//! - A copy-on-write playlist with an advisory current-item cursor
//! - Ordering policies for next/previous navigation

pub mod controller;
pub mod item;
pub mod list;

pub use controller::{OrderingPolicy, SimplePlaylistController};
pub use item::PlayItem;
pub use list::Playlist;
