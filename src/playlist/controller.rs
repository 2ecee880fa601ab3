//! Playlist ordering policies
//!
//! A policy decides which index follows (or precedes) the current one.
//! Streams consult an installed policy and fall back to
//! [`SimplePlaylistController`] when none is installed.

use rand::Rng;

use super::list::Playlist;

/// Chooses the next/previous playlist index
pub trait OrderingPolicy: Send + Sync {
    /// Index to play after `current`, `None` when playback should end
    fn next_index(&self, playlist: &Playlist, current: i32) -> Option<usize>;

    /// Index to play before `current`, `None` when there is none
    fn previous_index(&self, playlist: &Playlist, current: i32) -> Option<usize>;
}

/// Default policy honoring the playlist's repeat/random/rewind flags
///
/// - repeat: stay on the current item
/// - random: jump to a different random item
/// - rewind: wrap around at either end
#[derive(Debug, Default, Clone, Copy)]
pub struct SimplePlaylistController;

impl SimplePlaylistController {
    fn random_other(size: usize, current: i32) -> usize {
        let mut rng = rand::thread_rng();
        loop {
            let pick = rng.gen_range(0..size);
            if pick as i32 != current {
                return pick;
            }
        }
    }
}

impl OrderingPolicy for SimplePlaylistController {
    fn next_index(&self, playlist: &Playlist, current: i32) -> Option<usize> {
        let size = playlist.size();
        if size == 0 {
            return None;
        }
        let current = current.max(-1);

        if playlist.is_repeat() && current >= 0 && (current as usize) < size {
            return Some(current as usize);
        }
        if playlist.is_random() && size > 1 {
            return Some(Self::random_other(size, current));
        }

        let next = (current + 1) as usize;
        if next < size {
            Some(next)
        } else if playlist.is_rewind() {
            Some(0)
        } else {
            None
        }
    }

    fn previous_index(&self, playlist: &Playlist, current: i32) -> Option<usize> {
        let size = playlist.size();
        if size == 0 {
            return None;
        }
        let current = current.min(size as i32 - 1);

        if playlist.is_repeat() && current >= 0 {
            return Some(current as usize);
        }
        if playlist.is_random() && size > 1 {
            return Some(Self::random_other(size, current));
        }

        if current > 0 {
            Some((current - 1) as usize)
        } else if playlist.is_rewind() {
            Some(size - 1)
        } else {
            None
        }
    }
}
