//! Playlist pointer and the playlist payload pushed to the media source.

use crate::scan::MediaItem;
use playout_daemon_config::MediaConfig;
use serde_json::{json, Value};

/// Ordered, non-empty sequence of media items with a cursor.
///
/// The order is fixed at construction; only the index moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistOrder {
    items: Vec<MediaItem>,
    index: usize,
}

impl PlaylistOrder {
    /// Returns `None` when `items` is empty.
    pub fn new(items: Vec<MediaItem>) -> Option<Self> {
        if items.is_empty() {
            None
        } else {
            Some(Self { items, index: 0 })
        }
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> &MediaItem {
        &self.items[self.index]
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.items.len()
    }

    /// Moves to the next item. Returns `false` (without moving) when the
    /// current item is already the last one.
    pub fn advance(&mut self) -> bool {
        if self.is_last() {
            false
        } else {
            self.index += 1;
            true
        }
    }

    /// Moves back to the first item.
    pub fn rewind(&mut self) {
        self.index = 0;
    }
}

/// Builds the media source settings for a full playlist.
///
/// Looping and shuffling are always off: the supervisor owns looping so it
/// can keep its own index in step with the player.
pub fn playlist_settings(media: &MediaConfig, items: &[MediaItem]) -> Value {
    let entries: Vec<Value> = items
        .iter()
        .map(|item| {
            json!({
                "value": item.path.to_string_lossy(),
                "hidden": false,
            })
        })
        .collect();

    json!({
        "playlist": entries,
        "loop": false,
        "shuffle": false,
        "audio_track": media.audio_track,
        "sub_track": media.subtitle_track,
        "video_track": 1,
    })
}
