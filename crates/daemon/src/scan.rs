//! Scanner module for discovering and ordering media files.
//!
//! This module recursively scans the configured media directory for files
//! with an allowed extension, orders them episode-aware, and rotates the
//! order so that playback can begin at a named item.

use crate::title::{episode_tag, title_for_path};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Sort key for a media file.
///
/// Tagged files (`SxxEyy` in the stem) come first, ordered by season then
/// episode; untagged files follow, ordered by lowercased path text. The path
/// also breaks ties between files sharing the same tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub has_episode_tag: bool,
    pub season: u32,
    pub episode: u32,
    pub lowercased_path: String,
}

impl SortKey {
    pub fn for_path(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let lowercased_path = path.to_string_lossy().replace('\\', "/").to_lowercase();

        match episode_tag(&stem) {
            Some(tag) => Self {
                has_episode_tag: true,
                season: tag.season,
                episode: tag.episode,
                lowercased_path,
            },
            None => Self {
                has_episode_tag: false,
                season: 0,
                episode: 0,
                lowercased_path,
            },
        }
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .has_episode_tag
            .cmp(&self.has_episode_tag)
            .then(self.season.cmp(&other.season))
            .then(self.episode.cmp(&other.episode))
            .then_with(|| self.lowercased_path.cmp(&other.lowercased_path))
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A playable file discovered during scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    /// Full path to the media file.
    pub path: PathBuf,
    /// Display title derived from the filename.
    pub title: String,
    /// Playback ordering key.
    pub key: SortKey,
}

impl MediaItem {
    pub fn new(path: PathBuf) -> Self {
        Self {
            title: title_for_path(&path),
            key: SortKey::for_path(&path),
            path,
        }
    }
}

/// Checks if a file has one of the allowed extensions (case-insensitive).
///
/// `extensions` are expected lowercased with a leading dot, as produced by
/// the configuration resolver.
pub fn has_allowed_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            extensions.iter().any(|allowed| *allowed == ext_lower)
        })
        .unwrap_or(false)
}

/// Sorts items into playback order.
pub fn sort_items(items: &mut [MediaItem]) {
    items.sort_by(|a, b| a.key.cmp(&b.key));
}

/// Scans `dir` recursively for media files with an allowed extension.
///
/// Returns the files in playback order. Unreadable entries are skipped and
/// a directory with no matches yields an empty list rather than an error.
pub fn scan_media(dir: &Path, extensions: &[String]) -> Vec<MediaItem> {
    let mut items: Vec<MediaItem> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| has_allowed_extension(entry.path(), extensions))
        .map(|entry| MediaItem::new(entry.into_path()))
        .collect();

    sort_items(&mut items);
    items
}

/// Finds the index of the item matching `token`.
///
/// Matching is case-insensitive against the derived title: an exact match
/// anywhere in the list wins over a substring match; among equal kinds of
/// match, the first in scan order wins.
pub fn find_start_index(items: &[MediaItem], token: &str) -> Option<usize> {
    let needle = token.trim().to_uppercase();
    if needle.is_empty() {
        return None;
    }

    items
        .iter()
        .position(|item| item.title.to_uppercase() == needle)
        .or_else(|| {
            items
                .iter()
                .position(|item| item.title.to_uppercase().contains(&needle))
        })
}

/// Outcome of rotating the playlist towards a start item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartMatch {
    /// No start item was requested.
    NotRequested,
    /// The requested item was found at this index of the unrotated list.
    Found(usize),
    /// A start item was requested but nothing matched.
    NotFound,
}

/// Rotates `items` so the item matching `token` comes first.
///
/// Items before the match are appended after the tail, preserving their
/// relative order. When `token` is empty or nothing matches the list is
/// returned unchanged.
pub fn rotate(items: Vec<MediaItem>, token: &str) -> (Vec<MediaItem>, StartMatch) {
    if token.trim().is_empty() {
        return (items, StartMatch::NotRequested);
    }

    match find_start_index(&items, token) {
        Some(index) => {
            let mut rotated = items;
            rotated.rotate_left(index);
            (rotated, StartMatch::Found(index))
        }
        None => (items, StartMatch::NotFound),
    }
}
