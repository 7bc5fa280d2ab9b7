//! Startup checks module for the playout daemon
//!
//! Provides the preconditions verified before any controller connection is
//! attempted:
//! - the media directory exists
//! - at least one media file matches the configured extensions
//! - the requested start item is located (a miss only warns)

use crate::playlist::PlaylistOrder;
use crate::scan::{rotate, scan_media, StartMatch};
use playout_daemon_config::MediaConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Media directory not found: {}", .0.display())]
    MediaDirMissing(PathBuf),

    #[error("No media files with extensions {extensions:?} under {}", dir.display())]
    NoMedia {
        dir: PathBuf,
        extensions: Vec<String>,
    },
}

/// Check that `dir` exists and is a directory
pub fn check_media_dir(dir: &Path) -> Result<(), StartupError> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(StartupError::MediaDirMissing(dir.to_path_buf()))
    }
}

/// Scan, order and rotate the media directory into a playlist
///
/// A start item that matches nothing is logged and playback begins at the
/// first item in scan order.
pub fn prepare_playlist(media: &MediaConfig) -> Result<PlaylistOrder, StartupError> {
    check_media_dir(&media.video_dir)?;

    let items = scan_media(&media.video_dir, &media.extensions);
    let (items, start) = rotate(items, &media.start_item);

    let order = PlaylistOrder::new(items).ok_or_else(|| StartupError::NoMedia {
        dir: media.video_dir.clone(),
        extensions: media.extensions.clone(),
    })?;

    match start {
        StartMatch::NotRequested => {}
        StartMatch::Found(index) => {
            info!(start = %media.start_item, index, "start item found")
        }
        StartMatch::NotFound => warn!(
            start = %media.start_item,
            "start item not found; starting from the first item"
        ),
    }

    info!(
        dir = %media.video_dir.display(),
        items = order.len(),
        first = %order.current().title,
        "playlist ready"
    );
    for (position, item) in order.items().iter().enumerate() {
        debug!(position, title = %item.title, path = %item.path.display(), "playlist item");
    }

    Ok(order)
}
