//! Title derivation for media files.
//!
//! A title is the short label shown on the overlay and matched against the
//! configured start item. Episodic files collapse to `SxxEyy`; everything
//! else uses the leading word of the filename.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Two-digit season and episode tag, e.g. `S01E02` or `s01e02`.
static EPISODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)S(?P<season>\d{2})E(?P<episode>\d{2})").expect("episode pattern is valid")
});

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9]+").expect("word pattern is valid"));

/// Placeholder used when a file has no usable stem.
pub const PLACEHOLDER_TITLE: &str = "VIDEO";

/// Maximum length of a sanitized fallback title.
const MAX_SANITIZED_LEN: usize = 64;

/// Season/episode numbers parsed from a filename stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EpisodeTag {
    pub season: u32,
    pub episode: u32,
}

/// Finds the first season/episode tag in a stem.
pub fn episode_tag(stem: &str) -> Option<EpisodeTag> {
    let caps = EPISODE_RE.captures(stem)?;
    Some(EpisodeTag {
        season: caps["season"].parse().ok()?,
        episode: caps["episode"].parse().ok()?,
    })
}

/// Returns the display title for a media path.
pub fn title_for_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    title_for_stem(&stem)
}

/// Returns the display title for a filename stem.
///
/// - `show.S01E02.1080p` -> `S01E02`
/// - `extra_features` -> `EXTRA`
/// - `___` -> `___` (sanitized, at most 64 characters)
/// - empty -> `VIDEO`
pub fn title_for_stem(stem: &str) -> String {
    if let Some(caps) = EPISODE_RE.captures(stem) {
        return format!("S{}E{}", &caps["season"], &caps["episode"]).to_uppercase();
    }

    if let Some(word) = WORD_RE.find(stem) {
        return word.as_str().to_uppercase();
    }

    let sanitized: String = stem
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .take(MAX_SANITIZED_LEN)
        .collect();

    if sanitized.is_empty() {
        PLACEHOLDER_TITLE.to_string()
    } else {
        sanitized
    }
}
