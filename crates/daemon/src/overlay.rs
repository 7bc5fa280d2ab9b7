//! "Now playing" text overlay.

use crate::controller::{BestEffort, Controller};
use serde_json::{json, Value};

/// Font face requested for the overlay text.
pub const OVERLAY_FONT_FACE: &str = "DejaVu Sans";
/// Opaque white, packed ABGR.
pub const OVERLAY_COLOR: u64 = 4_294_967_295;
/// Opaque black, packed ABGR.
pub const OVERLAY_OUTLINE_COLOR: u64 = 4_278_190_080;
pub const OVERLAY_OUTLINE_SIZE: u32 = 2;
/// Canvas position of the overlay's top-left corner.
pub const OVERLAY_POSITION: (f64, f64) = (10.0, 10.0);

const HOUR_MS: i64 = 3_600_000;

fn clock(total_ms: i64, with_hours: bool) -> String {
    let total_secs = total_ms.max(0) / 1000;
    let (h, m, s) = (total_secs / 3600, (total_secs % 3600) / 60, total_secs % 60);
    if with_hours {
        format!("{:02}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", total_secs / 60, s)
    }
}

/// `"{title} {cursor}/{duration}"`.
///
/// Both clocks switch to the hour form together once either reaches an hour.
/// An unknown duration renders as dashes in the matching form, and an unknown
/// cursor counts as zero.
pub fn now_playing_text(title: &str, cursor_ms: Option<i64>, duration_ms: Option<i64>) -> String {
    let cursor = cursor_ms.unwrap_or(0).max(0);
    let duration = duration_ms.filter(|d| *d > 0);
    let with_hours = cursor >= HOUR_MS || duration.is_some_and(|d| d >= HOUR_MS);

    let total = match duration {
        Some(d) => clock(d, with_hours),
        None if with_hours => "--:--:--".to_string(),
        None => "--:--".to_string(),
    };

    format!("{} {}/{}", title, clock(cursor, with_hours), total)
}

/// Input settings for a text source showing `text`.
pub fn text_settings(text: &str, size: u32) -> Value {
    json!({
        "text": text,
        "font": {
            "face": OVERLAY_FONT_FACE,
            "size": size,
            "style": "Regular",
        },
        "color1": OVERLAY_COLOR,
        "color2": OVERLAY_COLOR,
        "outline": true,
        "outline_size": OVERLAY_OUTLINE_SIZE,
        "outline_color": OVERLAY_OUTLINE_COLOR,
    })
}

/// Pushes overlay text, skipping writes that would not change anything.
#[derive(Debug)]
pub struct OverlayWriter {
    source: String,
    size: u32,
    last: Option<String>,
}

impl OverlayWriter {
    pub fn new(source: impl Into<String>, size: u32) -> Self {
        Self {
            source: source.into(),
            size,
            last: None,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Writes `text` unless it equals the last successful write.
    ///
    /// A failed write is logged and forgotten, so the next call retries.
    pub async fn update<C: Controller + ?Sized>(&mut self, controller: &mut C, text: &str) {
        if self.last.as_deref() == Some(text) {
            return;
        }

        let written = controller
            .call(
                "SetInputSettings",
                json!({
                    "inputName": self.source,
                    "inputSettings": text_settings(text, self.size),
                    "overlay": true,
                }),
            )
            .await
            .best_effort("update overlay text");

        self.last = written.map(|_| text.to_string());
    }

    /// Forgets the last written text.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
