//! Playback supervisor.
//!
//! The media source plays the whole playlist on its own and never reports
//! which entry it is on. The supervisor polls its status once a second and
//! infers entry changes from the cursor jumping backwards, keeping a local
//! index in step so the overlay can show the right title.

use crate::controller::{request, BestEffort, Controller};
use crate::output::stop_stream_if_active;
use crate::overlay::{now_playing_text, OverlayWriter};
use crate::playlist::PlaylistOrder;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Time between two status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Minimum backwards cursor jump that counts as a new entry starting.
pub const BOUNDARY_ROLLBACK_MS: i64 = 2000;

/// Playback has this long to be observed before a warning is logged.
pub const STARTUP_GRACE: Duration = Duration::from_secs(15);

/// Media action that restarts the source from its first entry.
pub const RESTART_ACTION: &str = "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_RESTART";

/// Playback state reported by the media source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaState {
    None,
    Playing,
    Opening,
    Buffering,
    Paused,
    Stopped,
    Ended,
    Error,
    Unknown(String),
}

impl From<&str> for MediaState {
    fn from(raw: &str) -> Self {
        match raw {
            "OBS_MEDIA_STATE_NONE" => MediaState::None,
            "OBS_MEDIA_STATE_PLAYING" => MediaState::Playing,
            "OBS_MEDIA_STATE_OPENING" => MediaState::Opening,
            "OBS_MEDIA_STATE_BUFFERING" => MediaState::Buffering,
            "OBS_MEDIA_STATE_PAUSED" => MediaState::Paused,
            "OBS_MEDIA_STATE_STOPPED" => MediaState::Stopped,
            "OBS_MEDIA_STATE_ENDED" => MediaState::Ended,
            "OBS_MEDIA_STATE_ERROR" => MediaState::Error,
            other => MediaState::Unknown(other.to_string()),
        }
    }
}

impl MediaState {
    /// Playing or paused: the source has demonstrably loaded something.
    pub fn is_active(&self) -> bool {
        matches!(self, MediaState::Playing | MediaState::Paused)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, MediaState::Ended | MediaState::Stopped)
    }
}

/// One status reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub state: MediaState,
    pub cursor_ms: Option<i64>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaInputStatus {
    #[serde(default)]
    media_state: Option<String>,
    #[serde(default)]
    media_cursor: Option<i64>,
    #[serde(default)]
    media_duration: Option<i64>,
}

impl From<MediaInputStatus> for PlaybackSnapshot {
    fn from(status: MediaInputStatus) -> Self {
        Self {
            state: status
                .media_state
                .as_deref()
                .map(MediaState::from)
                .unwrap_or(MediaState::None),
            cursor_ms: status.media_cursor,
            duration_ms: status.media_duration,
        }
    }
}

/// Outcome of feeding one snapshot to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    /// The player moved on to the entry at this index.
    Advanced(usize),
    /// The playlist ran out and wrapped to the first entry; the source needs
    /// an explicit restart.
    Wrapped,
    /// The playlist ran out with looping disabled.
    Finished,
    /// The source reported an unrecoverable error.
    Failed,
}

/// Boundary detection state, independent of any controller.
#[derive(Debug, Clone)]
pub struct PlaybackTracker {
    loop_playlist: bool,
    prev_cursor: Option<i64>,
    seen_playing: bool,
}

impl PlaybackTracker {
    pub fn new(loop_playlist: bool) -> Self {
        Self {
            loop_playlist,
            prev_cursor: None,
            seen_playing: false,
        }
    }

    /// Whether playback has been observed since start or the last restart.
    pub fn seen_playing(&self) -> bool {
        self.seen_playing
    }

    fn run_out(&mut self, playlist: &mut PlaylistOrder) -> Transition {
        if self.loop_playlist {
            playlist.rewind();
            self.prev_cursor = None;
            self.seen_playing = false;
            Transition::Wrapped
        } else {
            Transition::Finished
        }
    }

    /// Feeds one snapshot, moving `playlist` when an entry change is detected.
    pub fn observe(&mut self, snapshot: &PlaybackSnapshot, playlist: &mut PlaylistOrder) -> Transition {
        if snapshot.state == MediaState::Error {
            return Transition::Failed;
        }
        if snapshot.state.is_active() {
            self.seen_playing = true;
        }

        let rolled_back = match (self.prev_cursor, snapshot.cursor_ms) {
            (Some(prev), Some(cur)) => prev - cur >= BOUNDARY_ROLLBACK_MS,
            _ => false,
        };
        if snapshot.cursor_ms.is_some() {
            self.prev_cursor = snapshot.cursor_ms;
        }

        if rolled_back {
            return if playlist.advance() {
                Transition::Advanced(playlist.index())
            } else {
                self.run_out(playlist)
            };
        }

        if self.seen_playing && playlist.is_last() && snapshot.state.is_finished() {
            return self.run_out(playlist);
        }

        Transition::Stay
    }
}

/// How supervision ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// The last entry finished with looping disabled.
    Completed,
    /// Shutdown was requested.
    Interrupted,
    /// The media source entered its error state.
    PlaybackError,
}

/// Long-running playback loop.
pub struct Supervisor {
    playlist: PlaylistOrder,
    loop_playlist: bool,
    media_source: String,
    overlay: Option<OverlayWriter>,
    poll_interval: Duration,
}

impl Supervisor {
    pub fn new(
        playlist: PlaylistOrder,
        loop_playlist: bool,
        media_source: impl Into<String>,
        overlay: Option<OverlayWriter>,
    ) -> Self {
        Self {
            playlist,
            loop_playlist,
            media_source: media_source.into(),
            overlay,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn playlist(&self) -> &PlaylistOrder {
        &self.playlist
    }

    /// Supervises until the playlist completes, playback fails or `shutdown`
    /// fires, then stops the stream if it is still live.
    pub async fn run<C: Controller + ?Sized>(
        &mut self,
        controller: &mut C,
        shutdown: &CancellationToken,
    ) -> SupervisorExit {
        let exit = self.supervise(controller, shutdown).await;
        info!(?exit, "supervision ended");
        stop_stream_if_active(controller).await;
        exit
    }

    async fn poll<C: Controller + ?Sized>(&self, controller: &mut C) -> Option<PlaybackSnapshot> {
        request::<MediaInputStatus, _>(
            controller,
            "GetMediaInputStatus",
            json!({ "inputName": self.media_source }),
        )
        .await
        .best_effort("GetMediaInputStatus")
        .map(PlaybackSnapshot::from)
    }

    async fn restart<C: Controller + ?Sized>(&self, controller: &mut C) {
        controller
            .call(
                "TriggerMediaInputAction",
                json!({
                    "inputName": self.media_source,
                    "mediaAction": RESTART_ACTION,
                }),
            )
            .await
            .best_effort("restart media source");
    }

    async fn supervise<C: Controller + ?Sized>(
        &mut self,
        controller: &mut C,
        shutdown: &CancellationToken,
    ) -> SupervisorExit {
        let started = Instant::now();
        let mut tracker = PlaybackTracker::new(self.loop_playlist);
        let mut grace_settled = false;

        info!(
            title = %self.playlist.current().title,
            items = self.playlist.len(),
            looping = self.loop_playlist,
            "supervising playback"
        );

        loop {
            if shutdown.is_cancelled() {
                return SupervisorExit::Interrupted;
            }
            let tick = Instant::now();

            if let Some(snapshot) = self.poll(controller).await {
                if let Some(overlay) = self.overlay.as_mut() {
                    let text = now_playing_text(
                        &self.playlist.current().title,
                        snapshot.cursor_ms,
                        snapshot.duration_ms,
                    );
                    overlay.update(controller, &text).await;
                }

                match tracker.observe(&snapshot, &mut self.playlist) {
                    Transition::Stay => {}
                    Transition::Failed => {
                        error!(
                            title = %self.playlist.current().title,
                            "media source reported an error state"
                        );
                        return SupervisorExit::PlaybackError;
                    }
                    Transition::Advanced(index) => {
                        info!(
                            index,
                            title = %self.playlist.current().title,
                            "now playing"
                        );
                        self.reset_overlay();
                    }
                    Transition::Wrapped => {
                        info!(
                            title = %self.playlist.current().title,
                            "playlist finished; restarting from the top"
                        );
                        self.restart(controller).await;
                        self.reset_overlay();
                    }
                    Transition::Finished => {
                        info!("playlist finished");
                        return SupervisorExit::Completed;
                    }
                }

                debug!(state = ?snapshot.state, cursor = ?snapshot.cursor_ms, "poll");
            }

            if !grace_settled {
                if tracker.seen_playing() {
                    grace_settled = true;
                } else if started.elapsed() >= STARTUP_GRACE {
                    warn!(
                        source = %self.media_source,
                        grace_secs = STARTUP_GRACE.as_secs(),
                        "playback has not started yet; still waiting"
                    );
                    grace_settled = true;
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => return SupervisorExit::Interrupted,
                _ = tokio::time::sleep_until(tick + self.poll_interval) => {}
            }
        }
    }

    fn reset_overlay(&mut self) {
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.reset();
        }
    }
}
