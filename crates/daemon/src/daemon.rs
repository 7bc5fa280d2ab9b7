//! Daemon startup and main loop for the playout daemon
//!
//! Runs the one-shot setup sequence against the controller, then hands the
//! session to the playback supervisor until the playlist completes or a
//! shutdown is requested.

use crate::controller::{CallError, ConnectError, Controller, ObsSession};
use crate::output::{
    apply_encoder_params, apply_video_settings, configure_stream_destination, ensure_streaming,
    EncoderParams, VideoSettings,
};
use crate::overlay::{now_playing_text, text_settings, OverlayWriter, OVERLAY_POSITION};
use crate::playlist::{playlist_settings, PlaylistOrder};
use crate::probe::{probe_video, ProbeError, VideoInfo};
use crate::provision::{
    ensure_input, ensure_scene, pick_text_source_kind, position_overlay, raise_to_top,
    require_media_source_kind, ProvisionError,
};
use crate::startup::{prepare_playlist, StartupError};
use crate::supervisor::{Supervisor, SupervisorExit};
use playout_daemon_config::{Config, ConfigError};
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// The first media item could not be probed
    #[error("Probe failed: {0}")]
    Probe(#[from] ProbeError),

    /// The controller never became reachable
    #[error("{0}")]
    Connect(#[from] ConnectError),

    /// Scene or source provisioning failed
    #[error("Provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    /// A setup call that cannot be skipped failed
    #[error("Controller call failed: {0}")]
    Call(#[from] CallError),

    /// The media source entered its error state
    #[error("Playback failed: media source reported an error")]
    Playback,
}

impl DaemonError {
    /// Process exit code for this failure.
    ///
    /// Configuration and precondition failures exit with 2, everything else
    /// with 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            DaemonError::Config(_)
            | DaemonError::Startup(_)
            | DaemonError::Playback
            | DaemonError::Provision(ProvisionError::MediaKindUnavailable { .. }) => 2,
            DaemonError::Probe(_)
            | DaemonError::Connect(_)
            | DaemonError::Provision(ProvisionError::Call(_))
            | DaemonError::Call(_) => 1,
        }
    }
}

/// Daemon state
pub struct Daemon {
    /// Configuration resolved from the environment
    pub config: Config,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Initialize the daemon with configuration from the process environment
    pub fn from_env() -> Result<Self, DaemonError> {
        Ok(Self::new(Config::from_env()?))
    }

    /// Run the daemon to completion
    ///
    /// 1. Scan and order the media directory
    /// 2. Probe the first item
    /// 3. Connect to the controller (interruptible)
    /// 4. Provision sources, configure output, start the stream
    /// 5. Supervise playback
    ///
    /// A shutdown request at any point after step 2 ends with `Ok(())`.
    pub async fn run(&self, shutdown: &CancellationToken) -> Result<(), DaemonError> {
        let playlist = prepare_playlist(&self.config.media)?;

        let first = playlist.current().path.clone();
        let source = probe_video(&self.config.media.probe_path, &first)?;
        info!(
            path = %first.display(),
            width = source.width,
            height = source.height,
            fps = %source.fps,
            "probed first item"
        );

        let mut session = match ObsSession::connect(&self.config.controller, shutdown).await {
            Ok(session) => session,
            Err(ConnectError::Interrupted) => {
                info!("shutdown requested before the controller came up");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match self.play(&mut session, playlist, &source, shutdown).await? {
            SupervisorExit::Completed | SupervisorExit::Interrupted => Ok(()),
            SupervisorExit::PlaybackError => Err(DaemonError::Playback),
        }
    }

    /// Sets up the controller, starts the stream and supervises playback.
    pub async fn play<C: Controller + ?Sized>(
        &self,
        controller: &mut C,
        playlist: PlaylistOrder,
        source: &VideoInfo,
        shutdown: &CancellationToken,
    ) -> Result<SupervisorExit, DaemonError> {
        let overlay = self.setup(controller, &playlist, source).await?;

        let mut supervisor = Supervisor::new(
            playlist,
            self.config.media.loop_playlist,
            self.config.controller.media_source.clone(),
            overlay,
        );
        Ok(supervisor.run(controller, shutdown).await)
    }

    /// One-shot setup sequence. Returns the overlay writer when a text
    /// source could be provisioned.
    pub async fn setup<C: Controller + ?Sized>(
        &self,
        controller: &mut C,
        playlist: &PlaylistOrder,
        source: &VideoInfo,
    ) -> Result<Option<OverlayWriter>, DaemonError> {
        let ctl = &self.config.controller;
        let media = &self.config.media;

        ensure_scene(controller, &ctl.scene).await?;

        let media_kind = require_media_source_kind(controller).await?;
        ensure_input(
            controller,
            &ctl.scene,
            &ctl.media_source,
            media_kind,
            playlist_settings(media, &[]),
        )
        .await?;

        let overlay = self.setup_overlay(controller, playlist).await;

        let video = VideoSettings::resolve(&self.config.encoder, source);
        apply_video_settings(controller, video).await;
        apply_encoder_params(controller, &EncoderParams::resolve(&self.config.encoder, video.fps)).await;

        controller
            .call(
                "SetInputSettings",
                json!({
                    "inputName": ctl.media_source,
                    "inputSettings": playlist_settings(media, playlist.items()),
                    "overlay": true,
                }),
            )
            .await?;
        info!(source = %ctl.media_source, items = playlist.len(), "playlist loaded");

        // Starting the stream stays last: nothing after it may fail.
        configure_stream_destination(controller, &self.config.stream).await?;
        ensure_streaming(controller).await?;

        Ok(overlay)
    }

    async fn setup_overlay<C: Controller + ?Sized>(
        &self,
        controller: &mut C,
        playlist: &PlaylistOrder,
    ) -> Option<OverlayWriter> {
        let ctl = &self.config.controller;

        let Some(kind) = pick_text_source_kind(controller).await else {
            warn!("no text source kind available; overlay disabled");
            return None;
        };

        let initial = now_playing_text(&playlist.current().title, None, None);
        if let Err(e) = ensure_input(
            controller,
            &ctl.scene,
            &ctl.text_source,
            &kind,
            text_settings(&initial, ctl.text_size),
        )
        .await
        {
            warn!(error = %e, source = %ctl.text_source, "could not provision overlay; overlay disabled");
            return None;
        }

        let writer = OverlayWriter::new(ctl.text_source.clone(), ctl.text_size);
        let (x, y) = OVERLAY_POSITION;
        position_overlay(controller, &ctl.scene, writer.source(), x, y).await;
        raise_to_top(controller, &ctl.scene, writer.source()).await;
        info!(source = %writer.source(), kind = %kind, "overlay ready");

        Some(writer)
    }
}
