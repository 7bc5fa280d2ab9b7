//! Playout Daemon
//!
//! Unattended streaming service: orders a directory of media files, drives a
//! remote production controller over obs-websocket, and supervises playback
//! with a "now playing" overlay.

pub mod controller;
pub mod daemon;
pub mod output;
pub mod overlay;
pub mod playlist;
pub mod probe;
pub mod provision;
pub mod scan;
pub mod shutdown;
pub mod startup;
pub mod supervisor;
pub mod title;

pub use controller::{BestEffort, CallError, ConnectError, Controller, ObsSession};
pub use daemon::{Daemon, DaemonError};
pub use playlist::{playlist_settings, PlaylistOrder};
pub use playout_daemon_config as config;
pub use playout_daemon_config::Config;
pub use probe::{probe_video, ProbeError, VideoInfo};
pub use provision::ProvisionError;
pub use scan::{rotate, scan_media, MediaItem, StartMatch};
pub use shutdown::{shutdown_signal, spawn_signal_listener};
pub use startup::{prepare_playlist, StartupError};
pub use supervisor::{PlaybackSnapshot, PlaybackTracker, Supervisor, SupervisorExit, Transition};
pub use title::title_for_path;
