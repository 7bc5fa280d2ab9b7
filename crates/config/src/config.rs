//! Core configuration structures and loading logic

use crate::values::{parse_bool, parse_extensions, parse_fps, parse_kbps, FrameRate};
use std::env;
use std::path::{Component, Path, PathBuf};

/// Video bitrate used when `STREAM_VIDEO_BITRATE` is set but unparsable.
pub const FALLBACK_VIDEO_KBPS: u32 = 2500;
/// Audio bitrate used when `STREAM_AUDIO_BITRATE` is set but unparsable.
pub const FALLBACK_AUDIO_KBPS: u32 = 160;
/// Encoder preset used when `STREAM_PRESET` is set to an empty string.
pub const FALLBACK_PRESET: &str = "veryfast";

/// Error type for configuration operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting is absent or empty
    Missing(&'static str),
    /// A setting is present but cannot be coerced to its type
    Invalid { key: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "Missing required env: {}", key),
            ConfigError::Invalid { key, value } => {
                write!(f, "Invalid value for {}: {:?}", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Outbound stream destination (custom RTMP-style server + key)
#[derive(Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub server_url: String,
    pub stream_key: String,
}

impl std::fmt::Debug for StreamTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTarget")
            .field("server_url", &self.server_url)
            .field("stream_key", &"<redacted>")
            .finish()
    }
}

/// Media library selection and playback options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaConfig {
    /// Absolute, symlink-resolved media directory (existence not checked)
    pub video_dir: PathBuf,
    /// Title (or title fragment) of the item to start from; empty = first item
    pub start_item: String,
    /// Restart the playlist after the last item instead of stopping
    pub loop_playlist: bool,
    /// Lowercased extensions with a leading dot
    pub extensions: Vec<String>,
    /// Path or name of the media probe executable
    pub probe_path: String,
    pub audio_track: i64,
    pub subtitle_track: i64,
}

/// Encoder targets applied to the controller's output profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    pub video_kbps: u32,
    pub audio_kbps: u32,
    pub preset: String,
    /// Keyframe spacing; <= 0 disables, <= 10 is seconds, otherwise frames
    pub gop: i64,
    /// 0 = use the probed source width
    pub output_width: u32,
    /// 0 = use the probed source height
    pub output_height: u32,
    /// `None` = use the probed source frame rate
    pub output_fps: Option<FrameRate>,
}

/// Remote controller connection and scene layout
#[derive(Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub connect_retries: u32,
    pub connect_delay_ms: u64,
    pub scene: String,
    pub media_source: String,
    pub text_source: String,
    pub text_size: u32,
}

impl std::fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("connect_retries", &self.connect_retries)
            .field("connect_delay_ms", &self.connect_delay_ms)
            .field("scene", &self.scene)
            .field("media_source", &self.media_source)
            .field("text_source", &self.text_source)
            .field("text_size", &self.text_size)
            .finish()
    }
}

/// Main configuration structure
///
/// Built once at startup and passed explicitly to every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub stream: StreamTarget,
    pub media: MediaConfig,
    pub encoder: EncoderConfig,
    pub controller: ControllerConfig,
}

/// Typed view over a key lookup function.
struct Settings<F> {
    lookup: F,
}

impl<F> Settings<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    /// First non-empty value among `keys`, or an error naming the first key.
    fn required(&self, keys: &[&'static str]) -> Result<String, ConfigError> {
        keys.iter()
            .filter_map(|key| self.raw(key))
            .find(|val| !val.is_empty())
            .ok_or(ConfigError::Missing(keys[0]))
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        match self.raw(key) {
            Some(val) => parse_bool(&val),
            None => default,
        }
    }

    fn int<T: std::str::FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.raw(key) {
            Some(val) if !val.trim().is_empty() => {
                val.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
                    key,
                    value: val.clone(),
                })
            }
            _ => Ok(default),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Keys and defaults:
    /// - STREAM_URL / STREAM_KEY (required; legacy VK_URL / VK_KEY accepted)
    /// - VIDEO_DIR (required), START_EP, LOOP (true), FFPROBE_PATH (ffprobe)
    /// - VIDEO_EXTS (.mkv), AUDIO_INDEX (1), SUB_SI (1)
    /// - STREAM_VIDEO_BITRATE (3000k), STREAM_AUDIO_BITRATE (160k),
    ///   STREAM_PRESET (superfast), STREAM_GOP (48)
    /// - OUTPUT_WIDTH / OUTPUT_HEIGHT (0 = source), OUTPUT_FPS (empty = source)
    /// - OBS_HOST (127.0.0.1), OBS_PORT (4455), OBS_PASSWORD (required),
    ///   OBS_CONNECT_RETRIES (90), OBS_CONNECT_DELAY_MS (1000)
    /// - OBS_SCENE (Scene), OBS_MEDIA_SOURCE (Media; legacy OBS_VLC_SOURCE),
    ///   OBS_TEXT_SOURCE (NowPlaying), TEXT_SIZE (24)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let s = Settings { lookup };

        let stream = StreamTarget {
            server_url: s.required(&["STREAM_URL", "VK_URL"])?,
            stream_key: s.required(&["STREAM_KEY", "VK_KEY"])?,
        };

        let video_dir = resolve_dir(Path::new(&s.required(&["VIDEO_DIR"])?));

        let media = MediaConfig {
            video_dir,
            start_item: s.string("START_EP", "").trim().to_string(),
            loop_playlist: s.bool("LOOP", true),
            extensions: parse_extensions(&s.string("VIDEO_EXTS", ".mkv")),
            probe_path: s.string("FFPROBE_PATH", "ffprobe"),
            audio_track: s.int("AUDIO_INDEX", 1)?,
            subtitle_track: s.int("SUB_SI", 1)?,
        };

        let preset = s.string("STREAM_PRESET", "superfast");
        let encoder = EncoderConfig {
            video_kbps: parse_kbps(
                &s.string("STREAM_VIDEO_BITRATE", "3000k"),
                FALLBACK_VIDEO_KBPS,
            ),
            audio_kbps: parse_kbps(
                &s.string("STREAM_AUDIO_BITRATE", "160k"),
                FALLBACK_AUDIO_KBPS,
            ),
            preset: if preset.trim().is_empty() {
                FALLBACK_PRESET.to_string()
            } else {
                preset.trim().to_string()
            },
            gop: s.int("STREAM_GOP", 48)?,
            output_width: s.int("OUTPUT_WIDTH", 0)?,
            output_height: s.int("OUTPUT_HEIGHT", 0)?,
            output_fps: parse_fps(&s.string("OUTPUT_FPS", "")),
        };

        let legacy_media_source = s.raw("OBS_VLC_SOURCE");
        let controller = ControllerConfig {
            host: s.string("OBS_HOST", "127.0.0.1"),
            port: s.int("OBS_PORT", 4455)?,
            password: s.required(&["OBS_PASSWORD"])?,
            connect_retries: s.int("OBS_CONNECT_RETRIES", 90)?,
            connect_delay_ms: s.int("OBS_CONNECT_DELAY_MS", 1000)?,
            scene: s.string("OBS_SCENE", "Scene"),
            media_source: s.string(
                "OBS_MEDIA_SOURCE",
                legacy_media_source.as_deref().unwrap_or("Media"),
            ),
            text_source: s.string("OBS_TEXT_SOURCE", "NowPlaying"),
            text_size: s.int("TEXT_SIZE", 24)?,
        };

        Ok(Config {
            stream,
            media,
            encoder,
            controller,
        })
    }
}

/// Makes `path` absolute and resolves symlinks as far as the path exists.
///
/// A leading `~` is expanded to the home directory. Components past the
/// deepest existing ancestor are appended unchanged, so a missing directory
/// still yields a usable absolute path for the caller to report.
pub fn resolve_dir(path: &Path) -> PathBuf {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        match env::current_dir() {
            Ok(cwd) => cwd.join(expanded),
            Err(_) => expanded,
        }
    };

    if let Ok(resolved) = absolute.canonicalize() {
        return resolved;
    }

    let mut existing = absolute.as_path();
    let mut missing: Vec<Component<'_>> = Vec::new();
    while let Some(parent) = existing.parent() {
        if let Some(last) = existing.components().next_back() {
            missing.push(last);
        }
        existing = parent;
        if let Ok(resolved) = existing.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(resolved, |acc, comp| acc.join(comp.as_os_str()));
        }
    }

    absolute
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn required_pairs() -> Vec<(&'static str, &'static str)> {
        vec![
            ("STREAM_URL", "rtmp://live.example.net/app"),
            ("STREAM_KEY", "secret-key"),
            ("VIDEO_DIR", "/srv/media"),
            ("OBS_PASSWORD", "hunter2"),
        ]
    }

    #[test]
    fn test_defaults_with_required_only() {
        let config = Config::from_lookup(lookup_from(&required_pairs())).expect("valid config");

        assert_eq!(config.stream.server_url, "rtmp://live.example.net/app");
        assert_eq!(config.stream.stream_key, "secret-key");
        assert!(config.media.video_dir.is_absolute());
        assert_eq!(config.media.start_item, "");
        assert!(config.media.loop_playlist);
        assert_eq!(config.media.extensions, vec![".mkv"]);
        assert_eq!(config.media.probe_path, "ffprobe");
        assert_eq!(config.media.audio_track, 1);
        assert_eq!(config.media.subtitle_track, 1);
        assert_eq!(config.encoder.video_kbps, 3000);
        assert_eq!(config.encoder.audio_kbps, 160);
        assert_eq!(config.encoder.preset, "superfast");
        assert_eq!(config.encoder.gop, 48);
        assert_eq!(config.encoder.output_width, 0);
        assert_eq!(config.encoder.output_height, 0);
        assert_eq!(config.encoder.output_fps, None);
        assert_eq!(config.controller.host, "127.0.0.1");
        assert_eq!(config.controller.port, 4455);
        assert_eq!(config.controller.connect_retries, 90);
        assert_eq!(config.controller.connect_delay_ms, 1000);
        assert_eq!(config.controller.scene, "Scene");
        assert_eq!(config.controller.media_source, "Media");
        assert_eq!(config.controller.text_source, "NowPlaying");
        assert_eq!(config.controller.text_size, 24);
    }

    #[test]
    fn test_missing_required_fields_are_named() {
        for key in ["STREAM_URL", "STREAM_KEY", "VIDEO_DIR", "OBS_PASSWORD"] {
            let pairs: Vec<_> = required_pairs()
                .into_iter()
                .filter(|(k, _)| *k != key)
                .collect();
            let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
            assert_eq!(err, ConfigError::Missing(key));
            assert!(err.to_string().contains(key));
        }
    }

    #[test]
    fn test_empty_required_field_is_missing() {
        let mut pairs: Vec<_> = required_pairs()
            .into_iter()
            .filter(|(k, _)| *k != "OBS_PASSWORD")
            .collect();
        pairs.push(("OBS_PASSWORD", ""));
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("OBS_PASSWORD"));
    }

    #[test]
    fn test_legacy_aliases() {
        let pairs = vec![
            ("VK_URL", "rtmp://legacy/app"),
            ("VK_KEY", "legacy-key"),
            ("VIDEO_DIR", "/srv/media"),
            ("OBS_PASSWORD", "pw"),
            ("OBS_VLC_SOURCE", "Player"),
        ];
        let config = Config::from_lookup(lookup_from(&pairs)).expect("valid config");
        assert_eq!(config.stream.server_url, "rtmp://legacy/app");
        assert_eq!(config.stream.stream_key, "legacy-key");
        assert_eq!(config.controller.media_source, "Player");
    }

    #[test]
    fn test_overrides_are_coerced() {
        let mut pairs = required_pairs();
        pairs.extend([
            ("LOOP", "off"),
            ("START_EP", " s01e03 "),
            ("VIDEO_EXTS", "mp4 MKV"),
            ("STREAM_VIDEO_BITRATE", "4.5M"),
            ("STREAM_AUDIO_BITRATE", "garbage"),
            ("STREAM_PRESET", ""),
            ("STREAM_GOP", "0"),
            ("OUTPUT_WIDTH", "1280"),
            ("OUTPUT_HEIGHT", "720"),
            ("OUTPUT_FPS", "30000/1001"),
            ("OBS_PORT", "4460"),
            ("AUDIO_INDEX", ""),
        ]);
        let config = Config::from_lookup(lookup_from(&pairs)).expect("valid config");
        assert!(!config.media.loop_playlist);
        assert_eq!(config.media.start_item, "s01e03");
        assert_eq!(config.media.extensions, vec![".mp4", ".mkv"]);
        assert_eq!(config.media.audio_track, 1);
        assert_eq!(config.encoder.video_kbps, 4500);
        assert_eq!(config.encoder.audio_kbps, FALLBACK_AUDIO_KBPS);
        assert_eq!(config.encoder.preset, FALLBACK_PRESET);
        assert_eq!(config.encoder.gop, 0);
        assert_eq!(config.encoder.output_width, 1280);
        assert_eq!(config.encoder.output_height, 720);
        assert_eq!(config.encoder.output_fps, FrameRate::new(30000, 1001));
        assert_eq!(config.controller.port, 4460);
    }

    #[test]
    fn test_invalid_integer_is_rejected() {
        let mut pairs = required_pairs();
        pairs.push(("STREAM_GOP", "forty-eight"));
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "STREAM_GOP",
                value: "forty-eight".to_string()
            }
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::from_lookup(lookup_from(&required_pairs())).expect("valid config");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret-key"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_resolve_dir_keeps_missing_tail() {
        let temp = std::env::temp_dir().canonicalize().expect("temp dir resolves");
        let missing = temp.join("playout-daemon-does-not-exist").join("season-1");
        assert_eq!(resolve_dir(&missing), missing);
    }

    #[test]
    fn test_from_env_reads_process_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        for (key, val) in required_pairs() {
            env::set_var(key, val);
        }
        env::set_var("TEXT_SIZE", "36");

        let config = Config::from_env();

        for (key, _) in required_pairs() {
            env::remove_var(key);
        }
        env::remove_var("TEXT_SIZE");

        let config = config.expect("valid config from env");
        assert_eq!(config.controller.text_size, 36);
        assert_eq!(config.controller.password, "hunter2");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_loop_flag_follows_truthy_set(value in "[a-zA-Z0-9]{0,6}") {
            let mut pairs: Vec<(&str, &str)> = required_pairs();
            pairs.push(("LOOP", value.as_str()));
            let config = Config::from_lookup(lookup_from(&pairs)).expect("valid config");
            let expected = matches!(
                value.to_lowercase().as_str(),
                "1" | "true" | "yes" | "y" | "on"
            );
            prop_assert_eq!(config.media.loop_playlist, expected);
        }

        #[test]
        fn prop_port_override_round_trips(port in 1u16..=u16::MAX) {
            let port_str = port.to_string();
            let mut pairs: Vec<(&str, &str)> = required_pairs();
            pairs.push(("OBS_PORT", port_str.as_str()));
            let config = Config::from_lookup(lookup_from(&pairs)).expect("valid config");
            prop_assert_eq!(config.controller.port, port);
        }
    }
}
