//! Output and stream configuration.
//!
//! Derives canvas and encoder settings from the probed source and the
//! configured targets, then points the controller's stream output at the
//! configured destination.

use crate::controller::{request, BestEffort, CallError, Controller};
use crate::probe::VideoInfo;
use playout_daemon_config::{EncoderConfig, FrameRate, StreamTarget};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Parameter categories that may own the keyframe interval, tried in order.
pub const KEYFRAME_CATEGORIES: &[&str] = &["AdvOut", "SimpleOutput", "Output"];

/// GOP values up to this are taken as seconds rather than frames.
const GOP_SECONDS_LIMIT: i64 = 10;

/// Resolved canvas settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSettings {
    pub base_width: u32,
    pub base_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub fps: FrameRate,
}

impl VideoSettings {
    /// Each output dimension and the rate come from their override when set,
    /// otherwise from the probed source. The base canvas always matches the
    /// source.
    pub fn resolve(encoder: &EncoderConfig, source: &VideoInfo) -> Self {
        let pick = |value: u32, fallback: u32| if value > 0 { value } else { fallback };

        Self {
            base_width: source.width,
            base_height: source.height,
            output_width: pick(encoder.output_width, source.width),
            output_height: pick(encoder.output_height, source.height),
            fps: encoder.output_fps.unwrap_or(source.fps),
        }
    }

    fn to_request(self) -> Value {
        json!({
            "baseWidth": self.base_width,
            "baseHeight": self.base_height,
            "outputWidth": self.output_width,
            "outputHeight": self.output_height,
            "fpsNumerator": self.fps.num,
            "fpsDenominator": self.fps.den,
        })
    }
}

/// Applies the canvas settings. Refused while an output is live, so failures
/// only warn.
pub async fn apply_video_settings<C: Controller + ?Sized>(controller: &mut C, settings: VideoSettings) {
    info!(
        base = %format!("{}x{}", settings.base_width, settings.base_height),
        output = %format!("{}x{}", settings.output_width, settings.output_height),
        fps = %settings.fps,
        fps_approx = settings.fps.as_f64(),
        "applying video settings"
    );
    controller
        .call("SetVideoSettings", settings.to_request())
        .await
        .best_effort("SetVideoSettings");
}

/// Converts a GOP setting into a keyframe interval in seconds.
///
/// `gop <= 0` means "leave it to the controller", `gop <= 10` is already in
/// seconds, anything larger is a frame count at `fps`. Frame counts are
/// rounded to the millisecond with trailing zeros stripped.
pub fn keyframe_interval(gop: i64, fps: FrameRate) -> Option<String> {
    if gop <= 0 {
        return None;
    }
    if gop <= GOP_SECONDS_LIMIT {
        return Some(gop.to_string());
    }

    let numer = gop as u128 * fps.den as u128 * 1000;
    let denom = fps.num as u128;
    let ms = (2 * numer + denom) / (2 * denom);

    let (whole, frac) = (ms / 1000, ms % 1000);
    if frac == 0 {
        return Some(whole.to_string());
    }
    let frac = format!("{:03}", frac);
    Some(format!("{}.{}", whole, frac.trim_end_matches('0')))
}

/// Encoder parameters pushed as profile parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderParams {
    pub video_kbps: u32,
    pub audio_kbps: u32,
    pub preset: String,
    pub keyframe_interval: Option<String>,
}

impl EncoderParams {
    pub fn resolve(encoder: &EncoderConfig, fps: FrameRate) -> Self {
        Self {
            video_kbps: encoder.video_kbps,
            audio_kbps: encoder.audio_kbps,
            preset: encoder.preset.clone(),
            keyframe_interval: keyframe_interval(encoder.gop, fps),
        }
    }
}

async fn set_profile_parameter<C: Controller + ?Sized>(
    controller: &mut C,
    category: &str,
    name: &str,
    value: &str,
) -> Result<Value, CallError> {
    controller
        .call(
            "SetProfileParameter",
            json!({
                "parameterCategory": category,
                "parameterName": name,
                "parameterValue": value,
            }),
        )
        .await
}

/// Applies bitrates, preset and keyframe interval. Every failure only warns.
pub async fn apply_encoder_params<C: Controller + ?Sized>(controller: &mut C, params: &EncoderParams) {
    info!(
        video_kbps = params.video_kbps,
        audio_kbps = params.audio_kbps,
        preset = %params.preset,
        keyframe_interval = params.keyframe_interval.as_deref().unwrap_or("controller default"),
        "applying encoder parameters"
    );

    let simple = [
        ("VBitrate", params.video_kbps.to_string()),
        ("ABitrate", params.audio_kbps.to_string()),
        ("Preset", params.preset.clone()),
    ];
    for (name, value) in &simple {
        set_profile_parameter(controller, "SimpleOutput", name, value)
            .await
            .best_effort(name);
    }

    let Some(interval) = params.keyframe_interval.as_deref() else {
        return;
    };

    for category in KEYFRAME_CATEGORIES {
        match set_profile_parameter(controller, category, "KeyframeInterval", interval).await {
            Ok(_) => {
                debug!(category, interval, "keyframe interval applied");
                return;
            }
            Err(e) => debug!(category, error = %e, "keyframe interval rejected"),
        }
    }
    warn!(interval, "no parameter category accepted the keyframe interval");
}

/// Points the stream output at `target`.
pub async fn configure_stream_destination<C: Controller + ?Sized>(
    controller: &mut C,
    target: &StreamTarget,
) -> Result<(), CallError> {
    controller
        .call(
            "SetStreamServiceSettings",
            json!({
                "streamServiceType": "rtmp_custom",
                "streamServiceSettings": {
                    "server": target.server_url,
                    "key": target.stream_key,
                },
            }),
        )
        .await?;
    info!(server = %target.server_url, "stream destination configured");
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamStatus {
    #[serde(default)]
    output_active: bool,
}

async fn stream_active<C: Controller + ?Sized>(controller: &mut C) -> Result<bool, CallError> {
    let status: StreamStatus = request(controller, "GetStreamStatus", Value::Null).await?;
    Ok(status.output_active)
}

/// Starts the stream unless it is already live.
pub async fn ensure_streaming<C: Controller + ?Sized>(controller: &mut C) -> Result<(), CallError> {
    if stream_active(controller).await? {
        info!("stream already active");
        return Ok(());
    }
    controller.call("StartStream", Value::Null).await?;
    info!("stream started");
    Ok(())
}

/// Stops the stream if the controller reports it live. Never fails; returns
/// whether a stop was issued.
pub async fn stop_stream_if_active<C: Controller + ?Sized>(controller: &mut C) -> bool {
    let Some(active) = stream_active(controller).await.best_effort("GetStreamStatus") else {
        return false;
    };
    if !active {
        debug!("stream not active; nothing to stop");
        return false;
    }

    if controller
        .call("StopStream", Value::Null)
        .await
        .best_effort("StopStream")
        .is_some()
    {
        info!("stream stopped");
    }
    true
}
