//! Scene and source provisioning.
//!
//! Idempotently makes sure the target scene exists and holds a playlist-capable
//! media source plus an optional text overlay, adapting to whichever source
//! kinds the controller has installed.

use crate::controller::{request, BestEffort, CallError, Controller};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Media source kind able to play a whole file list on its own.
pub const MEDIA_PLAYLIST_KIND: &str = "mpvs_source";

/// Known text-rendering kinds, in order of preference.
pub const TEXT_KIND_CANDIDATES: &[&str] = &[
    "text_ft2_source_v2",
    "text_ft2_source",
    "text_gdiplus",
    "text_source",
];

const REMOVAL_POLL_ATTEMPTS: u32 = 10;
const REMOVAL_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Error type for provisioning operations
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The controller lacks the playlist-capable media source kind
    #[error(
        "input kind {kind} is not available on the controller; install the obs-mpv plugin, \
         ordinary media sources cannot advance through a file list on their own"
    )]
    MediaKindUnavailable { kind: &'static str },

    /// A required controller call failed
    #[error(transparent)]
    Call(#[from] CallError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneList {
    #[serde(default)]
    scenes: Vec<SceneEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneEntry {
    #[serde(default)]
    scene_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputList {
    #[serde(default)]
    inputs: Vec<InputEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputEntry {
    #[serde(default)]
    input_name: String,
    #[serde(default)]
    input_kind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputKindList {
    #[serde(default)]
    input_kinds: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneItemId {
    scene_item_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneItemList {
    #[serde(default)]
    scene_items: Vec<SceneItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneItem {
    scene_item_id: Option<i64>,
    scene_item_index: Option<i64>,
    #[serde(default)]
    source_name: String,
}

/// Creates `scene` unless a scene with that name already exists.
pub async fn ensure_scene<C: Controller + ?Sized>(
    controller: &mut C,
    scene: &str,
) -> Result<(), CallError> {
    let list: SceneList = request(controller, "GetSceneList", Value::Null).await?;
    if list.scenes.iter().any(|s| s.scene_name == scene) {
        debug!(scene, "scene already exists");
        return Ok(());
    }

    controller
        .call("CreateScene", json!({ "sceneName": scene }))
        .await?;
    info!(scene, "created scene");
    Ok(())
}

async fn list_inputs<C: Controller + ?Sized>(controller: &mut C) -> Result<Vec<InputEntry>, CallError> {
    let list: InputList = request(controller, "GetInputList", Value::Null).await?;
    Ok(list.inputs)
}

/// Makes sure an input named `input` of kind `kind` exists with `settings`.
///
/// - same name, same kind: settings are overwritten in place
/// - same name, other kind: the input is removed, its disappearance is
///   polled for a bounded time, and a fresh input is created
/// - no such input: it is created inside `scene`, visible
pub async fn ensure_input<C: Controller + ?Sized>(
    controller: &mut C,
    scene: &str,
    input: &str,
    kind: &str,
    settings: Value,
) -> Result<(), CallError> {
    let inputs = list_inputs(controller).await?;

    if let Some(existing) = inputs.iter().find(|i| i.input_name == input) {
        match existing.input_kind.as_deref() {
            Some(existing_kind) if !existing_kind.is_empty() && existing_kind != kind => {
                info!(input, existing_kind, kind, "replacing input of a different kind");
                controller
                    .call("RemoveInput", json!({ "inputName": input }))
                    .await
                    .best_effort("RemoveInput");
                wait_for_removal(controller, input).await?;
            }
            _ => {
                controller
                    .call(
                        "SetInputSettings",
                        json!({
                            "inputName": input,
                            "inputSettings": settings,
                            "overlay": false,
                        }),
                    )
                    .await?;
                debug!(input, kind, "updated input settings in place");
                return Ok(());
            }
        }
    }

    controller
        .call(
            "CreateInput",
            json!({
                "sceneName": scene,
                "inputName": input,
                "inputKind": kind,
                "inputSettings": settings,
                "sceneItemEnabled": true,
            }),
        )
        .await?;
    info!(scene, input, kind, "created input");
    Ok(())
}

async fn wait_for_removal<C: Controller + ?Sized>(
    controller: &mut C,
    input: &str,
) -> Result<(), CallError> {
    for _ in 0..REMOVAL_POLL_ATTEMPTS {
        tokio::time::sleep(REMOVAL_POLL_INTERVAL).await;
        let inputs = list_inputs(controller).await?;
        if !inputs.iter().any(|i| i.input_name == input) {
            return Ok(());
        }
    }
    warn!(input, "input still listed after removal; creating anyway");
    Ok(())
}

async fn list_input_kinds<C: Controller + ?Sized>(controller: &mut C, unversioned: bool) -> Vec<String> {
    request::<InputKindList, _>(
        controller,
        "GetInputKindList",
        json!({ "unversioned": unversioned }),
    )
    .await
    .best_effort("GetInputKindList")
    .map(|list| list.input_kinds)
    .unwrap_or_default()
}

/// Picks a text kind from the versioned and unversioned kind lists.
///
/// Known candidates win in priority order, versioned list first; failing
/// that, the first kind whose name contains "text".
pub fn choose_text_kind(versioned: &[String], unversioned: &[String]) -> Option<String> {
    for kinds in [versioned, unversioned] {
        if let Some(found) = TEXT_KIND_CANDIDATES
            .iter()
            .find(|candidate| kinds.iter().any(|k| k == *candidate))
        {
            return Some(found.to_string());
        }
    }

    versioned
        .iter()
        .chain(unversioned.iter())
        .find(|k| k.to_lowercase().contains("text"))
        .cloned()
}

/// Returns a usable text source kind, or `None` when the overlay has to be
/// disabled for this session.
pub async fn pick_text_source_kind<C: Controller + ?Sized>(controller: &mut C) -> Option<String> {
    let versioned = list_input_kinds(controller, false).await;
    let unversioned = list_input_kinds(controller, true).await;
    choose_text_kind(&versioned, &unversioned)
}

/// Fails unless the controller offers [`MEDIA_PLAYLIST_KIND`].
pub async fn require_media_source_kind<C: Controller + ?Sized>(
    controller: &mut C,
) -> Result<&'static str, ProvisionError> {
    let mut kinds = list_input_kinds(controller, false).await;
    kinds.extend(list_input_kinds(controller, true).await);

    if kinds.iter().any(|k| k == MEDIA_PLAYLIST_KIND) {
        Ok(MEDIA_PLAYLIST_KIND)
    } else {
        Err(ProvisionError::MediaKindUnavailable {
            kind: MEDIA_PLAYLIST_KIND,
        })
    }
}

/// Moves `source` to (`x`, `y`) in `scene`. Failures are logged only.
pub async fn position_overlay<C: Controller + ?Sized>(
    controller: &mut C,
    scene: &str,
    source: &str,
    x: f64,
    y: f64,
) {
    let item = request::<SceneItemId, _>(
        controller,
        "GetSceneItemId",
        json!({ "sceneName": scene, "sourceName": source }),
    )
    .await
    .best_effort("GetSceneItemId");

    let Some(item_id) = item.and_then(|i| i.scene_item_id) else {
        return;
    };

    controller
        .call(
            "SetSceneItemTransform",
            json!({
                "sceneName": scene,
                "sceneItemId": item_id,
                "sceneItemTransform": { "positionX": x, "positionY": y },
            }),
        )
        .await
        .best_effort("SetSceneItemTransform");
}

/// Moves `source` above every other item in `scene`. Failures are logged only.
pub async fn raise_to_top<C: Controller + ?Sized>(controller: &mut C, scene: &str, source: &str) {
    let Some(list) = request::<SceneItemList, _>(
        controller,
        "GetSceneItemList",
        json!({ "sceneName": scene }),
    )
    .await
    .best_effort("GetSceneItemList") else {
        return;
    };

    let max_index = list
        .scene_items
        .iter()
        .filter_map(|item| item.scene_item_index)
        .max();
    let target = list
        .scene_items
        .iter()
        .find(|item| item.source_name == source)
        .and_then(|item| item.scene_item_id);

    let (Some(target_id), Some(top)) = (target, max_index) else {
        return;
    };

    controller
        .call(
            "SetSceneItemIndex",
            json!({
                "sceneName": scene,
                "sceneItemId": target_id,
                "sceneItemIndex": top,
            }),
        )
        .await
        .best_effort("SetSceneItemIndex");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::testing::{rejected, FakeController};
    use std::sync::{Arc, Mutex};

    fn kinds(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_ensure_scene_creates_only_when_missing() {
        let mut fake = FakeController::new(|req, _| match req {
            "GetSceneList" => Ok(json!({"scenes": [{"sceneName": "Other"}]})),
            _ => Ok(json!({})),
        });
        ensure_scene(&mut fake, "Scene").await.unwrap();
        assert_eq!(fake.params("CreateScene"), vec![&json!({"sceneName": "Scene"})]);

        let mut fake = FakeController::new(|req, _| match req {
            "GetSceneList" => Ok(json!({"scenes": [{"sceneName": "Scene"}]})),
            _ => Ok(json!({})),
        });
        ensure_scene(&mut fake, "Scene").await.unwrap();
        assert_eq!(fake.count("CreateScene"), 0);
    }

    #[tokio::test]
    async fn test_ensure_input_updates_same_kind_in_place() {
        let mut fake = FakeController::new(|req, _| match req {
            "GetInputList" => Ok(json!({"inputs": [
                {"inputName": "Media", "inputKind": "mpvs_source"}
            ]})),
            _ => Ok(json!({})),
        });
        ensure_input(&mut fake, "Scene", "Media", "mpvs_source", json!({"loop": false}))
            .await
            .unwrap();

        assert_eq!(fake.sequence(), vec!["GetInputList", "SetInputSettings"]);
        let params = fake.params("SetInputSettings");
        assert_eq!(params[0]["inputName"], json!("Media"));
        assert_eq!(params[0]["inputSettings"], json!({"loop": false}));
        assert_eq!(params[0]["overlay"], json!(false));
    }

    #[tokio::test]
    async fn test_ensure_input_creates_when_absent() {
        let mut fake = FakeController::new(|req, _| match req {
            "GetInputList" => Ok(json!({"inputs": []})),
            _ => Ok(json!({})),
        });
        ensure_input(&mut fake, "Scene", "NowPlaying", "text_ft2_source_v2", json!({"text": "X"}))
            .await
            .unwrap();

        let params = fake.params("CreateInput");
        assert_eq!(params.len(), 1);
        assert_eq!(params[0]["sceneName"], json!("Scene"));
        assert_eq!(params[0]["inputKind"], json!("text_ft2_source_v2"));
        assert_eq!(params[0]["sceneItemEnabled"], json!(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_input_replaces_other_kind() {
        let removed = Arc::new(Mutex::new(false));
        let polls = Arc::new(Mutex::new(0u32));
        let (removed_h, polls_h) = (removed.clone(), polls.clone());

        let mut fake = FakeController::new(move |req, _| match req {
            "GetInputList" => {
                let mut polls = polls_h.lock().unwrap();
                *polls += 1;
                // The removal becomes visible on the second poll after RemoveInput.
                if *removed_h.lock().unwrap() && *polls >= 3 {
                    Ok(json!({"inputs": []}))
                } else {
                    Ok(json!({"inputs": [{"inputName": "Media", "inputKind": "vlc_source"}]}))
                }
            }
            "RemoveInput" => {
                *removed_h.lock().unwrap() = true;
                Ok(json!({}))
            }
            _ => Ok(json!({})),
        });

        ensure_input(&mut fake, "Scene", "Media", "mpvs_source", json!({}))
            .await
            .unwrap();

        assert_eq!(
            fake.sequence(),
            vec!["GetInputList", "RemoveInput", "GetInputList", "GetInputList", "CreateInput"]
        );
        assert_eq!(fake.count("SetInputSettings"), 0);
        assert!(*removed.lock().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_input_removal_wait_is_bounded() {
        let mut fake = FakeController::new(|req, _| match req {
            "GetInputList" => Ok(json!({"inputs": [{"inputName": "Media", "inputKind": "vlc_source"}]})),
            "RemoveInput" => Err(rejected(req)),
            _ => Ok(json!({})),
        });

        ensure_input(&mut fake, "Scene", "Media", "mpvs_source", json!({}))
            .await
            .unwrap();

        assert_eq!(fake.count("GetInputList"), 1 + REMOVAL_POLL_ATTEMPTS as usize);
        assert_eq!(fake.count("CreateInput"), 1);
    }

    #[test]
    fn test_choose_text_kind_priority() {
        assert_eq!(
            choose_text_kind(
                &kinds(&["text_source", "text_ft2_source_v2"]),
                &kinds(&["text_gdiplus"])
            ),
            Some("text_ft2_source_v2".to_string())
        );
        assert_eq!(
            choose_text_kind(&kinds(&["browser_source"]), &kinds(&["text_gdiplus"])),
            Some("text_gdiplus".to_string())
        );
        assert_eq!(
            choose_text_kind(&kinds(&["color_source", "my_Text_plugin"]), &kinds(&[])),
            Some("my_Text_plugin".to_string())
        );
        assert_eq!(choose_text_kind(&kinds(&["color_source"]), &kinds(&["image_source"])), None);
    }

    #[tokio::test]
    async fn test_pick_text_source_kind_queries_both_lists() {
        let mut fake = FakeController::new(|req, data| match (req, data["unversioned"].as_bool()) {
            ("GetInputKindList", Some(false)) => Ok(json!({"inputKinds": ["color_source"]})),
            ("GetInputKindList", Some(true)) => Ok(json!({"inputKinds": ["text_ft2_source"]})),
            _ => Ok(json!({})),
        });
        assert_eq!(
            pick_text_source_kind(&mut fake).await,
            Some("text_ft2_source".to_string())
        );
        assert_eq!(fake.count("GetInputKindList"), 2);
    }

    #[tokio::test]
    async fn test_pick_text_source_kind_tolerates_failures() {
        let mut fake = FakeController::new(|req, _| Err(rejected(req)));
        assert_eq!(pick_text_source_kind(&mut fake).await, None);
    }

    #[tokio::test]
    async fn test_require_media_source_kind() {
        let mut fake = FakeController::new(|req, data| match (req, data["unversioned"].as_bool()) {
            ("GetInputKindList", Some(true)) => Ok(json!({"inputKinds": ["mpvs_source"]})),
            _ => Ok(json!({"inputKinds": ["ffmpeg_source_v2"]})),
        });
        assert_eq!(require_media_source_kind(&mut fake).await.unwrap(), "mpvs_source");

        let mut fake = FakeController::new(|_, _| Ok(json!({"inputKinds": ["ffmpeg_source"]})));
        let err = require_media_source_kind(&mut fake).await.unwrap_err();
        assert!(matches!(err, ProvisionError::MediaKindUnavailable { .. }));
        assert!(err.to_string().contains("obs-mpv"));
    }

    #[tokio::test]
    async fn test_position_and_raise_overlay() {
        let mut fake = FakeController::new(|req, _| match req {
            "GetSceneItemId" => Ok(json!({"sceneItemId": 7})),
            "GetSceneItemList" => Ok(json!({"sceneItems": [
                {"sceneItemId": 3, "sceneItemIndex": 0, "sourceName": "Media"},
                {"sceneItemId": 7, "sceneItemIndex": 1, "sourceName": "NowPlaying"},
                {"sceneItemId": 9, "sceneItemIndex": 2, "sourceName": "Logo"},
            ]})),
            _ => Ok(json!({})),
        });

        position_overlay(&mut fake, "Scene", "NowPlaying", 10.0, 10.0).await;
        raise_to_top(&mut fake, "Scene", "NowPlaying").await;

        let transform = fake.params("SetSceneItemTransform");
        assert_eq!(transform[0]["sceneItemId"], json!(7));
        assert_eq!(transform[0]["sceneItemTransform"]["positionX"], json!(10.0));
        let index = fake.params("SetSceneItemIndex");
        assert_eq!(index[0]["sceneItemId"], json!(7));
        assert_eq!(index[0]["sceneItemIndex"], json!(2));
    }

    #[tokio::test]
    async fn test_cosmetic_placement_never_fails() {
        let mut fake = FakeController::new(|req, _| Err(rejected(req)));
        position_overlay(&mut fake, "Scene", "NowPlaying", 10.0, 10.0).await;
        raise_to_top(&mut fake, "Scene", "NowPlaying").await;
        assert_eq!(fake.sequence(), vec!["GetSceneItemId", "GetSceneItemList"]);
    }
}
