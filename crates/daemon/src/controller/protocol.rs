//! obs-websocket v5 message shapes and authentication.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// RPC version requested during identification.
pub const RPC_VERSION: u32 = 1;

/// Opcodes used by this client.
pub mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

/// Every frame is `{ "op": <opcode>, "d": <payload> }`.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    pub rpc_version: u32,
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Deserialize)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RequestStatus {
    pub result: bool,
    pub code: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn auth_response(password: &str, challenge: &str, salt: &str) -> String {
    let secret = STANDARD.encode(Sha256::digest(format!("{}{}", password, salt).as_bytes()));
    STANDARD.encode(Sha256::digest(format!("{}{}", secret, challenge).as_bytes()))
}

/// Identify frame; no event subscriptions since the daemon only polls.
pub fn identify_message(authentication: Option<String>) -> String {
    let mut d = json!({
        "rpcVersion": RPC_VERSION,
        "eventSubscriptions": 0,
    });
    if let Some(auth) = authentication {
        d["authentication"] = Value::String(auth);
    }
    json!({ "op": op::IDENTIFY, "d": d }).to_string()
}

/// Request frame. `requestData` is omitted when `data` is null or `{}`.
pub fn request_message(request_type: &str, request_id: &str, data: &Value) -> String {
    let mut d = json!({
        "requestType": request_type,
        "requestId": request_id,
    });
    let empty = match data {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if !empty {
        d["requestData"] = data.clone();
    }
    json!({ "op": op::REQUEST, "d": d }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_response_known_vector() {
        let auth = auth_response(
            "supersecretpassword",
            "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=",
            "lM1GncleQOaCu9lT1yeUZhFYnMjKFiHmkT7wvSmoz3A=",
        );
        assert_eq!(auth, "ccrd+lEkfeJR/TV7WjXZuPKlQ/Qkz54JLk8/mjgf034=");
    }

    #[test]
    fn test_identify_message() {
        let with_auth: Value = serde_json::from_str(&identify_message(Some("abc".into()))).unwrap();
        assert_eq!(with_auth["op"], json!(1));
        assert_eq!(with_auth["d"]["rpcVersion"], json!(1));
        assert_eq!(with_auth["d"]["authentication"], json!("abc"));

        let without: Value = serde_json::from_str(&identify_message(None)).unwrap();
        assert!(without["d"].get("authentication").is_none());
    }

    #[test]
    fn test_request_message_omits_empty_data() {
        let msg: Value =
            serde_json::from_str(&request_message("GetVersion", "id-1", &Value::Null)).unwrap();
        assert_eq!(msg["op"], json!(6));
        assert_eq!(msg["d"]["requestType"], json!("GetVersion"));
        assert_eq!(msg["d"]["requestId"], json!("id-1"));
        assert!(msg["d"].get("requestData").is_none());

        let msg: Value = serde_json::from_str(&request_message(
            "CreateScene",
            "id-2",
            &json!({"sceneName": "Scene"}),
        ))
        .unwrap();
        assert_eq!(msg["d"]["requestData"]["sceneName"], json!("Scene"));
    }

    #[test]
    fn test_parse_request_response() {
        let raw = r#"{"op":7,"d":{"requestType":"GetStreamStatus","requestId":"x","requestStatus":{"result":false,"code":501,"comment":"not ready"}}}"#;
        let env: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(env.op, op::REQUEST_RESPONSE);
        let resp: RequestResponse = serde_json::from_value(env.d).unwrap();
        assert!(!resp.request_status.result);
        assert_eq!(resp.request_status.code, 501);
        assert_eq!(resp.request_status.comment.as_deref(), Some("not ready"));
        assert!(resp.response_data.is_none());
    }
}
