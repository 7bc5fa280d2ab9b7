//! WebSocket session with the remote controller.

use super::protocol::{self, op, Envelope, Hello, RequestResponse};
use super::{CallError, Controller};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use playout_daemon_config::ControllerConfig;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Upper bound for a single request/response exchange.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Error type for establishing a session
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Every attempt in the retry budget failed
    #[error("controller not reachable after {attempts} attempts: {last_error}")]
    Unreachable { attempts: u32, last_error: CallError },

    /// Shutdown was requested while waiting between attempts
    #[error("shutdown requested while waiting for the controller")]
    Interrupted,
}

/// An identified obs-websocket connection.
pub struct ObsSession {
    ws: WsStream,
    call_timeout: Duration,
}

impl ObsSession {
    /// Opens a connection and completes the Hello/Identify handshake.
    pub async fn open(
        host: &str,
        port: u16,
        password: &str,
        call_timeout: Duration,
    ) -> Result<Self, CallError> {
        let url = format!("ws://{}:{}", host, port);
        let (ws, _) = timeout(call_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| CallError::Timeout {
                request_type: "connect".to_string(),
                timeout_ms: call_timeout.as_millis() as u64,
            })?
            .map_err(|e| CallError::Transport(e.to_string()))?;

        let mut session = Self { ws, call_timeout };
        timeout(call_timeout, session.identify(password))
            .await
            .map_err(|_| CallError::Timeout {
                request_type: "identify".to_string(),
                timeout_ms: call_timeout.as_millis() as u64,
            })??;
        Ok(session)
    }

    /// Connects with a bounded retry budget.
    ///
    /// Each attempt opens a session and issues `GetVersion`; a failed attempt
    /// waits `connect_delay_ms` before the next one. Blocks for up to
    /// `connect_retries * connect_delay_ms` while the controller starts up.
    pub async fn connect(
        cfg: &ControllerConfig,
        shutdown: &CancellationToken,
    ) -> Result<Self, ConnectError> {
        let attempts = cfg.connect_retries.max(1);
        let delay = Duration::from_millis(cfg.connect_delay_ms);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if shutdown.is_cancelled() {
                return Err(ConnectError::Interrupted);
            }

            match Self::try_connect(cfg).await {
                Ok((session, version)) => {
                    info!(
                        host = %cfg.host,
                        port = cfg.port,
                        attempt,
                        version = %version,
                        "connected to controller"
                    );
                    return Ok(session);
                }
                Err(e) => {
                    debug!(attempt, error = %e, "controller not reachable yet");
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.cancelled() => return Err(ConnectError::Interrupted),
                }
            }
        }

        Err(ConnectError::Unreachable {
            attempts,
            last_error: last_error
                .unwrap_or_else(|| CallError::Transport("no attempt was made".to_string())),
        })
    }

    async fn try_connect(cfg: &ControllerConfig) -> Result<(Self, String), CallError> {
        let mut session = Self::open(&cfg.host, cfg.port, &cfg.password, CALL_TIMEOUT).await?;
        let version = session.call("GetVersion", Value::Null).await?;
        let version = version
            .get("obsVersion")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        Ok((session, version))
    }

    async fn identify(&mut self, password: &str) -> Result<(), CallError> {
        let hello = self.next_envelope().await?;
        if hello.op != op::HELLO {
            return Err(CallError::Protocol(format!(
                "expected Hello (op {}), got op {}",
                op::HELLO,
                hello.op
            )));
        }
        let hello: Hello = serde_json::from_value(hello.d)
            .map_err(|e| CallError::Protocol(format!("malformed Hello: {}", e)))?;
        debug!(
            server_version = hello.obs_web_socket_version.as_deref().unwrap_or("unknown"),
            rpc_version = hello.rpc_version,
            auth_required = hello.authentication.is_some(),
            "received Hello"
        );

        let auth = hello
            .authentication
            .map(|a| protocol::auth_response(password, &a.challenge, &a.salt));
        self.send_text(protocol::identify_message(auth)).await?;

        loop {
            let envelope = self.next_envelope().await?;
            match envelope.op {
                op::IDENTIFIED => return Ok(()),
                op::EVENT => continue,
                other => {
                    return Err(CallError::Protocol(format!(
                        "expected Identified (op {}), got op {}",
                        op::IDENTIFIED,
                        other
                    )))
                }
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), CallError> {
        self.ws
            .send(Message::text(text))
            .await
            .map_err(|e| CallError::Transport(e.to_string()))
    }

    /// Reads frames until a JSON text frame arrives.
    async fn next_envelope(&mut self) -> Result<Envelope, CallError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(text.as_str())
                        .map_err(|e| CallError::Protocol(format!("malformed frame: {}", e)));
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("code {}: {}", u16::from(f.code), f.reason.as_str()))
                        .unwrap_or_else(|| "no close frame".to_string());
                    return Err(CallError::Closed(reason));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(CallError::Transport(e.to_string())),
                None => return Err(CallError::Closed("stream ended".to_string())),
            }
        }
    }

    async fn roundtrip(&mut self, request_type: &str, data: &Value) -> Result<Value, CallError> {
        let request_id = Uuid::new_v4().to_string();
        self.send_text(protocol::request_message(request_type, &request_id, data))
            .await?;

        loop {
            let envelope = self.next_envelope().await?;
            if envelope.op != op::REQUEST_RESPONSE {
                continue;
            }
            let response: RequestResponse = serde_json::from_value(envelope.d)
                .map_err(|e| CallError::Protocol(format!("malformed response: {}", e)))?;
            if response.request_id != request_id {
                debug!(
                    request_type = %response.request_type,
                    "ignoring response to an earlier request"
                );
                continue;
            }
            if !response.request_status.result {
                return Err(CallError::Rejected {
                    request_type: request_type.to_string(),
                    code: response.request_status.code,
                    comment: response.request_status.comment.unwrap_or_default(),
                });
            }
            return Ok(response.response_data.unwrap_or_else(|| json!({})));
        }
    }
}

#[async_trait]
impl Controller for ObsSession {
    async fn call(&mut self, request_type: &str, data: Value) -> Result<Value, CallError> {
        timeout(self.call_timeout, self.roundtrip(request_type, &data))
            .await
            .map_err(|_| CallError::Timeout {
                request_type: request_type.to_string(),
                timeout_ms: self.call_timeout.as_millis() as u64,
            })?
    }
}
