//! Controller session module for the playout daemon
//!
//! Every interaction with the remote production controller goes through the
//! [`Controller`] trait: one request, one response, no concurrency.

pub mod protocol;
pub mod session;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

pub use session::{ConnectError, ObsSession, CALL_TIMEOUT};

/// Error type for a single controller call
#[derive(Debug, Error)]
pub enum CallError {
    /// The socket failed while sending or receiving
    #[error("transport error: {0}")]
    Transport(String),

    /// The controller closed the connection
    #[error("connection closed: {0}")]
    Closed(String),

    /// No response arrived within the per-call timeout
    #[error("{request_type} timed out after {timeout_ms} ms")]
    Timeout {
        request_type: String,
        timeout_ms: u64,
    },

    /// The controller answered with a failed request status
    #[error("{request_type} rejected with code {code}: {comment}")]
    Rejected {
        request_type: String,
        code: i64,
        comment: String,
    },

    /// A frame or payload did not have the expected shape
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Synchronous request/response access to the remote controller.
#[async_trait]
pub trait Controller: Send {
    /// Issues `request_type` with `data` as its parameters and returns the
    /// response payload (`{}` when the controller sends none).
    async fn call(&mut self, request_type: &str, data: Value) -> Result<Value, CallError>;
}

/// Issues a call and deserializes its response payload.
pub async fn request<T, C>(controller: &mut C, request_type: &str, data: Value) -> Result<T, CallError>
where
    T: DeserializeOwned,
    C: Controller + ?Sized,
{
    let value = controller.call(request_type, data).await?;
    serde_json::from_value(value)
        .map_err(|e| CallError::Protocol(format!("unexpected {} response: {}", request_type, e)))
}

/// Marks a call site as "try once, log, continue".
pub trait BestEffort<T> {
    /// Logs the failure at `warn` and yields `None` instead of an error.
    fn best_effort(self, operation: &str) -> Option<T>;
}

impl<T> BestEffort<T> for Result<T, CallError> {
    fn best_effort(self, operation: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(operation, error = %e, "controller call failed; continuing");
                None
            }
        }
    }
}
