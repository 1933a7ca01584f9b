//! How commands reach a hop.

use std::time::Duration;

use async_trait::async_trait;
use chainpay_protocol::codec::{decode, encode};
use chainpay_protocol::{Command, CommandResponse};
use reqwest::StatusCode;

use crate::TransportError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `command` to the hop listening at `endpoint`.
    ///
    /// `Some` carries a synchronous reply. `None` means the hop accepted the
    /// command and will deliver the response out of band.
    async fn dispatch(
        &self,
        endpoint: &str,
        command: &Command,
    ) -> Result<Option<CommandResponse>, TransportError>;
}

/// JSON over HTTP.
///
/// `POST {endpoint}/commands`: `200` with a body is a synchronous reply,
/// `202` means the response will be posted to the command's `reply_to`.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Post an asynchronous response back to the node that sent the command:
    /// `POST {reply_to}/responses`.
    pub async fn send_response(
        &self,
        reply_to: &str,
        response: &CommandResponse,
    ) -> Result<(), TransportError> {
        let url = format!("{}/responses", reply_to.trim_end_matches('/'));
        let body = encode(response)?;
        let reply = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_send_error)?;
        // 404 means the caller stopped waiting; nothing more to do here.
        if !reply.status().is_success() && reply.status() != StatusCode::NOT_FOUND {
            return Err(TransportError::RequestFailed(format!(
                "HTTP status {}",
                reply.status()
            )));
        }
        Ok(())
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Unreachable(format!("request timed out: {e}"))
    } else if e.is_connect() {
        TransportError::Unreachable(format!("connection failed: {e}"))
    } else {
        TransportError::RequestFailed(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn dispatch(
        &self,
        endpoint: &str,
        command: &Command,
    ) -> Result<Option<CommandResponse>, TransportError> {
        let url = format!("{}/commands", endpoint.trim_end_matches('/'));
        let body = encode(command)?;

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_send_error)?;

        match response.status() {
            StatusCode::ACCEPTED => Ok(None),
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
                Ok(Some(decode(&bytes)?))
            }
            status => Err(TransportError::RequestFailed(format!("HTTP status {status}"))),
        }
    }
}
