//! RPC error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chainpay_node::NodeError;
use chainpay_payment::PaymentError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("node error: {0}")]
    Node(#[from] NodeError),

    #[error("server error: {0}")]
    Server(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl RpcError {
    pub fn status(&self) -> StatusCode {
        match self {
            RpcError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RpcError::NotFound(_) => StatusCode::NOT_FOUND,
            RpcError::Payment(PaymentError::NotFound(_)) => StatusCode::NOT_FOUND,
            RpcError::Payment(PaymentError::DuplicateSession(_)) => StatusCode::CONFLICT,
            RpcError::Payment(PaymentError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            RpcError::Payment(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            RpcError::Payment(_) => StatusCode::BAD_GATEWAY,
            RpcError::Node(NodeError::Accumulation(_)) => StatusCode::BAD_REQUEST,
            RpcError::Node(_) | RpcError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "rpc request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
