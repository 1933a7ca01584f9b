//! Axum-based RPC server.

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use chainpay_network::HttpTransport;
use chainpay_node::LocalNode;
use chainpay_payment::PaymentManagerRegistry;
use tokio::net::TcpListener;
use tracing::info;

use crate::error::RpcError;
use crate::handlers;

/// Shared state behind every handler.
pub struct RpcState {
    pub node: Arc<LocalNode>,
    pub payments: Arc<PaymentManagerRegistry>,
    /// Posts asynchronous replies back to the sender of a command.
    pub responder: HttpTransport,
    pub async_replies: bool,
    pub enable_metrics: bool,
}

pub fn router(state: Arc<RpcState>) -> Router {
    Router::new()
        .route("/commands", post(handlers::commands))
        .route("/responses", post(handlers::responses))
        .route("/payment-requests", post(handlers::payment_requests))
        .route("/payments", post(handlers::payments))
        .route("/payments/:session_id", get(handlers::payment_status))
        .route("/flush", post(handlers::flush))
        .route("/balance", get(handlers::balance))
        .route("/status", get(handlers::status))
        .route("/metrics", get(handlers::metrics))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: Arc<RpcState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), RpcError> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| RpcError::Server(e.to_string()))
}

pub struct RpcServer {
    pub port: u16,
    pub state: Arc<RpcState>,
}

impl RpcServer {
    pub fn new(port: u16, state: Arc<RpcState>) -> Self {
        Self { port, state }
    }

    /// Bind and serve until `shutdown` resolves.
    pub async fn start(
        &self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), RpcError> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| RpcError::Server(format!("failed to bind {addr}: {e}")))?;
        info!(%addr, "rpc server listening");
        serve(listener, self.state.clone(), shutdown).await
    }
}
