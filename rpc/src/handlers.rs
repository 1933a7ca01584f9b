//! RPC request handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chainpay_node::tracing_spans::command_span;
use chainpay_payment::{ExecuteOutcome, PaymentState};
use chainpay_protocol::codec::{decode, encode};
use chainpay_protocol::{execute, Command, CommandResponse, NodeOperations, PROTOCOL_VERSION};
use chainpay_types::{Address, Amount, Asset, NodeId, PaymentRequest, RoutingNode, SessionId};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::error::RpcError;
use crate::server::RpcState;

type AppState = State<Arc<RpcState>>;

// ── Hop protocol ─────────────────────────────────────────────────────────

/// `POST /commands`: execute a hop command against this node.
///
/// Answers in the body, or with `202 Accepted` and a later post to the
/// command's `reply_to` when asynchronous replies are enabled.
pub async fn commands(State(state): AppState, body: Bytes) -> Result<Response, RpcError> {
    let command: Command =
        decode(&body).map_err(|e| RpcError::InvalidRequest(e.to_string()))?;
    state.node.metrics().commands_dispatched.inc();
    let span = command_span(
        command.command_id.as_str(),
        command.session_id.as_str(),
        command.command_type().as_str(),
    );

    if let (true, Some(reply_to)) = (state.async_replies, command.reply_to.clone()) {
        let node = Arc::clone(&state.node);
        let responder = state.responder.clone();
        tokio::spawn(
            async move {
                let response = execute(node.as_ref(), command).await;
                if let Err(error) = responder.send_response(&reply_to, &response).await {
                    tracing::warn!(%reply_to, %error, "failed to post response");
                }
            }
            .instrument(span),
        );
        return Ok(StatusCode::ACCEPTED.into_response());
    }

    let response = execute(state.node.as_ref(), command).instrument(span).await;
    let body = encode(&response).map_err(|e| RpcError::Server(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// `POST /responses`: an asynchronous answer to a command this node sent.
pub async fn responses(State(state): AppState, body: Bytes) -> Result<StatusCode, RpcError> {
    let response: CommandResponse =
        decode(&body).map_err(|e| RpcError::InvalidRequest(e.to_string()))?;
    let metrics = state.node.metrics();
    if state.payments.deliver(response) {
        metrics.commands_delivered.inc();
        Ok(StatusCode::OK)
    } else {
        metrics.commands_dropped.inc();
        Ok(StatusCode::NOT_FOUND)
    }
}

// ── Payments ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct PaymentRequestBody {
    pub session_id: SessionId,
    pub service_ref: String,
    pub amount: Amount,
}

/// `POST /payment-requests`: issue a request for a service this node sold.
pub async fn payment_requests(
    State(state): AppState,
    Json(body): Json<PaymentRequestBody>,
) -> Result<Json<PaymentRequest>, RpcError> {
    let request = state
        .node
        .request_payment(body.session_id, body.service_ref, body.amount)?;
    Ok(Json(request))
}

#[derive(Deserialize)]
pub struct PayBody {
    pub request: PaymentRequest,
    /// First hop after this node through the payee. Discovered when absent.
    #[serde(default)]
    pub hops: Option<Vec<RoutingNode>>,
}

/// `POST /payments`: pay a request from this node.
pub async fn payments(
    State(state): AppState,
    Json(body): Json<PayBody>,
) -> Result<(StatusCode, Json<ExecuteOutcome>), RpcError> {
    let outcome = state.payments.pay(body.request, body.hops).await?;
    let status = match outcome {
        ExecuteOutcome::Committed(_) => StatusCode::OK,
        ExecuteOutcome::Accepted(_) => StatusCode::ACCEPTED,
    };
    Ok((status, Json(outcome)))
}

#[derive(Serialize)]
pub struct PaymentStatus {
    pub session_id: SessionId,
    pub state: PaymentState,
}

/// `GET /payments/:session_id`: state of a live session.
pub async fn payment_status(
    State(state): AppState,
    Path(session_id): Path<String>,
) -> Result<Json<PaymentStatus>, RpcError> {
    let session_id = SessionId::new(session_id);
    let manager = state
        .payments
        .get(&session_id)
        .ok_or_else(|| RpcError::NotFound(format!("session {session_id}")))?;
    Ok(Json(PaymentStatus {
        state: manager.state(),
        session_id,
    }))
}

// ── Node ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct FlushResponse {
    pub submitted: Vec<i64>,
}

/// `POST /flush`
pub async fn flush(State(state): AppState) -> Result<Json<FlushResponse>, RpcError> {
    let report = state.node.flush().await?;
    Ok(Json(FlushResponse {
        submitted: report.submitted,
    }))
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: Address,
    pub asset: Asset,
    pub balance: Amount,
}

/// `GET /balance`
pub async fn balance(State(state): AppState) -> Result<Json<BalanceResponse>, RpcError> {
    let balance = state.node.balance().await?;
    Ok(Json(BalanceResponse {
        address: state.node.address().clone(),
        asset: state.node.settings().asset.clone(),
        balance,
    }))
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub node_id: NodeId,
    pub address: Address,
    pub fee: Amount,
    pub asset: Asset,
    pub accumulate: bool,
    pub outstanding_transactions: usize,
    pub live_sessions: usize,
    pub protocol_version: u16,
}

/// `GET /status`
pub async fn status(State(state): AppState) -> Json<StatusResponse> {
    let settings = state.node.settings();
    Json(StatusResponse {
        node_id: settings.node_id.clone(),
        address: state.node.address().clone(),
        fee: settings.fee,
        asset: settings.asset.clone(),
        accumulate: settings.accumulate,
        outstanding_transactions: state.node.registry().len(),
        live_sessions: state.payments.len(),
        protocol_version: PROTOCOL_VERSION,
    })
}

/// `GET /metrics`: Prometheus text exposition.
pub async fn metrics(State(state): AppState) -> Result<Response, RpcError> {
    if !state.enable_metrics {
        return Err(RpcError::NotFound("metrics are disabled".into()));
    }
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.node.metrics().encode(),
    )
        .into_response())
}
