//! Nullable transport — hops served in-process.
//!
//! Commands are executed directly against registered [`NodeOperations`]
//! handles. The reply mode decides how the response comes back: in the
//! dispatch call, later through a [`ResponseSink`], or both.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chainpay_network::{ResponseSink, Transport, TransportError};
use chainpay_protocol::{execute, Command, CommandResponse, NodeOperations};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyMode {
    /// Reply in the dispatch call.
    Sync,
    /// Accept, then deliver the response to the sink from a spawned task.
    Async,
    /// Reply in the dispatch call and deliver a duplicate to the sink.
    Both,
}

pub struct LoopbackTransport {
    nodes: Mutex<HashMap<String, Arc<dyn NodeOperations>>>,
    mode: Mutex<ReplyMode>,
    sink: Mutex<Option<Arc<dyn ResponseSink>>>,
    dispatched: AtomicUsize,
    delivered: Arc<AtomicUsize>,
    dropped: Arc<AtomicUsize>,
}

impl LoopbackTransport {
    pub fn new(mode: ReplyMode) -> Self {
        Self {
            nodes: Mutex::new(HashMap::new()),
            mode: Mutex::new(mode),
            sink: Mutex::new(None),
            dispatched: AtomicUsize::new(0),
            delivered: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Serve `node` at `endpoint`.
    pub fn register(&self, endpoint: impl Into<String>, node: Arc<dyn NodeOperations>) {
        self.nodes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(endpoint.into(), node);
    }

    pub fn set_mode(&self, mode: ReplyMode) {
        *self.mode.lock().unwrap_or_else(|p| p.into_inner()) = mode;
    }

    /// Where asynchronous responses go.
    pub fn set_sink(&self, sink: Arc<dyn ResponseSink>) {
        *self.sink.lock().unwrap_or_else(|p| p.into_inner()) = Some(sink);
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// Asynchronous responses a waiter accepted.
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Asynchronous responses nobody was waiting for.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    fn deliver_later(&self, sink: Arc<dyn ResponseSink>, response: CommandResponse) {
        let delivered = Arc::clone(&self.delivered);
        let dropped = Arc::clone(&self.dropped);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            if sink.deliver(response) {
                delivered.fetch_add(1, Ordering::SeqCst);
            } else {
                dropped.fetch_add(1, Ordering::SeqCst);
            }
        });
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn dispatch(
        &self,
        endpoint: &str,
        command: &Command,
    ) -> Result<Option<CommandResponse>, TransportError> {
        let node = self
            .nodes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(endpoint)
            .cloned()
            .ok_or_else(|| TransportError::UnknownEndpoint(endpoint.to_string()))?;
        let mode = *self.mode.lock().unwrap_or_else(|p| p.into_inner());
        let sink = self.sink.lock().unwrap_or_else(|p| p.into_inner()).clone();
        self.dispatched.fetch_add(1, Ordering::SeqCst);

        match (mode, sink) {
            (ReplyMode::Sync, _) => Ok(Some(execute(node.as_ref(), command.clone()).await)),
            (ReplyMode::Async, Some(sink)) => {
                let command = command.clone();
                let delivered = Arc::clone(&self.delivered);
                let dropped = Arc::clone(&self.dropped);
                tokio::spawn(async move {
                    let response = execute(node.as_ref(), command).await;
                    if sink.deliver(response) {
                        delivered.fetch_add(1, Ordering::SeqCst);
                    } else {
                        dropped.fetch_add(1, Ordering::SeqCst);
                    }
                });
                Ok(None)
            }
            (ReplyMode::Both, Some(sink)) => {
                let response = execute(node.as_ref(), command.clone()).await;
                self.deliver_later(sink, response.clone());
                Ok(Some(response))
            }
            (_, None) => Err(TransportError::RequestFailed(
                "asynchronous reply requested without a response sink".into(),
            )),
        }
    }
}
