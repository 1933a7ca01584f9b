//! Command/response correlation.
//!
//! Every outgoing command gets a single-value slot keyed by its command id,
//! opened before the command is dispatched. The response reaches the slot
//! either straight from the dispatch call or later via [`CommandChannel::deliver`]
//! when the hop answers out of band. Whichever arrives first wins; anything
//! for an id without an open slot is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chainpay_protocol::{Command, CommandResponse};
use chainpay_types::CommandId;
use tokio::sync::oneshot;

use crate::{Transport, TransportError};

/// Anything inbound asynchronous responses can be handed to.
pub trait ResponseSink: Send + Sync {
    /// Returns whether someone was waiting for the response.
    fn deliver(&self, response: CommandResponse) -> bool;
}

/// The receiving half of an open command slot.
#[derive(Debug)]
pub struct ResponseSlot {
    command_id: CommandId,
    rx: oneshot::Receiver<CommandResponse>,
}

impl ResponseSlot {
    pub fn command_id(&self) -> &CommandId {
        &self.command_id
    }

    /// Wait for the response, up to `timeout`.
    pub async fn wait(self, timeout: Duration) -> Result<CommandResponse, TransportError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::ChannelClosed(self.command_id)),
            Err(_) => Err(TransportError::Timeout {
                command_id: self.command_id,
                after_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

#[derive(Debug)]
pub struct CommandChannel {
    slots: Mutex<HashMap<CommandId, oneshot::Sender<CommandResponse>>>,
    prefix: String,
    counter: AtomicU64,
}

/// Closes the slot when the waiting request finishes or is dropped.
struct SlotGuard<'a> {
    channel: &'a CommandChannel,
    command_id: &'a CommandId,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.channel.close(self.command_id);
    }
}

impl CommandChannel {
    pub fn new() -> Self {
        let started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            slots: Mutex::new(HashMap::new()),
            prefix: format!("{started:x}"),
            counter: AtomicU64::new(0),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<CommandId, oneshot::Sender<CommandResponse>>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A command id unique within this channel.
    pub fn next_command_id(&self) -> CommandId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        CommandId::new(format!("{}-{n}", self.prefix))
    }

    /// Register a slot for `command_id`. Re-opening an id abandons the
    /// earlier slot.
    pub fn open(&self, command_id: CommandId) -> ResponseSlot {
        let (tx, rx) = oneshot::channel();
        if self.slots().insert(command_id.clone(), tx).is_some() {
            tracing::warn!(command_id = %command_id, "command slot reopened");
        }
        ResponseSlot { command_id, rx }
    }

    /// Release the slot for `command_id`. Safe to call when none is open.
    pub fn close(&self, command_id: &CommandId) -> bool {
        self.slots().remove(command_id).is_some()
    }

    /// Hand `response` to the slot waiting for it.
    ///
    /// Returns `false`, dropping the response, when no slot is open for its
    /// command id or the waiter has already gone away.
    pub fn deliver(&self, response: CommandResponse) -> bool {
        let command_id = response.command_id.clone();
        let Some(tx) = self.slots().remove(&command_id) else {
            tracing::debug!(command_id = %command_id, "dropping response for unknown command");
            return false;
        };
        if tx.send(response).is_err() {
            tracing::debug!(command_id = %command_id, "dropping response, waiter gone");
            return false;
        }
        true
    }

    /// Number of open slots.
    pub fn pending(&self) -> usize {
        self.slots().len()
    }

    /// Dispatch `command` to `endpoint` and wait for its response.
    ///
    /// A synchronous reply from the transport is used directly. Otherwise
    /// the call waits up to `timeout` for [`deliver`](Self::deliver).
    /// Dropping the returned future releases the slot.
    pub async fn request(
        &self,
        transport: &dyn Transport,
        endpoint: &str,
        command: Command,
        timeout: Duration,
    ) -> Result<CommandResponse, TransportError> {
        let command_id = command.command_id.clone();
        let slot = self.open(command_id.clone());
        let _guard = SlotGuard {
            channel: self,
            command_id: &command_id,
        };

        let response = match transport.dispatch(endpoint, &command).await? {
            Some(response) => response,
            None => slot.wait(timeout).await?,
        };
        if response.command_id != command_id {
            return Err(TransportError::InvalidResponse(format!(
                "response for command {} while waiting for {}",
                response.command_id, command_id
            )));
        }
        Ok(response)
    }
}

impl Default for CommandChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSink for CommandChannel {
    fn deliver(&self, response: CommandResponse) -> bool {
        CommandChannel::deliver(self, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chainpay_protocol::{CreateTransactionArgs, NodeCommand, NodeReply};
    use chainpay_types::{Address, Amount, NodeId, SessionId};
    use std::sync::Arc;

    fn command(id: &CommandId) -> Command {
        Command::new(
            id.clone(),
            SessionId::from("s1"),
            NodeId::from("node-a"),
            NodeCommand::CreateTransaction(CreateTransactionArgs {
                total_in: Amount::new(10),
                total_out: Amount::new(10),
                fee: Amount::ZERO,
                source: Address::new("hop_p"),
            }),
        )
    }

    fn response(id: &str) -> CommandResponse {
        command(&CommandId::from(id)).respond(NodeReply::Committed)
    }

    /// Answers synchronously, or not at all.
    struct FixedTransport {
        sync: bool,
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn dispatch(
            &self,
            _endpoint: &str,
            command: &Command,
        ) -> Result<Option<CommandResponse>, TransportError> {
            Ok(self.sync.then(|| command.respond(NodeReply::Committed)))
        }
    }

    #[test]
    fn delivery_to_unknown_id_leaves_open_slot_alone() {
        let channel = CommandChannel::new();
        let _slot = channel.open(CommandId::from("a"));

        assert!(!channel.deliver(response("b")));
        assert_eq!(channel.pending(), 1);
    }

    #[test]
    fn delivery_after_close_is_dropped() {
        let channel = CommandChannel::new();
        let _slot = channel.open(CommandId::from("a"));
        assert!(channel.close(&CommandId::from("a")));
        assert!(!channel.close(&CommandId::from("a")));
        assert!(!channel.deliver(response("a")));
    }

    #[tokio::test]
    async fn first_delivery_wins() {
        let channel = CommandChannel::new();
        let slot = channel.open(CommandId::from("a"));

        assert!(channel.deliver(response("a")));
        assert!(!channel.deliver(response("a")));
        let received = slot.wait(Duration::from_millis(50)).await.unwrap();
        assert_eq!(received.command_id, CommandId::from("a"));
        assert_eq!(channel.pending(), 0);
    }

    #[test]
    fn command_ids_are_unique() {
        let channel = CommandChannel::new();
        let a = channel.next_command_id();
        let b = channel.next_command_id();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn synchronous_reply_closes_slot() {
        let channel = CommandChannel::new();
        let id = channel.next_command_id();
        let response = channel
            .request(
                &FixedTransport { sync: true },
                "http://hop",
                command(&id),
                Duration::from_millis(50),
            )
            .await
            .unwrap();
        assert_eq!(response.command_id, id);
        assert_eq!(channel.pending(), 0);
        assert!(!channel.deliver(response));
    }

    #[tokio::test]
    async fn asynchronous_reply_is_awaited() {
        let channel = Arc::new(CommandChannel::new());
        let id = channel.next_command_id();

        let waiter = {
            let channel = Arc::clone(&channel);
            let command = command(&id);
            tokio::spawn(async move {
                channel
                    .request(
                        &FixedTransport { sync: false },
                        "http://hop",
                        command,
                        Duration::from_secs(5),
                    )
                    .await
            })
        };

        while channel.pending() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(channel.deliver(command(&id).respond(NodeReply::Committed)));
        let response = waiter.await.unwrap().unwrap();
        assert_eq!(response.body, NodeReply::Committed);
        assert_eq!(channel.pending(), 0);
    }

    #[tokio::test]
    async fn timeout_releases_slot() {
        let channel = CommandChannel::new();
        let id = channel.next_command_id();
        let err = channel
            .request(
                &FixedTransport { sync: false },
                "http://hop",
                command(&id),
                Duration::from_millis(20),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
        assert_eq!(channel.pending(), 0);
    }

    #[tokio::test]
    async fn cancelled_wait_releases_slot() {
        let channel = CommandChannel::new();
        let id = channel.next_command_id();
        let transport = FixedTransport { sync: false };
        let request = channel.request(
            &transport,
            "http://hop",
            command(&id),
            Duration::from_secs(5),
        );
        let outcome = tokio::time::timeout(Duration::from_millis(20), request).await;
        assert!(outcome.is_err());
        assert_eq!(channel.pending(), 0);
    }
}
