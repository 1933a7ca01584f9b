//! End-to-end payments across a four-node route.
//!
//! Payer P pays payee S 300 through intermediaries A and B, each charging a
//! fee of 10. Every node shares one in-memory ledger; the intermediaries and
//! the payee are reached through the loopback transport, so each command goes
//! through the command channel the way it would for a remote process.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chainpay_crypto::keypair_from_seed;
use chainpay_network::{Transport, TransportError};
use chainpay_node::{LocalNode, NodeSettings};
use chainpay_nullables::{LoopbackTransport, NullLedger, ReplyMode};
use chainpay_payment::{
    ExecuteOutcome, PaymentError, PaymentManagerRegistry, PaymentState, RegistryConfig,
    StatusCallback,
};
use chainpay_protocol::{Command, CommandResponse, NodeOperations};
use chainpay_types::{Amount, Asset, NodeId, PaymentRequest, RoutingNode, SessionId};

const FUNDING: u128 = 10_000;

struct Network {
    ledger: Arc<NullLedger>,
    payer: Arc<LocalNode>,
    a: Arc<LocalNode>,
    b: Arc<LocalNode>,
    s: Arc<LocalNode>,
}

impl Network {
    fn new(accumulate: bool) -> Self {
        let ledger = Arc::new(NullLedger::new());
        let node = |seed: u8, name: &str, fee: u64| {
            Arc::new(LocalNode::new(
                NodeSettings {
                    node_id: NodeId::from(name),
                    fee: Amount::from(fee),
                    asset: Asset::new("XLM"),
                    accumulate,
                },
                keypair_from_seed(&[seed; 32]),
                ledger.clone(),
            ))
        };
        let network = Self {
            payer: node(1, "node-p", 0),
            a: node(2, "node-a", 10),
            b: node(3, "node-b", 10),
            s: node(4, "node-s", 0),
            ledger: ledger.clone(),
        };
        ledger.fund(network.payer.address(), Amount::new(FUNDING));
        network
    }

    fn hops(&self) -> Vec<RoutingNode> {
        [(&self.a, 10u64), (&self.b, 10), (&self.s, 0)]
            .into_iter()
            .map(|(node, fee)| {
                RoutingNode::new(node.node_id().clone(), node.address().clone(), Amount::from(fee))
                    .with_endpoint(format!("loop://{}", node.node_id()))
            })
            .collect()
    }

    fn loopback(&self, mode: ReplyMode) -> Arc<LoopbackTransport> {
        let transport = Arc::new(LoopbackTransport::new(mode));
        for node in [&self.a, &self.b, &self.s] {
            transport.register(format!("loop://{}", node.node_id()), node.clone());
        }
        transport
    }

    fn registry(
        &self,
        transport: Arc<dyn Transport>,
        config: RegistryConfig,
    ) -> Arc<PaymentManagerRegistry> {
        Arc::new(PaymentManagerRegistry::new(self.payer.clone(), transport, config))
    }

    fn request(&self, session: &str) -> PaymentRequest {
        self.s
            .request_payment(SessionId::from(session), "compute", Amount::new(300))
            .unwrap()
    }

    fn balance(&self, node: &LocalNode) -> Amount {
        self.ledger.balance_of(node.address())
    }
}

fn config() -> RegistryConfig {
    RegistryConfig {
        command_timeout: Duration::from_secs(5),
        session_timeout: Duration::from_secs(10),
        ..RegistryConfig::default()
    }
}

#[derive(Default)]
struct Recorder(Mutex<Vec<(SessionId, bool)>>);

#[async_trait]
impl StatusCallback for Recorder {
    async fn on_status(&self, session_id: &SessionId, success: bool) {
        self.0.lock().unwrap().push((session_id.clone(), success));
    }
}

async fn pay_through(mode: ReplyMode) {
    let net = Network::new(false);
    let transport = net.loopback(mode);
    let registry = net.registry(transport.clone(), config());
    transport.set_sink(registry.clone());

    let outcome = registry
        .pay(net.request("session-1"), Some(net.hops()))
        .await
        .unwrap();

    assert_eq!(outcome, ExecuteOutcome::Committed(SessionId::from("session-1")));
    assert_eq!(net.balance(&net.payer), Amount::new(FUNDING - 320));
    assert_eq!(net.balance(&net.a), Amount::new(10));
    assert_eq!(net.balance(&net.b), Amount::new(10));
    assert_eq!(net.balance(&net.s), Amount::new(300));
    assert_eq!(net.s.registry().pending_amount(&SessionId::from("session-1")), None);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn synchronous_replies() {
    pay_through(ReplyMode::Sync).await;
}

#[tokio::test]
async fn asynchronous_replies() {
    pay_through(ReplyMode::Async).await;
}

#[tokio::test]
async fn duplicate_replies_are_dropped() {
    let net = Network::new(false);
    let transport = net.loopback(ReplyMode::Both);
    let registry = net.registry(transport.clone(), config());
    transport.set_sink(registry.clone());

    registry
        .pay(net.request("session-1"), Some(net.hops()))
        .await
        .unwrap();
    // Let the late duplicates land.
    for _ in 0..100 {
        if transport.dropped() == transport.dispatched() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(transport.delivered(), 0);
    assert_eq!(transport.dropped(), transport.dispatched());
    assert_eq!(net.balance(&net.s), Amount::new(300));
}

#[tokio::test]
async fn accumulated_payments_settle_on_flush() {
    let net = Network::new(true);
    let transport = net.loopback(ReplyMode::Sync);
    let registry = net.registry(transport.clone(), config());

    for session in ["session-1", "session-2"] {
        registry
            .pay(net.request(session), Some(net.hops()))
            .await
            .unwrap();
    }

    // Nothing reaches the ledger before a flush.
    assert_eq!(net.balance(&net.payer), Amount::new(FUNDING));
    assert!(net.ledger.submissions().is_empty());
    for node in [&net.a, &net.b, &net.s] {
        assert_eq!(node.registry().len(), 1);
    }
    let folded = net.s.registry().get_active(net.b.address()).unwrap();
    assert_eq!(folded.amount_out, Amount::new(600));
    assert_eq!(folded.reference_amount_in, Amount::new(600));

    // Upstream first, so each intermediary holds the funds it forwards.
    for node in [&net.a, &net.b, &net.s] {
        let report = node.flush().await.unwrap();
        assert_eq!(report.submitted.len(), 1);
    }

    assert_eq!(net.balance(&net.payer), Amount::new(FUNDING - 640));
    assert_eq!(net.balance(&net.a), Amount::new(20));
    assert_eq!(net.balance(&net.b), Amount::new(20));
    assert_eq!(net.balance(&net.s), Amount::new(600));
    assert!(net.s.registry().is_empty());
    assert_eq!(net.s.registry().usage_len(), 0);
}

/// A session that fails after some hops built their legs must not hold up
/// the sequence numbers of the next one.
async fn recover_after_failed_session(accumulate: bool) {
    let net = Network::new(accumulate);
    let registry = net.registry(net.loopback(ReplyMode::Sync), config());

    // A advertises 10, so it refuses the leg once S and B have built theirs.
    let mut overcharged = net.hops();
    overcharged[0].fee = Amount::new(20);
    let err = registry
        .pay(net.request("session-1"), Some(overcharged))
        .await
        .unwrap_err();
    match err {
        PaymentError::Hop { node, .. } => assert_eq!(node, "node-a"),
        other => panic!("unexpected error: {other}"),
    }

    let outcome = registry
        .pay(net.request("session-2"), Some(net.hops()))
        .await
        .unwrap();
    assert_eq!(outcome, ExecuteOutcome::Committed(SessionId::from("session-2")));

    if accumulate {
        for node in [&net.a, &net.b, &net.s] {
            assert_eq!(node.flush().await.unwrap().submitted, vec![1]);
        }
    }
    assert_eq!(net.balance(&net.payer), Amount::new(FUNDING - 320));
    assert_eq!(net.balance(&net.a), Amount::new(10));
    assert_eq!(net.balance(&net.b), Amount::new(10));
    assert_eq!(net.balance(&net.s), Amount::new(300));
    assert_eq!(net.ledger.submissions(), vec![1, 1, 1]);
}

#[tokio::test]
async fn failed_session_does_not_block_the_next() {
    recover_after_failed_session(false).await;
}

#[tokio::test]
async fn failed_session_does_not_block_the_next_flush() {
    recover_after_failed_session(true).await;
}

#[tokio::test]
async fn status_callbacks_hear_the_outcome() {
    let net = Network::new(false);
    let transport = net.loopback(ReplyMode::Sync);
    let recorder = Arc::new(Recorder::default());
    let registry = Arc::new(
        PaymentManagerRegistry::new(net.payer.clone(), transport, config())
            .with_callback(recorder.clone()),
    );

    registry
        .pay(net.request("session-1"), Some(net.hops()))
        .await
        .unwrap();
    // Never requested by the payee.
    let unrequested = PaymentRequest {
        session_id: SessionId::from("session-2"),
        ..net.request("session-1b")
    };
    let err = registry.pay(unrequested, Some(net.hops())).await.unwrap_err();
    assert!(matches!(err, PaymentError::Hop { .. }));

    assert_eq!(
        *recorder.0.lock().unwrap(),
        vec![
            (SessionId::from("session-1"), true),
            (SessionId::from("session-2"), false)
        ]
    );
}

#[tokio::test]
async fn duplicate_session_leaves_the_first_intact() {
    let net = Network::new(false);
    let registry = net.registry(net.loopback(ReplyMode::Sync), config());
    let request = net.request("session-1");

    let first = registry
        .create(net.payer.address(), request.clone(), Some(net.hops()))
        .await
        .unwrap();
    let err = registry
        .create(net.payer.address(), request, Some(net.hops()))
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::DuplicateSession(_)));
    assert!(Arc::ptr_eq(
        &first,
        &registry.get(&SessionId::from("session-1")).unwrap()
    ));
    assert_eq!(first.state(), PaymentState::Routed);
}

/// Accepts every command and never answers.
struct Silent;

#[async_trait]
impl Transport for Silent {
    async fn dispatch(
        &self,
        _endpoint: &str,
        _command: &Command,
    ) -> Result<Option<CommandResponse>, TransportError> {
        Ok(None)
    }
}

#[tokio::test]
async fn silent_hops_time_the_session_out() {
    let net = Network::new(false);
    let registry = net.registry(
        Arc::new(Silent),
        RegistryConfig {
            command_timeout: Duration::from_secs(30),
            session_timeout: Duration::from_millis(100),
            ..RegistryConfig::default()
        },
    );
    let manager = registry
        .create(net.payer.address(), net.request("session-1"), Some(net.hops()))
        .await
        .unwrap();

    let err = registry.execute(manager.session_id()).await.unwrap_err();

    assert!(matches!(err, PaymentError::Timeout(_)));
    assert_eq!(manager.state(), PaymentState::Failed);
    assert_eq!(manager.channel().pending(), 0);
    assert_eq!(net.balance(&net.payer), Amount::new(FUNDING));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn silent_hop_fails_on_command_timeout() {
    let net = Network::new(false);
    let registry = net.registry(
        Arc::new(Silent),
        RegistryConfig {
            command_timeout: Duration::from_millis(50),
            session_timeout: Duration::from_secs(10),
            ..RegistryConfig::default()
        },
    );

    let err = registry
        .pay(net.request("session-1"), Some(net.hops()))
        .await
        .unwrap_err();

    match err {
        PaymentError::Hop { node, error } => {
            assert_eq!(node, "node-s");
            assert!(matches!(error, chainpay_protocol::OperationError::Transport(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}
