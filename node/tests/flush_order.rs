//! Flush submits outstanding transactions in ascending sequence order and
//! stops at the first rejection.

use std::sync::Arc;

use chainpay_crypto::{derive_address, keypair_from_seed};
use chainpay_ledger::LedgerClient;
use chainpay_node::{LocalNode, NodeError, NodeSettings};
use chainpay_nullables::NullLedger;
use chainpay_protocol::{CreateTransactionArgs, NodeOperations};
use chainpay_types::{Amount, Asset, KeyPair, NodeId, PaymentTransactionReplacing, SessionId};

fn payee(ledger: &Arc<NullLedger>) -> LocalNode {
    LocalNode::new(
        NodeSettings {
            node_id: NodeId::from("node-s"),
            fee: Amount::ZERO,
            asset: Asset::new("XLM"),
            accumulate: true,
        },
        keypair_from_seed(&[9; 32]),
        ledger.clone(),
    )
}

/// A fully signed leg from `payer` to `node`, ready to commit.
async fn signed_leg(
    ledger: &NullLedger,
    node: &LocalNode,
    payer: &KeyPair,
    session: &str,
) -> PaymentTransactionReplacing {
    let session = SessionId::from(session);
    let pair = node
        .create_transaction(
            &session,
            CreateTransactionArgs {
                total_in: Amount::new(100),
                total_out: Amount::new(100),
                fee: Amount::ZERO,
                source: derive_address(&payer.public),
            },
        )
        .await
        .unwrap();
    let mut pair = node.sign_service_transaction(&session, pair).await.unwrap();
    pair.pending.envelope = ledger.sign(&pair.pending.envelope, payer).unwrap();
    pair
}

#[tokio::test]
async fn flush_is_ordered_and_stops_at_first_failure() {
    let ledger = Arc::new(NullLedger::new());
    let node = payee(&ledger);
    ledger.set_sequence(node.address(), 2);

    // Three payers, so each leg is its own outstanding transaction.
    let payers: Vec<KeyPair> = (1..=3u8).map(|seed| keypair_from_seed(&[seed; 32])).collect();
    for payer in &payers {
        ledger.fund(&derive_address(&payer.public), Amount::new(1_000));
    }
    // Each leg is saved before the next is created, so sequences follow on
    // from the outstanding ones.
    let mut sequences = Vec::new();
    for (i, payer) in payers.iter().enumerate() {
        let leg = signed_leg(&ledger, &node, payer, &format!("s{i}")).await;
        sequences.push(ledger.sequence_number(&leg.pending.envelope).unwrap());
        let session = leg.session_id().clone();
        node.commit_chain_transaction(&session, leg).await.unwrap();
    }
    assert_eq!(sequences, vec![3, 4, 5]);
    assert_eq!(node.registry().len(), 3);

    ledger.fail_sequence(4);
    let err = node.flush().await.unwrap_err();
    assert!(matches!(err, NodeError::Flush { sequence: 4, .. }));
    assert_eq!(ledger.submissions(), vec![3, 4]);

    let remaining: Vec<i64> = node
        .registry()
        .outstanding()
        .iter()
        .map(|entry| entry.sequence)
        .collect();
    assert_eq!(remaining, vec![4, 5]);

    ledger.clear_failures();
    let report = node.flush().await.unwrap();
    assert_eq!(report.submitted, vec![4, 5]);
    assert!(node.registry().is_empty());
    assert_eq!(ledger.balance_of(node.address()), Amount::new(300));
}

#[tokio::test]
async fn empty_flush_is_a_no_op() {
    let ledger = Arc::new(NullLedger::new());
    let node = payee(&ledger);
    let report = node.flush().await.unwrap();
    assert!(report.is_empty());
    assert!(ledger.submissions().is_empty());
}
