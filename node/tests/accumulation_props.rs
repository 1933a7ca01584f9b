use std::sync::Arc;

use proptest::prelude::*;

use chainpay_crypto::{derive_address, keypair_from_seed};
use chainpay_ledger::LedgerClient;
use chainpay_node::{LocalNode, NodeSettings};
use chainpay_nullables::NullLedger;
use chainpay_protocol::{CreateTransactionArgs, NodeOperations};
use chainpay_types::{Amount, Asset, NodeId, SessionId};

/// Commit one payee leg per amount, all from the same payer, and return the
/// folded amount and each leg's sequence number.
async fn accumulate(amounts: &[u64]) -> (Amount, Vec<i64>, Amount) {
    let ledger = Arc::new(NullLedger::new());
    let payer = keypair_from_seed(&[1; 32]);
    let payer_address = derive_address(&payer.public);
    ledger.fund(&payer_address, Amount::new(1_000_000));
    let node = LocalNode::new(
        NodeSettings {
            node_id: NodeId::from("node-s"),
            fee: Amount::ZERO,
            asset: Asset::new("XLM"),
            accumulate: true,
        },
        keypair_from_seed(&[2; 32]),
        ledger.clone(),
    );

    let mut sequences = Vec::new();
    for (i, amount) in amounts.iter().enumerate() {
        let session = SessionId::new(format!("s{i}"));
        let pair = node
            .create_transaction(
                &session,
                CreateTransactionArgs {
                    total_in: Amount::from(*amount),
                    total_out: Amount::from(*amount),
                    fee: Amount::ZERO,
                    source: payer_address.clone(),
                },
            )
            .await
            .unwrap();
        let mut pair = node.sign_service_transaction(&session, pair).await.unwrap();
        pair.pending.envelope = ledger.sign(&pair.pending.envelope, &payer).unwrap();
        sequences.push(ledger.sequence_number(&pair.pending.envelope).unwrap());
        node.commit_chain_transaction(&session, pair).await.unwrap();
    }

    let folded = node
        .registry()
        .get_active(&payer_address)
        .map(|tx| tx.amount_out)
        .unwrap_or_default();
    node.flush().await.unwrap();
    (folded, sequences, ledger.balance_of(node.address()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Legs between one payer and one payee fold into a single transaction
    /// carrying the sum, on one sequence number, settled by one submission.
    #[test]
    fn accumulated_amount_is_the_sum(amounts in prop::collection::vec(1u64..10_000, 1..6)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (folded, sequences, settled) = runtime.block_on(accumulate(&amounts));

        let total = Amount::new(amounts.iter().map(|a| u128::from(*a)).sum());
        prop_assert_eq!(folded, total);
        prop_assert!(sequences.windows(2).all(|w| w[0] == w[1]));
        prop_assert_eq!(settled, total);
    }
}
