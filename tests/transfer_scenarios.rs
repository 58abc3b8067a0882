//! End-to-end transfer scenarios
//!
//! Borrower issues 1000 to Lender, then Lender transfers the right to be
//! repaid to NewLender. Every test builds its own in-process network.

use std::sync::Arc;

use obligation_transfer::ledger::WireTransaction;
use obligation_transfer::{
    Contract, ContractError, InitiatorStage, LinearId, LocalNetwork, Node, ObligationContract,
    ProtocolConfig, RunId, SignedTransaction, TransferError,
};

const LENDER: &str = "O=Lender,L=London,C=GB";
const BORROWER: &str = "O=Borrower,L=New York,C=US";
const NEW_LENDER: &str = "O=NewLender,L=Paris,C=FR";

fn config() -> ProtocolConfig {
    ProtocolConfig {
        anonymous: false,
        session_timeout_ms: Some(2_000),
        flow_timeout_ms: Some(5_000),
        session_buffer: 16,
    }
}

struct Parties {
    network: LocalNetwork,
    lender: Node,
    borrower: Node,
    new_lender: Node,
}

fn parties() -> Parties {
    let network = LocalNetwork::new(config());
    Parties {
        lender: network.create_node(LENDER),
        borrower: network.create_node(BORROWER),
        new_lender: network.create_node(NEW_LENDER),
        network,
    }
}

async fn issue(p: &Parties, anonymous: bool) -> (LinearId, SignedTransaction) {
    let issued = p
        .borrower
        .issue_obligation(p.lender.identity(), 1000, anonymous)
        .await
        .unwrap();
    (issued.tx.outputs()[0].linear_id, issued)
}

/// Unconsumed version at each node, serialised for byte comparison
fn snapshots(nodes: &[&Node], linear_id: &LinearId) -> Vec<Option<String>> {
    nodes
        .iter()
        .map(|n| {
            n.vault()
                .get_by_linear_id(linear_id)
                .ok()
                .map(|s| serde_json::to_string(&s).unwrap())
        })
        .collect()
}

/// Rule engine that refuses every transaction
struct RefuseAll;

impl Contract for RefuseAll {
    fn verify(&self, _tx: &WireTransaction) -> Result<(), ContractError> {
        Err(ContractError::LenderUnchanged)
    }
}

#[tokio::test]
async fn scenario_a_non_anonymous_transfer() {
    let p = parties();
    let (linear_id, issued) = issue(&p, false).await;
    let input = issued.tx.outputs()[0].clone();

    let committed = p
        .lender
        .transfer_obligation(linear_id, p.new_lender.identity(), false)
        .await
        .unwrap();
    let output = committed.tx.outputs()[0].clone();

    // Field update law and linear id stability
    assert_eq!(
        output,
        input.with_new_lender(p.new_lender.identity().clone().into())
    );
    assert_eq!(output.amount, 1000);
    assert_eq!(output.linear_id, linear_id);

    // Identical committed record at all three parties
    let out_ref = committed.tx.out_ref(0);
    let views: Vec<_> = [&p.lender, &p.borrower, &p.new_lender]
        .iter()
        .map(|n| n.vault().load_state(&out_ref).unwrap())
        .collect();
    assert!(views.iter().all(|v| *v == output));

    let encoded: Vec<_> = [&p.lender, &p.borrower, &p.new_lender]
        .iter()
        .map(|n| bincode::serialize(&n.vault().transaction(&committed.id()).unwrap()).unwrap())
        .collect();
    assert!(encoded.windows(2).all(|w| w[0] == w[1]));

    // Index rows at the parties still holding the obligation
    let row = p.new_lender.vault().index().get(&linear_id).unwrap();
    assert_eq!(row.lender, NEW_LENDER);
    assert_eq!(row.borrower, BORROWER);
    assert_eq!(row.value, 1000);
    assert_eq!(row.tx_id, committed.id());
    assert!(p.lender.vault().index().get(&linear_id).is_none());
}

#[tokio::test]
async fn scenario_b_borrower_cannot_transfer() {
    let p = parties();
    let (linear_id, _) = issue(&p, false).await;
    let nodes = [&p.lender, &p.borrower, &p.new_lender];
    let before = snapshots(&nodes, &linear_id);

    let err = p
        .borrower
        .transfer_obligation(linear_id, p.new_lender.identity(), false)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        TransferError::Authorization {
            caller: BORROWER.to_string(),
            lender: LENDER.to_string(),
        }
    );
    assert_eq!(snapshots(&nodes, &linear_id), before);
    assert!(!p.borrower.vault().is_locked(&linear_id));
}

#[tokio::test]
async fn scenario_c_anonymous_transfer() {
    let p = parties();
    let outsider = p.network.create_node("O=Outsider,L=Oslo,C=NO");
    let (linear_id, _) = issue(&p, true).await;

    let committed = p
        .lender
        .transfer_obligation(linear_id, p.new_lender.identity(), true)
        .await
        .unwrap();
    let output = &committed.tx.outputs()[0];
    let lender_ref = &output.lender;
    let borrower_ref = &output.borrower;

    assert_eq!(output.linear_id, linear_id);
    assert!(lender_ref.name_or_none().is_none());
    assert!(borrower_ref.name_or_none().is_none());
    for known in p.network.network_map().parties() {
        assert_ne!(known.owning_key(), lender_ref.owning_key());
        assert_ne!(known.owning_key(), borrower_ref.owning_key());
    }

    // Borrower and new lender resolve each other
    assert_eq!(
        p.borrower.identities().resolve(lender_ref).unwrap(),
        *p.new_lender.identity()
    );
    assert_eq!(
        p.new_lender.identities().resolve(borrower_ref).unwrap(),
        *p.borrower.identity()
    );

    // An uninvolved party resolves neither
    assert!(outsider.identities().resolve(lender_ref).is_err());
    assert!(outsider.identities().resolve(borrower_ref).is_err());

    // Everyone still sees the same version
    let out_ref = committed.tx.out_ref(0);
    for node in [&p.lender, &p.borrower, &p.new_lender] {
        assert_eq!(node.vault().load_state(&out_ref).as_ref(), Some(output));
    }
}

#[tokio::test]
async fn declined_signature_fails_run_and_releases_lock() {
    let network = LocalNetwork::new(config());
    let lender = network.create_node(LENDER);
    let borrower = network.create_node(BORROWER);
    let refusing = network.create_node_with_contract(NEW_LENDER, Arc::new(RefuseAll));

    let issued = borrower
        .issue_obligation(lender.identity(), 1000, false)
        .await
        .unwrap();
    let linear_id = issued.tx.outputs()[0].linear_id;
    let nodes = [&lender, &borrower, &refusing];
    let before = snapshots(&nodes, &linear_id);

    let initiator = lender.transfer_initiator(linear_id, refusing.identity(), false);
    let err = initiator.run().await.unwrap_err();

    assert_eq!(err.code(), "SIGNATURE");
    assert_eq!(initiator.progress().current(), InitiatorStage::Failed);
    assert!(!lender.vault().is_locked(&linear_id));
    assert_eq!(snapshots(&nodes, &linear_id), before);
    assert!(network.notary().consumed_by(&issued.tx.out_ref(0)).await.is_none());
}

#[tokio::test]
async fn locked_obligation_fails_fast() {
    let p = parties();
    let (linear_id, _) = issue(&p, false).await;

    let guard = p.lender.vault().soft_lock(linear_id, RunId::new()).unwrap();
    let err = p
        .lender
        .transfer_obligation(linear_id, p.new_lender.identity(), false)
        .await
        .unwrap_err();
    assert_eq!(err, TransferError::StateLocked(linear_id));

    // Same transfer succeeds once the other run lets go
    drop(guard);
    assert!(
        p.lender
            .transfer_obligation(linear_id, p.new_lender.identity(), false)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn transfers_of_different_obligations_run_concurrently() {
    let p = parties();
    let (first, _) = issue(&p, false).await;
    let (second, _) = issue(&p, true).await;

    let (a, b) = tokio::join!(
        p.lender
            .transfer_obligation(first, p.new_lender.identity(), false),
        p.lender
            .transfer_obligation(second, p.new_lender.identity(), true),
    );

    assert_eq!(a.unwrap().tx.outputs()[0].linear_id, first);
    assert_eq!(b.unwrap().tx.outputs()[0].linear_id, second);
    assert_eq!(p.new_lender.vault().unconsumed_states().len(), 2);
}

#[tokio::test]
async fn issuance_rules_enforced_before_any_session() {
    let p = parties();

    let err = p
        .borrower
        .issue_obligation(p.lender.identity(), 0, false)
        .await
        .unwrap_err();
    assert_eq!(err, TransferError::Validation(ContractError::ZeroAmount));

    let err = p
        .borrower
        .issue_obligation(p.borrower.identity(), 10, false)
        .await
        .unwrap_err();
    assert_eq!(err, TransferError::Validation(ContractError::SameParty));
    assert!(p.lender.vault().unconsumed_states().is_empty());
}

#[test]
fn obligation_contract_is_default_rule_engine() {
    // Plain struct, usable without a runtime
    let _engine: Arc<dyn Contract> = Arc::new(ObligationContract);
}
