//! Finality Subprotocol
//!
//! Notarise a fully signed transaction, record it locally and push the
//! committed copy to every participant and observer. Recipients are
//! resolved before the commit so an unknown participant fails the run
//! while nothing has been committed yet.

use std::collections::BTreeSet;
use tracing::{error, info};

use super::error::TransferError;
use crate::identity::Party;
use crate::ledger::SignedTransaction;
use crate::network::{FlowKind, Session, SessionError, SessionMessage};
use crate::node::ServiceHub;

pub async fn finalise(
    hub: &ServiceHub,
    stx: SignedTransaction,
    observers: &[Party],
) -> Result<SignedTransaction, TransferError> {
    stx.verify_required_signatures()?;
    hub.contract.verify(&stx.tx)?;

    let mut recipients = BTreeSet::new();
    for participant in stx.tx.participants() {
        recipients.insert(hub.identities.resolve(&participant)?);
    }
    recipients.extend(observers.iter().cloned());
    recipients.remove(&hub.identity);

    let notary_sig = hub.notary.commit(&stx).await?;
    let committed = stx.with_signatures([notary_sig]);
    hub.vault.record_transaction(committed.clone());
    info!(
        tx_id = %committed.id().short(),
        notary = %hub.notary.identity(),
        recipients = recipients.len(),
        "Transaction committed"
    );

    // The commit already happened; a failed delivery is logged, not fatal
    for party in &recipients {
        if let Err(e) = broadcast_to(hub, party, &committed).await {
            error!(
                counterparty = %party,
                tx_id = %committed.id().short(),
                error = %e,
                "Failed to deliver committed transaction"
            );
        }
    }

    Ok(committed)
}

async fn broadcast_to(
    hub: &ServiceHub,
    party: &Party,
    committed: &SignedTransaction,
) -> Result<(), TransferError> {
    let mut session = hub.open_session(party, FlowKind::ReceiveFinality).await?;
    session
        .send(SessionMessage::Finalised(committed.clone()))
        .await?;
    match session.receive().await? {
        SessionMessage::FinalisedAck => Ok(()),
        other => Err(SessionError::unexpected("FinalisedAck", &other).into()),
    }
}

/// Receiver side: verify the committed copy, record it, acknowledge.
pub async fn receive_finalised(
    hub: &ServiceHub,
    session: &mut Session,
) -> Result<SignedTransaction, TransferError> {
    let stx = match session.receive().await? {
        SessionMessage::Finalised(stx) => stx,
        other => return Err(SessionError::unexpected("Finalised", &other).into()),
    };

    stx.verify_required_signatures()?;
    let notary_key = stx.tx.notary().owning_key();
    if !stx.signed_keys().contains(&notary_key) {
        return Err(TransferError::Signature(format!(
            "missing signature of notary {}",
            stx.tx.notary()
        )));
    }
    hub.contract.verify(&stx.tx)?;

    hub.vault.record_transaction(stx.clone());
    session.send(SessionMessage::FinalisedAck).await?;
    Ok(stx)
}
