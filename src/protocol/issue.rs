//! Obligation issuance
//!
//! The borrower proposes a new obligation to a lender. With anonymity the
//! two first swap fresh pseudonyms and the obligation names only those.

use tracing::{info, info_span, Instrument};

use super::collect_signatures::{collect_signatures, sign_or_decline};
use super::error::TransferError;
use super::finality::finalise;
use super::swap_identities::swap_identities;
use crate::core_types::Amount;
use crate::identity::{AbstractParty, Party};
use crate::ledger::{Command, SignedTransaction, TransactionBuilder};
use crate::network::{FlowKind, Session};
use crate::node::ServiceHub;
use crate::obligation::{Obligation, ObligationCommand};

/// Issue an obligation of `amount` owed by this node to `lender`.
pub async fn issue_obligation(
    hub: &ServiceHub,
    lender: &Party,
    amount: Amount,
    anonymous: bool,
) -> Result<SignedTransaction, TransferError> {
    let span = info_span!("issue", lender = %lender, amount, anonymous);
    async {
        let (lender_ref, borrower_ref): (AbstractParty, AbstractParty) = if anonymous {
            let swapped = swap_identities(hub, lender).await?;
            (swapped.theirs.into(), swapped.ours.into())
        } else {
            (lender.clone().into(), hub.identity.clone().into())
        };

        let borrower_key = borrower_ref.owning_key();
        let obligation = Obligation::new(lender_ref, borrower_ref, amount);
        let linear_id = obligation.linear_id;
        let signers = obligation.participant_keys();
        let tx = TransactionBuilder::new(hub.notary.identity().clone())
            .add_output_state(obligation)
            .add_command(Command::new(ObligationCommand::Issue, signers))
            .to_wire_transaction()?;

        hub.contract.verify(&tx)?;
        let ptx = hub.sign_initial(tx, &borrower_key)?;

        let session = hub.open_session(lender, FlowKind::IssueObligation).await?;
        let stx = collect_signatures(hub, ptx, &mut [session], &[borrower_key]).await?;
        let committed = finalise(hub, stx, &[]).await?;

        info!(linear_id = %linear_id, tx_id = %committed.id().short(), "Obligation issued");
        Ok::<_, TransferError>(committed)
    }
    .instrument(span)
    .await
}

/// Lender side of an issuance.
pub async fn respond(hub: &ServiceHub, session: &mut Session) -> Result<SignedTransaction, TransferError> {
    let me = hub.identity.clone();
    let stx = sign_or_decline(hub, session, |tx| {
        let lender_is_me = tx
            .outputs()
            .first()
            .and_then(|o| hub.identities.well_known_party_from_anonymous(&o.lender))
            .is_some_and(|lender| lender == me);
        if tx.command().kind == ObligationCommand::Issue && lender_is_me {
            Ok(())
        } else {
            Err(TransferError::Signature(
                "issuance does not name this node as lender".to_string(),
            ))
        }
    })
    .await?;

    Ok(hub.vault.await_commit(stx.id()).await)
}
