//! Obligation Transfer
//!
//! The current lender hands the right to be repaid to a new lender. The
//! borrower and the new lender must both sign, and every party ends up
//! with the same committed version or none does.
//!
//! # Run structure
//!
//! ```text
//! Lender (initiator)                 Borrower / New lender (responders)
//!  PREPARATION  soft-lock + get
//!               check caller is lender
//!  BUILDING     [swap identities] ───────▶ SwapIdentities
//!  SIGNING      rule engine, sign
//!  SYNCING      TransferProposal ───────▶ SYNCING  identity-sync with each other
//!               identity-sync ──────────▶          identity-sync from lender
//!  COLLECTING   SignatureRequest ───────▶ SIGNING  check, sign or decline
//!  FINALISING   notary, record, broadcast ─▶ AWAITING_COMMIT
//!  DONE                                   DONE
//! ```
//!
//! The soft lock is held from PREPARATION until the run returns, whichever
//! way it returns.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

use super::collect_signatures::{collect_signatures, sign_or_decline};
use super::error::TransferError;
use super::finality::finalise;
use super::identity_sync;
use super::state::{InitiatorStage, ProgressTracker, ResponderStage};
use super::swap_identities::swap_identities;
use crate::core_types::{LinearId, RunId};
use crate::identity::{AbstractParty, Party};
use crate::ledger::{Command, SignedTransaction, TransactionBuilder, WireTransaction};
use crate::network::{FlowKind, Session, SessionError, SessionMessage, TransferProposal};
use crate::node::ServiceHub;
use crate::obligation::{ContractError, ObligationCommand};

/// Lender side of a transfer.
pub struct TransferInitiator {
    hub: Arc<ServiceHub>,
    linear_id: LinearId,
    new_lender: Party,
    anonymous: bool,
    run_id: RunId,
    progress: ProgressTracker<InitiatorStage>,
}

impl TransferInitiator {
    pub fn new(hub: Arc<ServiceHub>, linear_id: LinearId, new_lender: Party, anonymous: bool) -> Self {
        Self {
            hub,
            linear_id,
            new_lender,
            anonymous,
            run_id: RunId::new(),
            progress: ProgressTracker::new(InitiatorStage::Preparation),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn progress(&self) -> &ProgressTracker<InitiatorStage> {
        &self.progress
    }

    /// Drive the run to DONE or FAILED.
    pub async fn run(&self) -> Result<SignedTransaction, TransferError> {
        let span = info_span!(
            "transfer",
            run_id = %self.run_id,
            linear_id = %self.linear_id,
            new_lender = %self.new_lender
        );
        async {
            match self.execute().await {
                Ok(committed) => {
                    info!(tx_id = %committed.id().short(), "Transfer completed");
                    Ok(committed)
                }
                Err(e) => {
                    let stage = self.progress.current();
                    self.progress.fail();
                    if stage.is_cancellable() {
                        warn!(stage = %stage, code = e.code(), error = %e, "Transfer aborted");
                    } else {
                        error!(stage = %stage, code = e.code(), error = %e, "Transfer failed while finalising");
                    }
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self) -> Result<SignedTransaction, TransferError> {
        let hub = &self.hub;

        // PREPARATION
        // Lock first: the version read below cannot be consumed by another run on this node
        let _lock = hub.vault.soft_lock(self.linear_id, self.run_id)?;
        let input = hub.vault.get_by_linear_id(&self.linear_id)?;

        let lender = hub.identities.resolve(&input.state.lender)?;
        if lender != hub.identity {
            return Err(TransferError::Authorization {
                caller: hub.identity.name().to_string(),
                lender: lender.name().to_string(),
            });
        }

        // BUILDING
        self.progress.advance(InitiatorStage::Building)?;
        if self.new_lender == hub.identity {
            return Err(ContractError::LenderUnchanged.into());
        }
        let new_lender_ref: AbstractParty = if self.anonymous {
            swap_identities(hub, &self.new_lender).await?.theirs.into()
        } else {
            self.new_lender.clone().into()
        };

        let output = input.state.with_new_lender(new_lender_ref);
        let mut signers = input.state.participant_keys();
        signers.push(output.lender.owning_key());
        let tx = TransactionBuilder::new(hub.notary.identity().clone())
            .add_input_state(input.clone())
            .add_output_state(output)
            .add_command(Command::new(ObligationCommand::Transfer, signers))
            .to_wire_transaction()?;

        // SIGNING
        self.progress.advance(InitiatorStage::Signing)?;
        hub.contract.verify(&tx)?;
        let lender_key = input.state.lender.owning_key();
        let ptx = hub.sign_initial(tx, &lender_key)?;

        let borrower = hub.identities.resolve(&input.state.borrower)?;

        // SYNCING
        self.progress.advance(InitiatorStage::Syncing)?;
        // Borrower and new lender may be the same node
        let counterparties: BTreeSet<Party> = [borrower.clone(), self.new_lender.clone()]
            .into_iter()
            .collect();
        let mut sessions = Vec::with_capacity(counterparties.len());
        for party in &counterparties {
            sessions.push(hub.open_session(party, FlowKind::TransferObligation).await?);
        }

        let proposal = TransferProposal {
            borrower,
            new_lender: self.new_lender.clone(),
            tx: ptx.tx.clone(),
        };
        for session in &sessions {
            session
                .send(SessionMessage::TransferProposal(proposal.clone()))
                .await?;
        }
        identity_sync::send(hub, &mut sessions, &ptx.tx).await?;

        // COLLECTING
        self.progress.advance(InitiatorStage::Collecting)?;
        let stx = collect_signatures(hub, ptx, &mut sessions, &[lender_key]).await?;

        // FINALISING
        self.progress.advance(InitiatorStage::Finalising)?;
        let committed = finalise(hub, stx, std::slice::from_ref(&hub.identity)).await?;

        self.progress.advance(InitiatorStage::Done)?;
        Ok(committed)
    }
}

/// Borrower or new-lender side of a transfer, one per incoming session.
pub struct TransferResponder {
    hub: Arc<ServiceHub>,
    progress: ProgressTracker<ResponderStage>,
}

impl TransferResponder {
    pub fn new(hub: Arc<ServiceHub>) -> Self {
        Self {
            hub,
            progress: ProgressTracker::new(ResponderStage::Syncing),
        }
    }

    pub fn progress(&self) -> &ProgressTracker<ResponderStage> {
        &self.progress
    }

    pub async fn run(&self, session: &mut Session) -> Result<SignedTransaction, TransferError> {
        let span = info_span!("transfer_responder", lender = %session.counterparty());
        async {
            let result = self.execute(session).await;
            if let Err(e) = &result {
                self.progress.fail();
                warn!(code = e.code(), error = %e, "Transfer responder failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, session: &mut Session) -> Result<SignedTransaction, TransferError> {
        let hub = &self.hub;

        // SYNCING
        let proposal = match session.receive().await? {
            SessionMessage::TransferProposal(proposal) => proposal,
            other => return Err(SessionError::unexpected("TransferProposal", &other).into()),
        };

        let me = &hub.identity;
        let other = if *me == proposal.borrower {
            &proposal.new_lender
        } else if *me == proposal.new_lender {
            &proposal.borrower
        } else {
            return Err(TransferError::UnknownParty(me.name().to_string()));
        };

        if other != me {
            identity_sync::sync_with(hub, other, &proposal.tx).await?;
        }
        identity_sync::receive(hub, session).await?;

        // SIGNING
        self.progress.advance(ResponderStage::Signing)?;
        let expected = proposal.tx.id();
        let stx = sign_or_decline(hub, session, |tx| {
            if tx.id() != expected {
                return Err(TransferError::Signature(format!(
                    "transaction {} differs from proposal {}",
                    tx.id().short(),
                    expected.short()
                )));
            }
            check_roles(hub, tx, &proposal)
        })
        .await?;

        // AWAITING_COMMIT
        self.progress.advance(ResponderStage::AwaitingCommit)?;
        let committed = hub.vault.await_commit(stx.id()).await;

        self.progress.advance(ResponderStage::Done)?;
        info!(tx_id = %committed.id().short(), "Transfer observed committed");
        Ok(committed)
    }
}

/// The output must owe `proposal.borrower`'s debt to `proposal.new_lender`.
fn check_roles(
    hub: &ServiceHub,
    tx: &WireTransaction,
    proposal: &TransferProposal,
) -> Result<(), TransferError> {
    let output = tx
        .outputs()
        .first()
        .ok_or_else(|| TransferError::Signature("transfer has no output".to_string()))?;

    let lender = hub.identities.well_known_party_from_anonymous(&output.lender);
    if lender.as_ref() != Some(&proposal.new_lender) {
        return Err(TransferError::Signature(format!(
            "output lender {} is not the proposed new lender {}",
            output.lender, proposal.new_lender
        )));
    }
    let borrower = hub.identities.well_known_party_from_anonymous(&output.borrower);
    if borrower.as_ref() != Some(&proposal.borrower) {
        return Err(TransferError::Signature(format!(
            "output borrower {} is not the proposed borrower {}",
            output.borrower, proposal.borrower
        )));
    }
    Ok(())
}
