//! Commit Service (notary)
//!
//! Final arbiter of conflicting consumption. A transaction commits only if
//! it is fully signed and none of its input versions has been consumed by
//! a different committed transaction. The notary's signature over the
//! transaction id is the proof of commitment.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::transaction::{SignedTransaction, StateRef, TransactionSignature};
use crate::core_types::TxId;
use crate::crypto::KeyPair;
use crate::identity::Party;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotaryError {
    #[error("Input states already consumed: {consumed:?}")]
    Conflict { consumed: Vec<(StateRef, TxId)> },

    #[error("Transaction is not fully signed: {0}")]
    InvalidSignatures(String),

    #[error("Transaction names notary {requested}, this is {actual}")]
    WrongNotary { requested: String, actual: String },
}

impl NotaryError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, NotaryError::Conflict { .. })
    }
}

/// Commit service seam.
///
/// # Idempotency
/// Committing the same transaction twice must succeed both times with the
/// same outcome, so a run resumed inside FINALISING can simply resubmit.
#[async_trait]
pub trait CommitService: Send + Sync {
    fn identity(&self) -> &Party;

    /// Order `stx`, returning the notary signature on success.
    async fn commit(&self, stx: &SignedTransaction) -> Result<TransactionSignature, NotaryError>;
}

/// Single-node notary holding its consumed-state map in memory.
pub struct InMemoryNotary {
    identity: Party,
    key: KeyPair,
    /// Input version -> transaction that consumed it
    consumed: Mutex<HashMap<StateRef, TxId>>,
}

impl InMemoryNotary {
    pub fn new(name: impl Into<String>, key: KeyPair) -> Self {
        Self {
            identity: Party::new(name, key.public()),
            key,
            consumed: Mutex::new(HashMap::new()),
        }
    }

    pub async fn consumed_by(&self, reference: &StateRef) -> Option<TxId> {
        self.consumed.lock().await.get(reference).copied()
    }
}

#[async_trait]
impl CommitService for InMemoryNotary {
    fn identity(&self) -> &Party {
        &self.identity
    }

    async fn commit(&self, stx: &SignedTransaction) -> Result<TransactionSignature, NotaryError> {
        let tx_id = stx.id();

        if stx.tx.notary() != &self.identity {
            return Err(NotaryError::WrongNotary {
                requested: stx.tx.notary().to_string(),
                actual: self.identity.to_string(),
            });
        }

        stx.verify_required_signatures()
            .map_err(|e| NotaryError::InvalidSignatures(e.to_string()))?;

        let mut consumed = self.consumed.lock().await;

        let conflicts: Vec<(StateRef, TxId)> = stx
            .tx
            .inputs()
            .iter()
            .filter_map(|input| match consumed.get(&input.reference) {
                Some(by) if *by != tx_id => Some((input.reference, *by)),
                _ => None,
            })
            .collect();

        if !conflicts.is_empty() {
            warn!(
                tx_id = %tx_id.short(),
                conflicts = conflicts.len(),
                "Double spend rejected"
            );
            return Err(NotaryError::Conflict {
                consumed: conflicts,
            });
        }

        for input in stx.tx.inputs() {
            consumed.insert(input.reference, tx_id);
        }
        drop(consumed);

        info!(tx_id = %tx_id.short(), inputs = stx.tx.inputs().len(), "Transaction notarised");
        Ok(TransactionSignature::new(
            self.identity.owning_key(),
            self.key.sign(tx_id.as_bytes()),
        ))
    }
}
