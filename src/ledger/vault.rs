//! Vault - per-node record repository
//!
//! Stores every transaction this node has seen committed, tracks the
//! unconsumed obligation versions relevant to this node, and maintains the
//! obligation index.
//!
//! # Soft locks
//!
//! A protocol run locks the `LinearId` it works on so a second run on the
//! same obligation fails fast instead of racing to the notary. The lock is
//! per linear id and released when the [`SoftLockGuard`] drops, including
//! when the run's future is cancelled. It is a liveness aid only: the
//! notary is what actually rejects double spends.

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};

use super::error::LedgerError;
use super::transaction::{SignedTransaction, StateAndRef, StateRef};
use crate::core_types::{LinearId, RunId, TxId};
use crate::identity::{AbstractParty, IdentityService, KeyStore};
use crate::obligation::{Obligation, ObligationIndex, PersistentObligation};

pub struct Vault {
    owner: String,
    keys: Arc<KeyStore>,
    identities: Arc<IdentityService>,
    transactions: DashMap<TxId, SignedTransaction>,
    unconsumed: DashMap<LinearId, StateAndRef>,
    soft_locks: Arc<DashMap<LinearId, RunId>>,
    index: ObligationIndex,
    committed: Notify,
}

impl Vault {
    pub fn new(owner: impl Into<String>, keys: Arc<KeyStore>, identities: Arc<IdentityService>) -> Self {
        Self {
            owner: owner.into(),
            keys,
            identities,
            transactions: DashMap::new(),
            unconsumed: DashMap::new(),
            soft_locks: Arc::new(DashMap::new()),
            index: ObligationIndex::new(),
            committed: Notify::new(),
        }
    }

    /// Current unconsumed version of an obligation.
    pub fn get_by_linear_id(&self, linear_id: &LinearId) -> Result<StateAndRef, LedgerError> {
        self.unconsumed
            .get(linear_id)
            .map(|s| s.clone())
            .ok_or(LedgerError::NotFound(*linear_id))
    }

    pub fn unconsumed_states(&self) -> Vec<StateAndRef> {
        self.unconsumed.iter().map(|e| e.value().clone()).collect()
    }

    /// Lock `linear_id` for `run_id`. Fails if any run already holds it.
    pub fn soft_lock(&self, linear_id: LinearId, run_id: RunId) -> Result<SoftLockGuard, LedgerError> {
        match self.soft_locks.entry(linear_id) {
            Entry::Occupied(held) => Err(LedgerError::Locked {
                linear_id,
                holder: *held.get(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(run_id);
                debug!(owner = %self.owner, linear_id = %linear_id, run_id = %run_id, "Soft lock acquired");
                Ok(SoftLockGuard::new(self.soft_locks.clone(), linear_id, run_id))
            }
        }
    }

    pub fn is_locked(&self, linear_id: &LinearId) -> bool {
        self.soft_locks.contains_key(linear_id)
    }

    /// Record a committed transaction and wake commit waiters.
    ///
    /// Idempotent: a transaction already recorded is ignored.
    pub fn record_transaction(&self, stx: SignedTransaction) {
        let tx_id = stx.id();
        if self.transactions.contains_key(&tx_id) {
            debug!(owner = %self.owner, tx_id = %tx_id.short(), "Transaction already recorded");
            return;
        }

        for input in stx.tx.inputs() {
            let linear_id = input.state.linear_id;
            let consumed = self
                .unconsumed
                .remove_if(&linear_id, |_, current| current.reference == input.reference);
            if consumed.is_some() {
                self.index.remove(&linear_id);
            }
        }

        for (index, output) in stx.tx.outputs().iter().enumerate() {
            if !self.is_relevant(output) {
                continue;
            }
            let reference = stx.tx.out_ref(index as u32);
            self.index.upsert(self.index_row(output, reference.tx_id));
            self.unconsumed.insert(
                output.linear_id,
                StateAndRef {
                    state: output.clone(),
                    reference,
                },
            );
        }

        self.transactions.insert(tx_id, stx);
        info!(owner = %self.owner, tx_id = %tx_id.short(), "Transaction recorded");
        self.committed.notify_waiters();
    }

    pub fn transaction(&self, tx_id: &TxId) -> Option<SignedTransaction> {
        self.transactions.get(tx_id).map(|t| t.clone())
    }

    /// Load any state version this node has a transaction for, consumed or not.
    pub fn load_state(&self, reference: &StateRef) -> Option<Obligation> {
        let stx = self.transactions.get(&reference.tx_id)?;
        stx.tx.outputs().get(reference.index as usize).cloned()
    }

    /// Suspend until `tx_id` is recorded locally, then return it.
    ///
    /// No timeout: the hosting node decides how long a run may wait.
    pub async fn await_commit(&self, tx_id: TxId) -> SignedTransaction {
        loop {
            // Registered before the lookup so a record in between is not missed
            let notified = self.committed.notified();
            if let Some(stx) = self.transaction(&tx_id) {
                return stx;
            }
            debug!(owner = %self.owner, tx_id = %tx_id.short(), "Waiting for ledger commit");
            notified.await;
        }
    }

    pub fn index(&self) -> &ObligationIndex {
        &self.index
    }

    fn is_relevant(&self, obligation: &Obligation) -> bool {
        obligation
            .participant_keys()
            .iter()
            .any(|k| self.keys.contains(k))
    }

    fn index_row(&self, obligation: &Obligation, tx_id: TxId) -> PersistentObligation {
        PersistentObligation {
            lender: self.display_name(&obligation.lender),
            borrower: self.display_name(&obligation.borrower),
            value: obligation.amount,
            linear_id: obligation.linear_id,
            tx_id,
            recorded_at: Utc::now(),
        }
    }

    fn display_name(&self, party: &AbstractParty) -> String {
        self.identities
            .well_known_party_from_anonymous(party)
            .map(|p| p.name().to_string())
            .unwrap_or_else(|| party.owning_key().to_hex())
    }
}

/// Releases a vault soft lock on drop.
#[derive(Debug)]
pub struct SoftLockGuard {
    locks: Arc<DashMap<LinearId, RunId>>,
    linear_id: LinearId,
    run_id: RunId,
}

impl SoftLockGuard {
    fn new(locks: Arc<DashMap<LinearId, RunId>>, linear_id: LinearId, run_id: RunId) -> Self {
        Self {
            locks,
            linear_id,
            run_id,
        }
    }

    pub fn linear_id(&self) -> LinearId {
        self.linear_id
    }
}

impl Drop for SoftLockGuard {
    fn drop(&mut self) {
        let run_id = self.run_id;
        if self
            .locks
            .remove_if(&self.linear_id, |_, holder| *holder == run_id)
            .is_some()
        {
            debug!(linear_id = %self.linear_id, run_id = %run_id, "Soft lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::identity::{NetworkMap, Party};
    use crate::ledger::{Command, TransactionBuilder, TransactionSignature};
    use crate::obligation::ObligationCommand;
    use std::time::Duration;

    struct Fixture {
        vault: Arc<Vault>,
        me: Party,
        other: Party,
        notary: Party,
    }

    fn fixture() -> Fixture {
        let legal = KeyPair::generate();
        let me = Party::new("O=Lender,L=London,C=GB", legal.public());
        let other = Party::new("O=Borrower,L=Paris,C=FR", KeyPair::generate().public());
        let map = Arc::new(NetworkMap::new());
        map.register(me.clone());
        map.register(other.clone());
        let vault = Vault::new(
            me.name(),
            Arc::new(KeyStore::new(legal)),
            Arc::new(IdentityService::new(map)),
        );
        Fixture {
            vault: Arc::new(vault),
            me,
            other,
            notary: Party::new("O=Notary", KeyPair::generate().public()),
        }
    }

    fn issue(f: &Fixture, lender: &Party, borrower: &Party) -> SignedTransaction {
        let obligation = Obligation::new(lender.clone().into(), borrower.clone().into(), 1000);
        let tx = TransactionBuilder::new(f.notary.clone())
            .add_output_state(obligation.clone())
            .add_command(Command::new(ObligationCommand::Issue, obligation.participant_keys()))
            .to_wire_transaction()
            .unwrap();
        SignedTransaction::new(tx, Vec::<TransactionSignature>::new())
    }

    #[test]
    fn test_record_relevant_state() {
        let f = fixture();
        let stx = issue(&f, &f.me, &f.other);
        let linear_id = stx.tx.outputs()[0].linear_id;

        f.vault.record_transaction(stx.clone());

        let found = f.vault.get_by_linear_id(&linear_id).unwrap();
        assert_eq!(found.reference, stx.tx.out_ref(0));
        assert_eq!(f.vault.load_state(&found.reference), Some(found.state));

        let row = f.vault.index().get(&linear_id).unwrap();
        assert_eq!(row.lender, "O=Lender,L=London,C=GB");
        assert_eq!(row.tx_id, stx.id());
    }

    #[test]
    fn test_irrelevant_state_not_tracked() {
        let f = fixture();
        let stranger = Party::new("O=Stranger", KeyPair::generate().public());
        let stx = issue(&f, &stranger, &f.other);
        let linear_id = stx.tx.outputs()[0].linear_id;

        f.vault.record_transaction(stx.clone());

        assert_eq!(
            f.vault.get_by_linear_id(&linear_id),
            Err(LedgerError::NotFound(linear_id))
        );
        // The transaction itself is still stored
        assert!(f.vault.transaction(&stx.id()).is_some());
        assert!(f.vault.index().is_empty());
    }

    #[test]
    fn test_transfer_away_consumes_state() {
        let f = fixture();
        let issued = issue(&f, &f.me, &f.other);
        f.vault.record_transaction(issued.clone());
        let input = f.vault.get_by_linear_id(&issued.tx.outputs()[0].linear_id).unwrap();

        let new_lender = Party::new("O=NewLender", KeyPair::generate().public());
        let output = input.state.with_new_lender(new_lender.into());
        let transfer = TransactionBuilder::new(f.notary.clone())
            .add_input_state(input.clone())
            .add_output_state(output)
            .add_command(Command::new(ObligationCommand::Transfer, vec![]))
            .to_wire_transaction()
            .unwrap();
        f.vault
            .record_transaction(SignedTransaction::new(transfer.clone(), vec![]));

        assert!(f.vault.get_by_linear_id(&input.state.linear_id).is_err());
        assert!(f.vault.index().get(&input.state.linear_id).is_none());
        // Old version still loadable from history
        assert_eq!(f.vault.load_state(&input.reference), Some(input.state));
        assert!(f.vault.load_state(&transfer.out_ref(0)).is_some());
    }

    #[test]
    fn test_soft_lock_exclusive_and_released_on_drop() {
        let f = fixture();
        let linear_id = LinearId::new();
        let first = RunId::new();
        let second = RunId::new();

        let guard = f.vault.soft_lock(linear_id, first).unwrap();
        assert!(f.vault.is_locked(&linear_id));
        assert_eq!(
            f.vault.soft_lock(linear_id, second).unwrap_err(),
            LedgerError::Locked {
                linear_id,
                holder: first
            }
        );

        // Other ids are independent
        assert!(f.vault.soft_lock(LinearId::new(), second).is_ok());

        drop(guard);
        assert!(!f.vault.is_locked(&linear_id));
        assert!(f.vault.soft_lock(linear_id, second).is_ok());
    }

    #[tokio::test]
    async fn test_await_commit_wakes_on_record() {
        let f = fixture();
        let stx = issue(&f, &f.me, &f.other);
        let tx_id = stx.id();

        let vault = f.vault.clone();
        let waiter = tokio::spawn(async move { vault.await_commit(tx_id).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        f.vault.record_transaction(stx.clone());
        let committed = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(committed, stx);
    }

    #[tokio::test]
    async fn test_await_commit_returns_immediately_when_recorded() {
        let f = fixture();
        let stx = issue(&f, &f.me, &f.other);
        f.vault.record_transaction(stx.clone());

        assert_eq!(f.vault.await_commit(stx.id()).await, stx);
    }
}
