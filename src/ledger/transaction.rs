//! Transactions
//!
//! A [`WireTransaction`] is the unsigned proposal: consumed input versions,
//! produced output versions, one command naming the required signers, and
//! the notary that will order it. Its [`TxId`] is the SHA-256 of the
//! bincode encoding of those components and is recomputed on every
//! deserialisation, so a peer cannot attach a forged id.
//!
//! Inputs carry a copy of the consumed state so any party can run the rule
//! engine without fetching the producing transaction.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use super::error::LedgerError;
use crate::core_types::TxId;
use crate::crypto::{PublicKey, verify_ed25519};
use crate::identity::{AbstractParty, Party};
use crate::obligation::{Obligation, ObligationCommand};

/// Pointer to one output of a committed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateRef {
    pub tx_id: TxId,
    pub index: u32,
}

/// A state version together with the reference that consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAndRef {
    pub state: Obligation,
    pub reference: StateRef,
}

/// Authorisation command: what the transaction does and who must sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: ObligationCommand,
    /// Sorted, deduplicated
    pub signers: Vec<PublicKey>,
}

impl Command {
    pub fn new(kind: ObligationCommand, signers: impl IntoIterator<Item = PublicKey>) -> Self {
        let signers: BTreeSet<PublicKey> = signers.into_iter().collect();
        Self {
            kind,
            signers: signers.into_iter().collect(),
        }
    }
}

/// The hashed content of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionComponents {
    pub inputs: Vec<StateAndRef>,
    pub outputs: Vec<Obligation>,
    pub command: Command,
    pub notary: Party,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TransactionComponents", into = "TransactionComponents")]
pub struct WireTransaction {
    components: TransactionComponents,
    id: TxId,
}

impl TryFrom<TransactionComponents> for WireTransaction {
    type Error = LedgerError;

    fn try_from(components: TransactionComponents) -> Result<Self, Self::Error> {
        let encoded = bincode::serialize(&components)?;
        let digest = Sha256::digest(&encoded);
        let mut id = [0u8; 32];
        id.copy_from_slice(&digest);
        Ok(Self {
            components,
            id: TxId::from_bytes(id),
        })
    }
}

impl From<WireTransaction> for TransactionComponents {
    fn from(tx: WireTransaction) -> Self {
        tx.components
    }
}

impl WireTransaction {
    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn inputs(&self) -> &[StateAndRef] {
        &self.components.inputs
    }

    pub fn outputs(&self) -> &[Obligation] {
        &self.components.outputs
    }

    pub fn command(&self) -> &Command {
        &self.components.command
    }

    pub fn notary(&self) -> &Party {
        &self.components.notary
    }

    /// Reference to output `index` once this transaction commits.
    pub fn out_ref(&self, index: u32) -> StateRef {
        StateRef {
            tx_id: self.id,
            index,
        }
    }

    /// Participants of every consumed and produced state, in order, without duplicates.
    pub fn participants(&self) -> Vec<AbstractParty> {
        let mut seen = BTreeSet::new();
        self.inputs()
            .iter()
            .map(|i| &i.state)
            .chain(self.outputs())
            .flat_map(|o| o.participants())
            .filter(|p| seen.insert(p.owning_key()))
            .cloned()
            .collect()
    }
}

/// Signature over a transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub by: PublicKey,
    bytes: Vec<u8>,
}

impl TransactionSignature {
    pub fn new(by: PublicKey, bytes: Vec<u8>) -> Self {
        Self { by, bytes }
    }

    pub fn verify(&self, tx_id: &TxId) -> bool {
        verify_ed25519(&self.by, tx_id.as_bytes(), &self.bytes)
    }
}

/// A wire transaction plus the signatures collected so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: WireTransaction,
    sigs: Vec<TransactionSignature>,
}

impl SignedTransaction {
    pub fn new(tx: WireTransaction, sigs: Vec<TransactionSignature>) -> Self {
        Self { tx, sigs }
    }

    pub fn id(&self) -> TxId {
        self.tx.id()
    }

    pub fn sigs(&self) -> &[TransactionSignature] {
        &self.sigs
    }

    pub fn required_signers(&self) -> BTreeSet<PublicKey> {
        self.tx.command().signers.iter().copied().collect()
    }

    pub fn signed_keys(&self) -> BTreeSet<PublicKey> {
        self.sigs.iter().map(|s| s.by).collect()
    }

    pub fn missing_signers(&self) -> BTreeSet<PublicKey> {
        let signed = self.signed_keys();
        self.required_signers()
            .into_iter()
            .filter(|k| !signed.contains(k))
            .collect()
    }

    /// Attach signatures, ignoring any key that has already signed.
    pub fn with_signatures(mut self, sigs: impl IntoIterator<Item = TransactionSignature>) -> Self {
        for sig in sigs {
            if !self.sigs.iter().any(|s| s.by == sig.by) {
                self.sigs.push(sig);
            }
        }
        self
    }

    /// Every attached signature is valid for this transaction.
    pub fn verify_signatures(&self) -> Result<(), LedgerError> {
        let id = self.id();
        match self.sigs.iter().find(|s| !s.verify(&id)) {
            Some(bad) => Err(LedgerError::InvalidSignature(bad.by)),
            None => Ok(()),
        }
    }

    /// Attached signatures are valid and only keys in `allowed_missing` have not signed.
    pub fn verify_signatures_except(
        &self,
        allowed_missing: &BTreeSet<PublicKey>,
    ) -> Result<(), LedgerError> {
        self.verify_signatures()?;
        let missing: Vec<PublicKey> = self
            .missing_signers()
            .into_iter()
            .filter(|k| !allowed_missing.contains(k))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::MissingSignatures(missing))
        }
    }

    /// Fully authorised: every required signer has signed.
    pub fn verify_required_signatures(&self) -> Result<(), LedgerError> {
        self.verify_signatures_except(&BTreeSet::new())
    }
}

/// Assembles a [`WireTransaction`].
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    notary: Party,
    inputs: Vec<StateAndRef>,
    outputs: Vec<Obligation>,
    command: Option<Command>,
}

impl TransactionBuilder {
    pub fn new(notary: Party) -> Self {
        Self {
            notary,
            inputs: Vec::new(),
            outputs: Vec::new(),
            command: None,
        }
    }

    pub fn add_input_state(mut self, input: StateAndRef) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn add_output_state(mut self, output: Obligation) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn add_command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }

    pub fn to_wire_transaction(&self) -> Result<WireTransaction, LedgerError> {
        let command = self.command.clone().ok_or(LedgerError::MissingCommand)?;
        WireTransaction::try_from(TransactionComponents {
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            command,
            notary: self.notary.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    struct Keys {
        lender: KeyPair,
        borrower: KeyPair,
    }

    fn issue_tx() -> (WireTransaction, Keys) {
        let keys = Keys {
            lender: KeyPair::generate(),
            borrower: KeyPair::generate(),
        };
        let obligation = Obligation::new(
            Party::new("O=Lender", keys.lender.public()).into(),
            Party::new("O=Borrower", keys.borrower.public()).into(),
            1000,
        );
        let tx = TransactionBuilder::new(Party::new("O=Notary", KeyPair::generate().public()))
            .add_output_state(obligation.clone())
            .add_command(Command::new(
                ObligationCommand::Issue,
                obligation.participant_keys(),
            ))
            .to_wire_transaction()
            .unwrap();
        (tx, keys)
    }

    fn sign(key: &KeyPair, tx: &WireTransaction) -> TransactionSignature {
        TransactionSignature::new(key.public(), key.sign(tx.id().as_bytes()))
    }

    #[test]
    fn test_id_is_stable_and_content_addressed() {
        let (tx, _) = issue_tx();
        let encoded = serde_json::to_string(&tx).unwrap();
        let decoded: WireTransaction = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.id(), tx.id());

        let (other, _) = issue_tx();
        assert_ne!(other.id(), tx.id());
    }

    #[test]
    fn test_builder_requires_command() {
        let builder = TransactionBuilder::new(Party::new("O=Notary", KeyPair::generate().public()));
        assert_eq!(
            builder.to_wire_transaction().unwrap_err(),
            LedgerError::MissingCommand
        );
    }

    #[test]
    fn test_command_signers_deduplicated() {
        let key = KeyPair::generate().public();
        let command = Command::new(ObligationCommand::Transfer, [key, key]);
        assert_eq!(command.signers, vec![key]);
    }

    #[test]
    fn test_missing_and_present_signatures() {
        let (tx, keys) = issue_tx();
        let partial = SignedTransaction::new(tx.clone(), vec![sign(&keys.borrower, &tx)]);

        assert_eq!(
            partial.missing_signers(),
            BTreeSet::from([keys.lender.public()])
        );
        assert!(partial.verify_signatures().is_ok());
        assert!(
            partial
                .verify_signatures_except(&BTreeSet::from([keys.lender.public()]))
                .is_ok()
        );
        assert_eq!(
            partial.verify_required_signatures(),
            Err(LedgerError::MissingSignatures(vec![keys.lender.public()]))
        );

        let full = partial.with_signatures([sign(&keys.lender, &tx)]);
        assert!(full.verify_required_signatures().is_ok());
    }

    #[test]
    fn test_invalid_signature_detected() {
        let (tx, keys) = issue_tx();
        let (other_tx, _) = issue_tx();
        let stx = SignedTransaction::new(tx, vec![sign(&keys.lender, &other_tx)]);

        assert_eq!(
            stx.verify_signatures(),
            Err(LedgerError::InvalidSignature(keys.lender.public()))
        );
    }

    #[test]
    fn test_with_signatures_ignores_duplicates() {
        let (tx, keys) = issue_tx();
        let stx = SignedTransaction::new(tx.clone(), vec![])
            .with_signatures([sign(&keys.lender, &tx), sign(&keys.lender, &tx)]);
        assert_eq!(stx.sigs().len(), 1);
    }

    #[test]
    fn test_participants_deduplicated() {
        let (tx, keys) = issue_tx();
        let participants = tx.participants();
        assert_eq!(participants.len(), 2);
        assert_eq!(participants[0].owning_key(), keys.lender.public());
        assert_eq!(tx.out_ref(0).tx_id, tx.id());
    }
}
