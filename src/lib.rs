//! Obligation Transfer
//!
//! Atomic three-party transfer of a bilateral obligation to a new lender.
//! The current lender drives the run; borrower and new lender sign; a
//! notary orders the result. Participants may appear on the ledger under
//! pseudonyms that only the parties to the transfer can resolve.
//!
//! # Modules
//!
//! - [`core_types`] - LinearId, TxId, RunId
//! - [`crypto`] - ed25519 keys and signature checks
//! - [`identity`] - parties, pseudonym certificates, identity resolution
//! - [`obligation`] - the obligation state, its rule engine and the persisted index
//! - [`ledger`] - transactions, the vault and the notary
//! - [`network`] - sessions and the in-process router
//! - [`protocol`] - issuance, transfer and their subprotocols
//! - [`node`] - service hub, responder dispatch, local test network
//! - [`config`] / [`logging`] - host configuration and tracing setup

// Core types - must be first!
pub mod core_types;
pub mod crypto;

pub mod identity;
pub mod ledger;
pub mod obligation;

pub mod network;
pub mod node;
pub mod protocol;

pub mod config;
pub mod logging;

// Convenient re-exports at crate root
pub use config::{AppConfig, ProtocolConfig};
pub use core_types::{Amount, LinearId, RunId, TxId};
pub use identity::{AbstractParty, AnonymousParty, IdentityService, Party};
pub use ledger::{CommitService, InMemoryNotary, NotaryError, SignedTransaction, StateRef, Vault};
pub use node::{LocalNetwork, Node, ServiceHub};
pub use obligation::{Contract, ContractError, Obligation, ObligationContract};
pub use protocol::{InitiatorStage, ResponderStage, TransferError, TransferInitiator};
