//! Obligation protocols
//!
//! - [`transfer`] - transfer initiator and responder state machines
//! - [`issue`] - obligation issuance, needed to create something to transfer
//! - [`identity_sync`] / [`swap_identities`] - pseudonym distribution
//! - [`collect_signatures`] - signature gathering and the sign-or-decline side
//! - [`finality`] - notarisation and broadcast of committed transactions
//! - [`state`] - observable stage trackers
//!
//! Every network exchange goes through a [`crate::network::Session`]; a run
//! never shares mutable state with another run.

pub mod collect_signatures;
pub mod error;
pub mod finality;
pub mod identity_sync;
pub mod issue;
pub mod state;
pub mod swap_identities;
pub mod transfer;


pub use collect_signatures::{collect_signatures, sign_or_decline};
pub use error::TransferError;
pub use finality::{finalise, receive_finalised};
pub use issue::issue_obligation;
pub use state::{InitiatorStage, ProgressTracker, ResponderStage, Stage};
pub use swap_identities::{SwappedIdentities, swap_identities};
pub use transfer::{TransferInitiator, TransferResponder};
