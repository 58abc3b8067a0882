//! Session wire messages

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::PublicKey;
use crate::identity::{IdentityCertificate, Party};
use crate::ledger::{SignedTransaction, TransactionSignature, WireTransaction};

/// Which responder a freshly opened session should be handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowKind {
    IssueObligation,
    TransferObligation,
    IdentitySync,
    SwapIdentities,
    ReceiveFinality,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::IssueObligation => "ISSUE_OBLIGATION",
            FlowKind::TransferObligation => "TRANSFER_OBLIGATION",
            FlowKind::IdentitySync => "IDENTITY_SYNC",
            FlowKind::SwapIdentities => "SWAP_IDENTITIES",
            FlowKind::ReceiveFinality => "RECEIVE_FINALITY",
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sent by the current lender to each counterparty before identity sync.
///
/// The transaction names borrower and lenders by possibly anonymous keys,
/// so the well-known identities travel alongside it. That lets borrower
/// and new lender find each other without routing through the initiator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProposal {
    pub borrower: Party,
    pub new_lender: Party,
    pub tx: WireTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureResponse {
    Signed(Vec<TransactionSignature>),
    Declined(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMessage {
    TransferProposal(TransferProposal),

    // identity sync: offer -> request -> certificates -> ack
    IdentityOffer(Vec<PublicKey>),
    IdentityRequest(Vec<PublicKey>),
    IdentityCertificates(Vec<IdentityCertificate>),
    IdentityAck,

    PseudonymCertificate(IdentityCertificate),

    /// Partially signed transaction plus the keys the receiver is asked to sign with
    SignatureRequest {
        stx: SignedTransaction,
        keys: Vec<PublicKey>,
    },
    SignatureResponse(SignatureResponse),

    Finalised(SignedTransaction),
    FinalisedAck,
}

impl SessionMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionMessage::TransferProposal(_) => "TransferProposal",
            SessionMessage::IdentityOffer(_) => "IdentityOffer",
            SessionMessage::IdentityRequest(_) => "IdentityRequest",
            SessionMessage::IdentityCertificates(_) => "IdentityCertificates",
            SessionMessage::IdentityAck => "IdentityAck",
            SessionMessage::PseudonymCertificate(_) => "PseudonymCertificate",
            SessionMessage::SignatureRequest { .. } => "SignatureRequest",
            SessionMessage::SignatureResponse(_) => "SignatureResponse",
            SessionMessage::Finalised(_) => "Finalised",
            SessionMessage::FinalisedAck => "FinalisedAck",
        }
    }
}
