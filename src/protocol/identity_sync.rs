//! Identity-Sync Subprotocol
//!
//! Teaches counterparties the pseudonyms a transaction refers to so they
//! can resolve every signer before signing. Four messages per session:
//!
//! ```text
//! sender                                receiver
//!   │ ── IdentityOffer(keys) ───────────▶ │
//!   │ ◀────────── IdentityRequest(unknown)│
//!   │ ── IdentityCertificates(certs) ───▶ │  verify + register
//!   │ ◀──────────────────── IdentityAck ──│
//! ```
//!
//! Only keys the sender holds a certificate for are offered, and only
//! certificates for offered keys are released.

use std::collections::BTreeSet;
use tracing::{debug, warn};

use super::error::TransferError;
use crate::crypto::PublicKey;
use crate::identity::Party;
use crate::ledger::WireTransaction;
use crate::network::{FlowKind, Session, SessionError, SessionMessage};
use crate::node::ServiceHub;

/// Anonymous keys in `tx` that `hub` can vouch for.
fn confidential_keys(hub: &ServiceHub, tx: &WireTransaction) -> Vec<PublicKey> {
    let referenced: BTreeSet<PublicKey> = tx
        .participants()
        .iter()
        .filter(|p| p.is_anonymous())
        .map(|p| p.owning_key())
        .chain(tx.command().signers.iter().copied())
        .collect();

    referenced
        .into_iter()
        .filter(|key| hub.identities.certificate_for(key).is_some())
        .collect()
}

/// Sender side across every session.
pub async fn send(
    hub: &ServiceHub,
    sessions: &mut [Session],
    tx: &WireTransaction,
) -> Result<(), TransferError> {
    let offered = confidential_keys(hub, tx);

    for session in sessions.iter() {
        session
            .send(SessionMessage::IdentityOffer(offered.clone()))
            .await?;
    }

    for session in sessions.iter_mut() {
        let requested = match session.receive().await? {
            SessionMessage::IdentityRequest(keys) => keys,
            other => return Err(SessionError::unexpected("IdentityRequest", &other).into()),
        };

        let certificates: Vec<_> = requested
            .iter()
            .filter(|key| offered.contains(key))
            .filter_map(|key| hub.identities.certificate_for(key))
            .collect();
        debug!(
            counterparty = %session.counterparty(),
            requested = requested.len(),
            sent = certificates.len(),
            "Disclosing identity certificates"
        );
        session
            .send(SessionMessage::IdentityCertificates(certificates))
            .await?;

        match session.receive().await? {
            SessionMessage::IdentityAck => {}
            other => return Err(SessionError::unexpected("IdentityAck", &other).into()),
        }
    }

    Ok(())
}

/// Receiver side: request unknown keys and register what comes back.
pub async fn receive(hub: &ServiceHub, session: &mut Session) -> Result<(), TransferError> {
    let offered = match session.receive().await? {
        SessionMessage::IdentityOffer(keys) => keys,
        other => return Err(SessionError::unexpected("IdentityOffer", &other).into()),
    };

    let unknown: BTreeSet<PublicKey> = offered
        .into_iter()
        .filter(|key| hub.identities.party_from_key(key).is_none())
        .collect();
    session
        .send(SessionMessage::IdentityRequest(unknown.iter().copied().collect()))
        .await?;

    let certificates = match session.receive().await? {
        SessionMessage::IdentityCertificates(certs) => certs,
        other => return Err(SessionError::unexpected("IdentityCertificates", &other).into()),
    };

    let mut learned = 0;
    for cert in certificates {
        let key = cert.anonymous.owning_key();
        if !unknown.contains(&key) {
            return Err(TransferError::IdentityResolution(format!(
                "{} sent an unrequested certificate for {}",
                session.counterparty(),
                key
            )));
        }
        hub.identities.register_certificate(cert)?;
        learned += 1;
    }
    if learned < unknown.len() {
        warn!(
            counterparty = %session.counterparty(),
            requested = unknown.len(),
            learned,
            "Identity sync left keys unresolved"
        );
    }

    session.send(SessionMessage::IdentityAck).await?;
    debug!(counterparty = %session.counterparty(), learned, "Identity sync received");
    Ok(())
}

/// Open a dedicated session to `other` and run the sender side on it.
///
/// Lets borrower and new lender teach each other their pseudonyms
/// directly. The receiver is started by `other`'s dispatcher.
pub async fn sync_with(
    hub: &ServiceHub,
    other: &Party,
    tx: &WireTransaction,
) -> Result<(), TransferError> {
    let session = hub.open_session(other, FlowKind::IdentitySync).await?;
    send(hub, &mut [session], tx).await
}
