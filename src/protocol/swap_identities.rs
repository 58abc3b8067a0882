//! Swap-Identities Subprotocol
//!
//! Both sides mint a fresh pseudonym, certify it with their well-known key,
//! and trade certificates. Each side ends up able to resolve the other's
//! new key, and nobody else can.

use tracing::info;

use super::error::TransferError;
use crate::identity::{AnonymousParty, Party};
use crate::network::{FlowKind, Session, SessionError, SessionMessage};
use crate::node::ServiceHub;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwappedIdentities {
    pub ours: AnonymousParty,
    pub theirs: AnonymousParty,
}

/// Initiating side: open a session to `counterparty` and exchange.
pub async fn swap_identities(
    hub: &ServiceHub,
    counterparty: &Party,
) -> Result<SwappedIdentities, TransferError> {
    let mut session = hub.open_session(counterparty, FlowKind::SwapIdentities).await?;
    exchange(hub, &mut session).await
}

/// Symmetric exchange run by both ends of a swap session.
pub async fn exchange(
    hub: &ServiceHub,
    session: &mut Session,
) -> Result<SwappedIdentities, TransferError> {
    let ours = hub.identities.mint_pseudonym(&hub.identity, &hub.keys)?;
    session
        .send(SessionMessage::PseudonymCertificate(ours.clone()))
        .await?;

    let theirs = match session.receive().await? {
        SessionMessage::PseudonymCertificate(cert) => cert,
        other => return Err(SessionError::unexpected("PseudonymCertificate", &other).into()),
    };

    if &theirs.owner != session.counterparty() {
        return Err(TransferError::IdentityResolution(format!(
            "pseudonym certificate names {} but the session is with {}",
            theirs.owner,
            session.counterparty()
        )));
    }
    hub.identities.register_certificate(theirs.clone())?;

    info!(
        counterparty = %session.counterparty(),
        ours = %ours.anonymous,
        theirs = %theirs.anonymous,
        "Swapped identities"
    );
    Ok(SwappedIdentities {
        ours: ours.anonymous,
        theirs: theirs.anonymous,
    })
}
