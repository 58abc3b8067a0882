//! Signature-Collection Subprotocol
//!
//! The collecting side groups the still-missing signer keys by the party
//! that owns them and asks each session for exactly those keys. A decline
//! comes back as a typed [`SignatureResponse::Declined`] and ends the
//! collection with [`TransferError::Signature`].

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use super::error::TransferError;
use crate::crypto::PublicKey;
use crate::identity::Party;
use crate::ledger::{SignedTransaction, TransactionSignature, WireTransaction};
use crate::network::{Session, SessionError, SessionMessage, SignatureResponse};
use crate::node::ServiceHub;

/// Collect the remaining signatures on `ptx` from `sessions`.
///
/// `my_optional_keys` are keys this node has already signed with that may
/// not be its legal key (e.g. a pseudonym). They are never requested.
pub async fn collect_signatures(
    hub: &ServiceHub,
    ptx: SignedTransaction,
    sessions: &mut [Session],
    my_optional_keys: &[PublicKey],
) -> Result<SignedTransaction, TransferError> {
    let mut mine: BTreeSet<PublicKey> = my_optional_keys.iter().copied().collect();
    mine.insert(hub.keys.legal_key());

    let signed = ptx.signed_keys();
    if !mine.iter().any(|k| signed.contains(k)) {
        return Err(TransferError::Signature(
            "transaction is not signed by the collecting party".to_string(),
        ));
    }
    ptx.verify_signatures()?;

    let wanted = group_by_owner(hub, ptx.missing_signers(), &mine)?;
    for owner in wanted.keys() {
        if !sessions.iter().any(|s| s.counterparty() == owner) {
            return Err(TransferError::Signature(format!(
                "no session with required signer {}",
                owner
            )));
        }
    }

    let tx_id = ptx.id();
    let mut collected: Vec<TransactionSignature> = Vec::new();

    for session in sessions.iter_mut() {
        let keys = wanted.get(session.counterparty()).cloned().unwrap_or_default();
        if keys.is_empty() {
            return Err(TransferError::Signature(format!(
                "{} is not a required signer",
                session.counterparty()
            )));
        }

        debug!(counterparty = %session.counterparty(), keys = keys.len(), "Requesting signatures");
        session
            .send(SessionMessage::SignatureRequest {
                stx: ptx.clone(),
                keys: keys.clone(),
            })
            .await?;

        let sigs = match session.receive().await? {
            SessionMessage::SignatureResponse(SignatureResponse::Signed(sigs)) => sigs,
            SessionMessage::SignatureResponse(SignatureResponse::Declined(reason)) => {
                warn!(counterparty = %session.counterparty(), reason = %reason, "Signature declined");
                return Err(TransferError::Signature(format!(
                    "{} declined: {}",
                    session.counterparty(),
                    reason
                )));
            }
            other => return Err(SessionError::unexpected("SignatureResponse", &other).into()),
        };

        for sig in &sigs {
            if !keys.contains(&sig.by) || !sig.verify(&tx_id) {
                return Err(TransferError::Signature(format!(
                    "{} returned an invalid signature for {}",
                    session.counterparty(),
                    sig.by
                )));
            }
        }
        collected.extend(sigs);
    }

    let stx = ptx.with_signatures(collected);
    stx.verify_required_signatures()?;
    info!(tx_id = %tx_id.short(), signatures = stx.sigs().len(), "Signatures collected");
    Ok(stx)
}

fn group_by_owner(
    hub: &ServiceHub,
    missing: BTreeSet<PublicKey>,
    mine: &BTreeSet<PublicKey>,
) -> Result<BTreeMap<Party, Vec<PublicKey>>, TransferError> {
    let mut wanted: BTreeMap<Party, Vec<PublicKey>> = BTreeMap::new();
    for key in missing {
        if mine.contains(&key) || hub.keys.contains(&key) {
            return Err(TransferError::Signature(format!(
                "own key {} has not signed",
                key
            )));
        }
        let owner = hub.identities.party_from_key(&key).ok_or_else(|| {
            TransferError::IdentityResolution(format!("cannot resolve required signer {}", key))
        })?;
        wanted.entry(owner).or_default().push(key);
    }
    Ok(wanted)
}

/// Counterparty side: check the request and sign, or decline.
///
/// `check` runs after the generic checks and lets the calling flow add its
/// own acceptance rule. A decline is sent to the collector and also
/// returned as this run's error.
pub async fn sign_or_decline<F>(
    hub: &ServiceHub,
    session: &mut Session,
    check: F,
) -> Result<SignedTransaction, TransferError>
where
    F: FnOnce(&WireTransaction) -> Result<(), TransferError>,
{
    let (stx, keys) = match session.receive().await? {
        SessionMessage::SignatureRequest { stx, keys } => (stx, keys),
        other => return Err(SessionError::unexpected("SignatureRequest", &other).into()),
    };

    let verdict = verify_request(hub, session.counterparty(), &stx, &keys).and_then(|_| check(&stx.tx));
    if let Err(e) = verdict {
        warn!(
            counterparty = %session.counterparty(),
            tx_id = %stx.id().short(),
            code = e.code(),
            error = %e,
            "Declining to sign"
        );
        session
            .send(SessionMessage::SignatureResponse(SignatureResponse::Declined(
                e.to_string(),
            )))
            .await?;
        return Err(e);
    }

    let tx_id = stx.id();
    let mut sigs = Vec::with_capacity(keys.len());
    for key in &keys {
        let bytes = hub.keys.sign(key, tx_id.as_bytes()).ok_or_else(|| {
            TransferError::Signature(format!("no private key for {}", key))
        })?;
        sigs.push(TransactionSignature::new(*key, bytes));
    }

    session
        .send(SessionMessage::SignatureResponse(SignatureResponse::Signed(
            sigs.clone(),
        )))
        .await?;
    info!(counterparty = %session.counterparty(), tx_id = %tx_id.short(), keys = keys.len(), "Signed transaction");
    Ok(stx.with_signatures(sigs))
}

fn verify_request(
    hub: &ServiceHub,
    collector: &Party,
    stx: &SignedTransaction,
    keys: &[PublicKey],
) -> Result<(), TransferError> {
    stx.verify_signatures()?;

    let required = stx.required_signers();
    for key in keys {
        if !required.contains(key) {
            return Err(TransferError::Signature(format!(
                "{} is not a required signer",
                key
            )));
        }
        if !hub.keys.contains(key) {
            return Err(TransferError::Signature(format!(
                "asked to sign with foreign key {}",
                key
            )));
        }
    }

    let collector_signed = stx
        .signed_keys()
        .iter()
        .any(|k| hub.identities.party_from_key(k).as_ref() == Some(collector));
    if !collector_signed {
        return Err(TransferError::Signature(format!(
            "transaction is not signed by {}",
            collector
        )));
    }

    hub.contract.verify(&stx.tx)?;

    // Every signer must be resolvable here before our signature joins theirs
    for key in &required {
        if hub.identities.party_from_key(key).is_none() {
            return Err(TransferError::IdentityResolution(format!(
                "cannot resolve signer {}",
                key
            )));
        }
    }
    Ok(())
}
