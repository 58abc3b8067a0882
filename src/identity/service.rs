//! Identity resolution
//!
//! [`NetworkMap`] is the directory of well-known parties shared by every
//! node on a network. [`IdentityService`] is per node: it layers the
//! pseudonym certificates this node has been taught on top of the map.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::certificate::IdentityCertificate;
use super::error::IdentityError;
use super::keys::KeyStore;
use super::party::{AbstractParty, AnonymousParty, Party};
use crate::crypto::PublicKey;

/// Directory of well-known parties.
#[derive(Default)]
pub struct NetworkMap {
    by_key: DashMap<PublicKey, Party>,
    by_name: DashMap<String, Party>,
}

impl NetworkMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, party: Party) {
        self.by_name.insert(party.name().to_string(), party.clone());
        self.by_key.insert(party.owning_key(), party);
    }

    pub fn party_from_key(&self, key: &PublicKey) -> Option<Party> {
        self.by_key.get(key).map(|p| p.clone())
    }

    pub fn party_from_name(&self, name: &str) -> Option<Party> {
        self.by_name.get(name).map(|p| p.clone())
    }

    pub fn parties(&self) -> Vec<Party> {
        self.by_key.iter().map(|e| e.value().clone()).collect()
    }
}

/// Per-node identity resolver.
pub struct IdentityService {
    network_map: Arc<NetworkMap>,
    /// Pseudonym key -> certificate naming its owner
    certificates: DashMap<PublicKey, IdentityCertificate>,
}

impl IdentityService {
    pub fn new(network_map: Arc<NetworkMap>) -> Self {
        Self {
            network_map,
            certificates: DashMap::new(),
        }
    }

    /// Learn a pseudonym binding.
    ///
    /// The certificate must verify and its owner must be on the network
    /// map under the same key.
    pub fn register_certificate(&self, cert: IdentityCertificate) -> Result<(), IdentityError> {
        cert.verify()?;

        let known = self
            .network_map
            .party_from_name(cert.owner.name())
            .ok_or_else(|| IdentityError::UnknownOwner(cert.owner.name().to_string()))?;
        if known.owning_key() != cert.owner.owning_key() {
            return Err(IdentityError::OwnerMismatch {
                name: cert.owner.name().to_string(),
            });
        }

        debug!(
            owner = %cert.owner,
            pseudonym = %cert.anonymous,
            "Registered identity certificate"
        );
        self.certificates.insert(cert.anonymous.owning_key(), cert);
        Ok(())
    }

    /// Mint a fresh pseudonym for `owner`, whose keys live in `keys`.
    pub fn mint_pseudonym(
        &self,
        owner: &Party,
        keys: &KeyStore,
    ) -> Result<IdentityCertificate, IdentityError> {
        let anonymous = AnonymousParty::new(keys.fresh_key());
        let payload = IdentityCertificate::signing_payload(owner, &anonymous);
        let signature = keys
            .sign(&owner.owning_key(), &payload)
            .ok_or(IdentityError::MissingKey(owner.owning_key()))?;

        let cert = IdentityCertificate::new(owner.clone(), anonymous, signature);
        self.register_certificate(cert.clone())?;
        Ok(cert)
    }

    /// Well-known party behind any key: legal keys via the network map,
    /// pseudonyms via a registered certificate.
    pub fn party_from_key(&self, key: &PublicKey) -> Option<Party> {
        self.network_map
            .party_from_key(key)
            .or_else(|| self.certificates.get(key).map(|c| c.owner.clone()))
    }

    pub fn party_from_name(&self, name: &str) -> Option<Party> {
        self.network_map.party_from_name(name)
    }

    pub fn well_known_party_from_anonymous(&self, party: &AbstractParty) -> Option<Party> {
        match party {
            AbstractParty::WellKnown(p) => Some(p.clone()),
            AbstractParty::Anonymous(a) => self
                .certificates
                .get(&a.owning_key())
                .map(|c| c.owner.clone()),
        }
    }

    /// Like [`Self::well_known_party_from_anonymous`] but an error when unknown.
    pub fn resolve(&self, party: &AbstractParty) -> Result<Party, IdentityError> {
        self.well_known_party_from_anonymous(party)
            .ok_or(IdentityError::Unresolvable(party.owning_key()))
    }

    pub fn certificate_for(&self, key: &PublicKey) -> Option<IdentityCertificate> {
        self.certificates.get(key).map(|c| c.clone())
    }
}
