//! Node-local private key storage.

use dashmap::DashMap;

use crate::crypto::{KeyPair, PublicKey};

/// Holds the node's legal key and every pseudonym key it has minted.
pub struct KeyStore {
    legal_key: PublicKey,
    keys: DashMap<PublicKey, KeyPair>,
}

impl KeyStore {
    pub fn new(legal: KeyPair) -> Self {
        let legal_key = legal.public();
        let keys = DashMap::new();
        keys.insert(legal_key, legal);
        Self { legal_key, keys }
    }

    pub fn legal_key(&self) -> PublicKey {
        self.legal_key
    }

    /// Generate and retain a fresh key, returning its public half.
    pub fn fresh_key(&self) -> PublicKey {
        let pair = KeyPair::generate();
        let public = pair.public();
        self.keys.insert(public, pair);
        public
    }

    pub fn contains(&self, key: &PublicKey) -> bool {
        self.keys.contains_key(key)
    }

    /// Sign with the private key behind `key`, if this node holds it.
    pub fn sign(&self, key: &PublicKey, message: &[u8]) -> Option<Vec<u8>> {
        self.keys.get(key).map(|pair| pair.sign(message))
    }

    /// Subset of `keys` this node can sign for.
    pub fn filter_mine<'a>(&self, keys: impl IntoIterator<Item = &'a PublicKey>) -> Vec<PublicKey> {
        keys.into_iter()
            .filter(|k| self.contains(k))
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
