use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::PublicKey;

/// Well-known identity: a legal name bound to a long-term key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Party {
    name: String,
    owning_key: PublicKey,
}

impl Party {
    pub fn new(name: impl Into<String>, owning_key: PublicKey) -> Self {
        Self {
            name: name.into(),
            owning_key,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owning_key(&self) -> PublicKey {
        self.owning_key
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Pseudonymous identity: a key with no name attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnonymousParty {
    owning_key: PublicKey,
}

impl AnonymousParty {
    pub fn new(owning_key: PublicKey) -> Self {
        Self { owning_key }
    }

    pub fn owning_key(&self) -> PublicKey {
        self.owning_key
    }
}

impl fmt::Display for AnonymousParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Anonymous({})", self.owning_key.short())
    }
}

/// Party reference as it appears inside a ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbstractParty {
    WellKnown(Party),
    Anonymous(AnonymousParty),
}

impl AbstractParty {
    pub fn owning_key(&self) -> PublicKey {
        match self {
            AbstractParty::WellKnown(p) => p.owning_key(),
            AbstractParty::Anonymous(a) => a.owning_key(),
        }
    }

    /// Human-readable name, `None` for pseudonyms.
    pub fn name_or_none(&self) -> Option<&str> {
        match self {
            AbstractParty::WellKnown(p) => Some(p.name()),
            AbstractParty::Anonymous(_) => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, AbstractParty::Anonymous(_))
    }
}

impl From<Party> for AbstractParty {
    fn from(p: Party) -> Self {
        AbstractParty::WellKnown(p)
    }
}

impl From<AnonymousParty> for AbstractParty {
    fn from(a: AnonymousParty) -> Self {
        AbstractParty::Anonymous(a)
    }
}

impl fmt::Display for AbstractParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractParty::WellKnown(p) => write!(f, "{}", p),
            AbstractParty::Anonymous(a) => write!(f, "{}", a),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_abstract_party_name() {
        let key = KeyPair::from_seed([1u8; 32]).public();
        let well_known: AbstractParty = Party::new("O=Lender,L=London,C=GB", key).into();
        let anonymous: AbstractParty = AnonymousParty::new(key).into();

        assert_eq!(well_known.name_or_none(), Some("O=Lender,L=London,C=GB"));
        assert_eq!(anonymous.name_or_none(), None);
        assert!(anonymous.is_anonymous());
        assert_eq!(well_known.owning_key(), anonymous.owning_key());
        assert_ne!(well_known, anonymous);
    }

    #[test]
    fn test_display_hides_pseudonym_owner() {
        let key = KeyPair::from_seed([2u8; 32]).public();
        let anonymous = AnonymousParty::new(key);
        assert!(anonymous.to_string().starts_with("Anonymous("));
    }
}
