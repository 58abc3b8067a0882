//! Party identities
//!
//! A party is referenced on the ledger either by its well-known identity
//! (legal name + key) or by a pseudonym: a bare key that only nodes holding
//! the matching [`IdentityCertificate`] can map back to the owner.
//!
//! # Resolution
//!
//! ```text
//! AbstractParty::WellKnown(p)  ──────────────────────────────▶ p
//! AbstractParty::Anonymous(k)  ── IdentityCertificate(k) ───▶ owner
//!                              ── (no certificate) ─────────▶ unresolvable
//! ```
//!
//! Certificates reach a node only through the swap-identities and
//! identity-sync subprotocols, so a party outside a transfer cannot
//! de-anonymise its participants.

pub mod certificate;
pub mod error;
pub mod keys;
pub mod party;
pub mod service;

pub use certificate::IdentityCertificate;
pub use error::IdentityError;
pub use keys::KeyStore;
pub use party::{AbstractParty, AnonymousParty, Party};
pub use service::{IdentityService, NetworkMap};
