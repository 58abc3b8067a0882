//! Core types used throughout the system
//!
//! Identifiers that cross module boundaries: the stable id of a logical
//! obligation, the content id of a transaction, and the id of a protocol run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Monetary value of an obligation, in minor units.
///
/// # Constraints:
/// - **Positive**: a recorded obligation always has `amount > 0`
pub type Amount = u64;

/// Linear ID - stable identifier of one logical obligation.
///
/// Every version of the record (issue, each transfer) carries the same
/// `LinearId`. A transfer supersedes a version; it never mints a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinearId(Uuid);

impl LinearId {
    /// Generate a new unique LinearId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for LinearId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LinearId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LinearId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Transaction ID - SHA-256 of the canonical transaction encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId([u8; 32]);

impl TxId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 8 hex chars, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.short())
    }
}

/// Run ID - identifies one execution of a protocol role.
///
/// ULID-based so ids sort by start time in logs. Also used as the owner
/// token of a vault soft lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(ulid::Ulid);

impl RunId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_id_parse_display() {
        let id = LinearId::new();
        let parsed: LinearId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<LinearId>().is_err());
    }

    #[test]
    fn test_linear_ids_are_unique() {
        assert_ne!(LinearId::new(), LinearId::new());
    }

    #[test]
    fn test_tx_id_display() {
        let id = TxId::from_bytes([0xab; 32]);
        assert_eq!(id.to_string().len(), 64);
        assert_eq!(id.short(), "abababab");
        assert_eq!(format!("{:?}", id), "TxId(abababab)");
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }
}
