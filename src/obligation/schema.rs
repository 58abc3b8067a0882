//! Obligation index
//!
//! Queryable projection `linear_id -> latest committed version`. Two table
//! layouts exist for historical reasons:
//!
//! | Version | Table          | Status                   |
//! |---------|----------------|--------------------------|
//! | v1      | `iou_states`   | legacy, import only      |
//! | v2      | `iou_states2`  | canonical storage        |
//!
//! Both carry identical columns. The index stores v2 rows only; v1 rows
//! enter through [`ObligationIndex::migrate_v1`], where an existing v2 row
//! always wins.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::core_types::{Amount, LinearId, TxId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    V1,
    #[default]
    V2,
}

impl SchemaVersion {
    pub fn version(&self) -> u8 {
        match self {
            SchemaVersion::V1 => 1,
            SchemaVersion::V2 => 2,
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            SchemaVersion::V1 => "iou_states",
            SchemaVersion::V2 => "iou_states2",
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.version())
    }
}

/// One index row. Party columns hold the resolved legal name, or the
/// pseudonym key in hex when this node cannot resolve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentObligation {
    pub lender: String,
    pub borrower: String,
    pub value: Amount,
    pub linear_id: LinearId,
    /// Transaction that produced this version
    pub tx_id: TxId,
    pub recorded_at: DateTime<Utc>,
}

/// Outcome of a v1 import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub imported: usize,
    pub already_present: usize,
    pub divergent: Vec<LinearId>,
}

/// In-memory index in the canonical (v2) layout
#[derive(Default)]
pub struct ObligationIndex {
    rows: DashMap<LinearId, PersistentObligation>,
}

impl ObligationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(&self) -> SchemaVersion {
        SchemaVersion::V2
    }

    pub fn upsert(&self, row: PersistentObligation) {
        self.rows.insert(row.linear_id, row);
    }

    pub fn remove(&self, linear_id: &LinearId) -> Option<PersistentObligation> {
        self.rows.remove(linear_id).map(|(_, row)| row)
    }

    pub fn get(&self, linear_id: &LinearId) -> Option<PersistentObligation> {
        self.rows.get(linear_id).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Import legacy v1 rows.
    ///
    /// A v1 row is imported only when no v2 row exists for its linear id.
    /// A v1 row that disagrees with the v2 row is skipped and reported.
    pub fn migrate_v1(
        &self,
        legacy: impl IntoIterator<Item = PersistentObligation>,
    ) -> MigrationReport {
        let mut report = MigrationReport::default();

        for row in legacy {
            match self.rows.entry(row.linear_id) {
                Entry::Vacant(slot) => {
                    slot.insert(row);
                    report.imported += 1;
                }
                Entry::Occupied(existing) => {
                    if same_version(existing.get(), &row) {
                        report.already_present += 1;
                    } else {
                        warn!(
                            linear_id = %row.linear_id,
                            v1_tx = %row.tx_id,
                            v2_tx = %existing.get().tx_id,
                            "Divergent {} row skipped, keeping {}",
                            SchemaVersion::V1.table_name(),
                            SchemaVersion::V2.table_name()
                        );
                        report.divergent.push(row.linear_id);
                    }
                }
            }
        }

        info!(
            imported = report.imported,
            already_present = report.already_present,
            divergent = report.divergent.len(),
            "Schema v1 migration finished"
        );
        report
    }
}

fn same_version(a: &PersistentObligation, b: &PersistentObligation) -> bool {
    a.tx_id == b.tx_id
        && a.lender == b.lender
        && a.borrower == b.borrower
        && a.value == b.value
}
