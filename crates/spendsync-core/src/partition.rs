//! Owner grouping and fixed-size batch slicing
//!
//! Owners are visited in lexicographic order and batch ids are assigned
//! globally across owners, so identical inputs always produce identical
//! numbering. Resume depends on that.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::record::{OwnerLookup, Record};

/// Upper bound on records per request.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Bounded slice of one owner's records, sent as a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Run-wide sequence number, starting at 1.
    pub id: u64,
    pub owner: String,
    pub records: Vec<Record>,
}

/// Wire shape of a batch request body.
#[derive(Serialize)]
struct BatchPayload<'a> {
    owner: &'a str,
    items: Vec<Record>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn body(&self, approver: &str) -> BatchPayload<'_> {
        BatchPayload {
            owner: &self.owner,
            items: self
                .records
                .iter()
                .map(|r| r.with_field("approver", approver))
                .collect(),
        }
    }

    /// JSON request body: `{"owner": ..., "items": [...]}`, every item
    /// stamped with `approver`.
    pub fn payload(&self, approver: &str) -> serde_json::Result<String> {
        serde_json::to_string(&self.body(approver))
    }

    /// Same body as [`Batch::payload`], as a JSON value.
    pub fn payload_value(&self, approver: &str) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self.body(approver))
    }
}

/// Result of partitioning a record set.
#[derive(Debug, Default)]
pub struct Partition {
    /// Batches in ascending id order.
    pub batches: Vec<Batch>,
    /// Owners that matched no record.
    pub skipped_owners: Vec<String>,
    /// Records no owner claimed; never uploaded.
    pub unmatched_records: usize,
}

impl Partition {
    /// Records across all batches (a record owned twice counts twice).
    pub fn total_records(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }
}

/// Splits records into per-owner batches of at most `batch_size`.
#[derive(Debug, Clone, Copy)]
pub struct Partitioner {
    batch_size: usize,
}

impl Default for Partitioner {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
        }
    }
}

impl Partitioner {
    /// `batch_size` is clamped to `1..=MAX_BATCH_SIZE`.
    pub fn new(batch_size: usize) -> Self {
        let clamped = batch_size.clamp(1, MAX_BATCH_SIZE);
        if clamped != batch_size {
            log::warn!("batch size {batch_size} out of range, using {clamped}");
        }
        Self {
            batch_size: clamped,
        }
    }

    #[cfg(test)]
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn partition(&self, records: &[Record], owners: &dyn OwnerLookup) -> Partition {
        let owner_keys: BTreeSet<String> = owners.owners().into_iter().collect();
        let mut claimed = vec![false; records.len()];
        let mut partition = Partition::default();
        let mut next_id = 1u64;

        for owner in owner_keys {
            let owned: Vec<&Record> = records
                .iter()
                .enumerate()
                .filter(|(_, r)| owners.owns(&owner, r))
                .map(|(i, r)| {
                    claimed[i] = true;
                    r
                })
                .collect();

            if owned.is_empty() {
                log::info!("{owner}: no matching records, skipped");
                partition.skipped_owners.push(owner);
                continue;
            }

            let chunks = owned.chunks(self.batch_size);
            log::debug!(
                "{owner}: {} records in {} batches",
                owned.len(),
                chunks.len()
            );
            for chunk in chunks {
                partition.batches.push(Batch {
                    id: next_id,
                    owner: owner.clone(),
                    records: chunk.iter().map(|r| (*r).clone()).collect(),
                });
                next_id += 1;
            }
        }

        partition.unmatched_records = claimed.iter().filter(|c| !**c).count();
        if partition.unmatched_records > 0 {
            log::warn!(
                "{} of {} records match no owner and will not be uploaded",
                partition.unmatched_records,
                records.len()
            );
        }
        partition
    }
}
