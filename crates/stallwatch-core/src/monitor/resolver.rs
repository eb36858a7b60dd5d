//! Map transfer hashes to the queue entries that own them.

use crate::queue_owner::{QueueEntry, QueueOwner};
use crate::transfer_client::TransferHash;

/// Queue entries of one owner that depend on a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingTarget {
    /// Index into the monitor's owner list.
    pub owner: usize,
    pub queue_ids: Vec<i64>,
}

/// Owner queues fetched lazily, at most once per cycle, and shared across
/// every hash resolved in that cycle.
pub struct CycleQueues<'a> {
    owners: &'a [Box<dyn QueueOwner>],
    queues: Vec<Option<Vec<QueueEntry>>>,
}

impl<'a> CycleQueues<'a> {
    pub fn new(owners: &'a [Box<dyn QueueOwner>]) -> Self {
        Self {
            owners,
            queues: vec![None; owners.len()],
        }
    }

    /// Queue of owner `idx`. A failed fetch is logged and counts as an empty
    /// queue for the rest of the cycle.
    fn queue(&mut self, idx: usize) -> &[QueueEntry] {
        let owners = self.owners;
        self.queues[idx].get_or_insert_with(|| {
            let owner = &owners[idx];
            match owner.fetch_queue() {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        kind = %owner.kind(),
                        owner = owner.name(),
                        error = %e,
                        "queue fetch failed; treating as no matches this cycle"
                    );
                    if let crate::retry::RequestError::Http { body, .. } = &e {
                        tracing::debug!(owner = owner.name(), body = %body, "queue error body");
                    }
                    Vec::new()
                }
            }
        })
    }

    /// Every owner's entries for `hash`, one target per owner with at least
    /// one match. Empty when nothing owns the transfer (yet).
    pub fn resolve(&mut self, hash: &TransferHash) -> Vec<MappingTarget> {
        let mut found = Vec::new();
        for idx in 0..self.owners.len() {
            let queue_ids: Vec<i64> = self
                .queue(idx)
                .iter()
                .filter(|e| e.matches(hash))
                .filter_map(|e| e.id)
                .collect();
            if !queue_ids.is_empty() {
                found.push(MappingTarget {
                    owner: idx,
                    queue_ids,
                });
            }
        }
        found
    }
}
