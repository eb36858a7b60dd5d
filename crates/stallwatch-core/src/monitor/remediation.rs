//! Remove a stalled transfer's queue entries and request replacements.

use std::time::Instant;

use super::Monitor;
use crate::queue_owner::OwnerKind;
use crate::transfer_client::TransferHash;

/// Result of one owner's removal call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationOutcome {
    pub kind: OwnerKind,
    pub owner: String,
    pub queue_ids: Vec<i64>,
    /// Error text when the call failed.
    pub error: Option<String>,
}

impl RemediationOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Every removal attempted for one hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationReport {
    pub hash: TransferHash,
    pub outcomes: Vec<RemediationOutcome>,
}

impl RemediationReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(RemediationOutcome::succeeded)
    }
}

impl Monitor {
    /// Ask every owner mapped to `hash` to drop, blocklist, and re-search it.
    ///
    /// The cooldown timestamp is written before each call so a failing owner
    /// still counts as attempted. One owner failing does not stop the rest.
    pub fn remediate(&mut self, hash: &TransferHash, now: Instant) -> RemediationReport {
        let targets = self
            .mappings
            .get(hash)
            .map(|m| m.targets.clone())
            .unwrap_or_default();

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in &targets {
            let owner = &self.owners[target.owner];
            tracing::info!(
                hash = hash.short(),
                kind = %owner.kind(),
                owner = owner.name(),
                queue_ids = ?target.queue_ids,
                "removing queue entries and requesting redownload"
            );
            self.last_retry.insert(hash.clone(), now);
            let error = match owner.remove_and_redownload(&target.queue_ids) {
                Ok(()) => {
                    tracing::info!(
                        kind = %owner.kind(),
                        owner = owner.name(),
                        queue_ids = ?target.queue_ids,
                        "redownload requested"
                    );
                    None
                }
                Err(e) => {
                    tracing::warn!(
                        kind = %owner.kind(),
                        owner = owner.name(),
                        queue_ids = ?target.queue_ids,
                        error = %e,
                        "queue removal failed"
                    );
                    Some(e.to_string())
                }
            };
            outcomes.push(RemediationOutcome {
                kind: owner.kind(),
                owner: owner.name().to_string(),
                queue_ids: target.queue_ids.clone(),
                error,
            });
        }
        if targets.is_empty() {
            tracing::warn!(hash = hash.short(), "no queue entries mapped; nothing to remediate");
        }

        RemediationReport {
            hash: hash.clone(),
            outcomes,
        }
    }
}
