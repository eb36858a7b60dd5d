//! Queue owners: the Radarr / Sonarr servers whose download queues reference
//! transfers by hash.
//!
//! The monitor only needs two capabilities from an owner, listing its queue and
//! removing entries with blocklist + re-search, so both server families sit
//! behind one trait and one concrete client ([`ArrInstance`]) that differs only
//! by [`OwnerKind`].

mod arr;
mod parse;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::OwnerConfig;
use crate::retry::RequestError;
use crate::transfer_client::TransferHash;

pub use arr::ArrInstance;
pub use parse::parse_queue_body;

/// Which family of media server owns a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Radarr,
    Sonarr,
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerKind::Radarr => write!(f, "radarr"),
            OwnerKind::Sonarr => write!(f, "sonarr"),
        }
    }
}

/// One record from an owner's queue. Fields are optional because the servers
/// return partially-populated records for items still being grabbed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: Option<i64>,
    pub download_id: Option<String>,
}

impl QueueEntry {
    /// True if this record belongs to `hash` (case-insensitive) and has an id
    /// that can be removed. Incomplete records never match.
    pub fn matches(&self, hash: &TransferHash) -> bool {
        self.id.is_some()
            && self
                .download_id
                .as_deref()
                .is_some_and(|d| d.eq_ignore_ascii_case(hash.as_str()))
    }
}

/// A service that holds pending acquisitions and can replace one.
pub trait QueueOwner: Send {
    fn kind(&self) -> OwnerKind;

    fn name(&self) -> &str;

    /// Current queue of pending acquisitions.
    fn fetch_queue(&self) -> Result<Vec<QueueEntry>, RequestError>;

    /// Remove `queue_ids` from the download client, blocklist their release,
    /// and ask the server to search for a replacement. Category is untouched.
    fn remove_and_redownload(&self, queue_ids: &[i64]) -> Result<(), RequestError>;
}

/// Build one [`ArrInstance`] per configured owner, in config order.
pub fn owners_from_config(owners: &[OwnerConfig]) -> Result<Vec<Box<dyn QueueOwner>>, RequestError> {
    owners
        .iter()
        .map(|cfg| ArrInstance::from_config(cfg).map(|o| Box::new(o) as Box<dyn QueueOwner>))
        .collect()
}
