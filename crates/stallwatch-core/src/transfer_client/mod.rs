//! Transfer client: the download client that reports active torrents.

mod qbit;

use std::fmt;

use crate::retry::RequestError;

pub use qbit::QbitClient;

/// Content hash identifying a transfer. Stored lowercased so lookups are
/// case-insensitive regardless of which service reported it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferHash(String);

impl TransferHash {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for TransferHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Point-in-time view of one downloading transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSnapshot {
    pub hash: TransferHash,
    /// Current download speed in KiB/s.
    pub speed_kib: f64,
    /// Completion fraction in `[0, 1]`.
    pub progress: f64,
}

/// A download client that can enumerate its transfers.
///
/// Methods take `&mut self` because a client may need to refresh its session
/// mid-call.
pub trait TransferClient: Send {
    /// Transfers currently downloading.
    fn list_active(&mut self) -> Result<Vec<TransferSnapshot>, RequestError>;

    /// Every transfer the client knows, including seeding and finished ones.
    fn list_all_known(&mut self) -> Result<Vec<TransferHash>, RequestError>;
}
