//! Container commit policy.
//!
//! The general store's image lives in a secure-store object that stays open
//! for writing while the store is being changed. An object left open at a
//! power loss is unreadable on the next boot, so the dispatcher closes the
//! container after each general-store change that must survive: closing a
//! descriptor opened for writing, renaming and unlinking.
//!
//! The commit never changes the result of the operation that triggered it.

use fsmux_types::Errno;
use strum::{AsRefStr, Display};
use tracing::{debug, warn};

use crate::adapter::GeneralStoreAdapter;

/// Operation that triggered a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CommitTrigger {
    CloseAfterWrite,
    Rename,
    Unlink,
}

/// A commit that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitFailure {
    pub trigger: CommitTrigger,
    pub errno: Errno,
}

/// Commit counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitStats {
    pub attempted: u64,
    pub failed: u64,
    pub last_failure: Option<CommitFailure>,
}

impl CommitStats {
    pub fn succeeded(&self) -> u64 {
        self.attempted - self.failed
    }
}

/// Closes the general store's container and records the outcome.
#[derive(Debug, Default)]
pub struct CommitPolicy {
    stats: CommitStats,
}

impl CommitPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &CommitStats {
        &self.stats
    }

    pub fn commit(&mut self, trigger: CommitTrigger, general: &mut GeneralStoreAdapter) {
        self.stats.attempted += 1;
        match general.commit_container() {
            Ok(()) => debug!(%trigger, "container committed"),
            Err(errno) => {
                warn!(%trigger, %errno, "container commit failed");
                self.stats.failed += 1;
                self.stats.last_failure = Some(CommitFailure { trigger, errno });
            }
        }
    }
}
