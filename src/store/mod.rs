pub mod memory;

pub use memory::MemoryChallengeStore;

use crate::error::app_error::AppError;
use crate::models::otp::{Challenge, VerifyTransition};
use async_trait::async_trait;

/// One read-modify-write step against a single entry.
///
/// The closure receives the current entry (if any) and returns the state to
/// store (`None` deletes the entry) together with the transition to report.
pub type ChallengeUpdate = Box<dyn FnOnce(Option<Challenge>) -> (Option<Challenge>, VerifyTransition) + Send>;

/// Keyed storage for pending verification challenges.
///
/// Implementations must make `update` atomic per key: no other operation may
/// observe or mutate the entry between the read and the write-back. The
/// in-process implementation is [`MemoryChallengeStore`]; a distributed cache
/// can be swapped in behind this trait for multi-process deployments.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Snapshot of the entry stored for this email
    async fn get(&self, email: &str) -> Result<Option<Challenge>, AppError>;

    /// Unconditionally replace the entry for this email
    async fn put(&self, email: &str, challenge: Challenge) -> Result<(), AppError>;

    /// Remove the entry if present
    async fn delete(&self, email: &str) -> Result<(), AppError>;

    /// Apply one verification step to the entry, atomically per email
    async fn update(&self, email: &str, update: ChallengeUpdate) -> Result<VerifyTransition, AppError>;

    /// Drop every entry past its deadline, returning the number removed
    async fn purge_expired(&self) -> Result<usize, AppError>;
}
