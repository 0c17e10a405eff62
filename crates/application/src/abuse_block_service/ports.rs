use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moodcap_core::AppResult;
use moodcap_domain::{BlockEscalation, BlockOffense, BlockRecord, Credential};

/// Repository port for the `block_records` collection.
#[async_trait]
pub trait BlockRecordRepository: Send + Sync {
    /// Records one offense as a single atomic upsert.
    ///
    /// Creates the record with one attempt, or increments `attempts` on a
    /// record that is still active and restarts it at one when it has
    /// lapsed. `blocked_until` becomes `now + escalation.duration(attempts)`.
    async fn record_offense(
        &self,
        offense: &BlockOffense,
        escalation: BlockEscalation,
        now: DateTime<Utc>,
    ) -> AppResult<BlockRecord>;

    /// Returns the record for a credential, active or not.
    async fn find(&self, credential: &Credential) -> AppResult<Option<BlockRecord>>;

    /// Deletes the record for a credential if it has lapsed at `now`.
    ///
    /// A concurrent offense that re-activated the record wins.
    async fn delete_if_lapsed(
        &self,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Deletes the record for a credential unconditionally.
    async fn delete(&self, credential: &Credential) -> AppResult<bool>;

    /// Deletes every lapsed record.
    async fn delete_lapsed(&self, now: DateTime<Utc>) -> AppResult<u64>;

    /// Deletes every record.
    async fn delete_all(&self) -> AppResult<u64>;
}
