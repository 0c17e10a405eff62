use std::sync::Arc;

use chrono::{DateTime, Utc};
use moodcap_core::{AppResult, NonEmptyString};
use moodcap_domain::{BlockEscalation, BlockOffense, BlockRecord, Credential};
use serde::Serialize;
use tracing::{info, warn};

use crate::clock::{Clock, system_clock};

use super::ports::BlockRecordRepository;

/// Block state of one credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockStatus {
    /// Whether requests for the credential must be rejected.
    pub blocked: bool,
    /// End of the active block.
    pub blocked_until: Option<DateTime<Utc>>,
    /// Offenses counted for the active block.
    pub attempts: Option<i64>,
    /// Whole hours left, rounded up.
    pub hours_remaining: Option<i64>,
    /// Reason of the latest offense.
    pub reason: Option<String>,
}

impl BlockStatus {
    fn not_blocked() -> Self {
        Self {
            blocked: false,
            blocked_until: None,
            attempts: None,
            hours_remaining: None,
            reason: None,
        }
    }

    fn active(record: BlockRecord, now: DateTime<Utc>) -> Self {
        let remaining_seconds = (record.blocked_until - now).num_seconds().max(0);
        let hours_remaining = (remaining_seconds + 3_599) / 3_600;

        Self {
            blocked: true,
            blocked_until: Some(record.blocked_until),
            attempts: Some(record.attempts),
            hours_remaining: Some(hours_remaining),
            reason: Some(record.reason),
        }
    }
}

/// Escalating, self-expiring deny list keyed by credential.
#[derive(Clone)]
pub struct AbuseBlockService {
    repository: Arc<dyn BlockRecordRepository>,
    escalation: BlockEscalation,
    clock: Arc<dyn Clock>,
}

impl AbuseBlockService {
    /// Creates a block list service.
    #[must_use]
    pub fn new(repository: Arc<dyn BlockRecordRepository>, escalation: BlockEscalation) -> Self {
        Self {
            repository,
            escalation,
            clock: system_clock(),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Records an abuse signal and (re)computes the block length.
    pub async fn block(
        &self,
        credential: &str,
        reason: &str,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> AppResult<BlockRecord> {
        let offense = BlockOffense {
            credential: Credential::new(credential)?,
            reason: String::from(NonEmptyString::new(reason.trim())?),
            ip_address,
            user_agent,
        };

        let record = self
            .repository
            .record_offense(&offense, self.escalation, self.clock.now())
            .await?;

        warn!(
            credential = %record.credential,
            attempts = record.attempts,
            blocked_until = %record.blocked_until,
            reason = %record.reason,
            "credential blocked"
        );

        Ok(record)
    }

    /// Returns the block state of a credential.
    ///
    /// Lapsed records are removed on read. Store failures report the
    /// credential as not blocked.
    pub async fn is_blocked(&self, credential: &str) -> AppResult<BlockStatus> {
        let credential = Credential::new(credential)?;
        let now = self.clock.now();

        let record = match self.repository.find(&credential).await {
            Ok(record) => record,
            Err(error) => {
                warn!(
                    credential = %credential,
                    error = %error,
                    "block lookup failed, treating credential as not blocked"
                );
                return Ok(BlockStatus::not_blocked());
            }
        };

        match record {
            Some(record) if record.is_active(now) => Ok(BlockStatus::active(record, now)),
            Some(_) => {
                if let Err(error) = self.repository.delete_if_lapsed(&credential, now).await {
                    warn!(
                        credential = %credential,
                        error = %error,
                        "failed to remove lapsed block record"
                    );
                }
                Ok(BlockStatus::not_blocked())
            }
            None => Ok(BlockStatus::not_blocked()),
        }
    }

    /// Lifts the block on one credential. Privileged.
    pub async fn unblock(&self, credential: &str) -> AppResult<bool> {
        let credential = Credential::new(credential)?;
        let removed = self.repository.delete(&credential).await?;
        if removed {
            info!(credential = %credential, "credential unblocked");
        }

        Ok(removed)
    }

    /// Lifts every block. Privileged.
    pub async fn reactivate_all(&self) -> AppResult<u64> {
        let removed = self.repository.delete_all().await?;
        warn!(removed, "all credential blocks lifted");
        Ok(removed)
    }

    /// Deletes lapsed records.
    pub async fn purge_expired(&self) -> AppResult<u64> {
        self.repository.delete_lapsed(self.clock.now()).await
    }
}
