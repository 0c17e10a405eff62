use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moodcap_application::BlockRecordRepository;
use moodcap_core::AppResult;
use moodcap_domain::{BlockEscalation, BlockOffense, BlockRecord, Credential};
use tokio::sync::RwLock;

/// Process-local block list.
#[derive(Debug, Default)]
pub struct InMemoryBlockRecordRepository {
    records: RwLock<HashMap<Credential, BlockRecord>>,
}

impl InMemoryBlockRecordRepository {
    /// Creates an empty block list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlockRecordRepository for InMemoryBlockRecordRepository {
    async fn record_offense(
        &self,
        offense: &BlockOffense,
        escalation: BlockEscalation,
        now: DateTime<Utc>,
    ) -> AppResult<BlockRecord> {
        let mut records = self.records.write().await;
        let record = records
            .entry(offense.credential.clone())
            .and_modify(|record| record.escalate(offense, &escalation, now))
            .or_insert_with(|| BlockRecord::first_offense(offense, &escalation, now));

        Ok(record.clone())
    }

    async fn find(&self, credential: &Credential) -> AppResult<Option<BlockRecord>> {
        Ok(self.records.read().await.get(credential).cloned())
    }

    async fn delete_if_lapsed(
        &self,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut records = self.records.write().await;
        if records
            .get(credential)
            .is_some_and(|record| !record.is_active(now))
        {
            records.remove(credential);
            return Ok(true);
        }

        Ok(false)
    }

    async fn delete(&self, credential: &Credential) -> AppResult<bool> {
        Ok(self.records.write().await.remove(credential).is_some())
    }

    async fn delete_lapsed(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.is_active(now));
        Ok((before - records.len()) as u64)
    }

    async fn delete_all(&self) -> AppResult<u64> {
        let mut records = self.records.write().await;
        let removed = records.len() as u64;
        records.clear();
        Ok(removed)
    }
}
