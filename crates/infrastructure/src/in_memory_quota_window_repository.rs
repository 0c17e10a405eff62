use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use moodcap_application::{QuotaConsumption, QuotaWindowRepository};
use moodcap_core::AppResult;
use moodcap_domain::QuotaWindow;
use tokio::sync::RwLock;

/// Process-local quota windows.
///
/// Consumption happens under one write lock, so concurrent checks for a key
/// are serialised within this process. Counts are not shared with other
/// instances.
#[derive(Debug, Default)]
pub struct InMemoryQuotaWindowRepository {
    windows: RwLock<HashMap<String, QuotaWindow>>,
}

impl InMemoryQuotaWindowRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuotaWindowRepository for InMemoryQuotaWindowRepository {
    async fn consume(
        &self,
        key: &str,
        max_generations: i64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<QuotaConsumption> {
        let mut windows = self.windows.write().await;
        let (allowed, record) = match windows.get_mut(key) {
            Some(existing) => (
                existing.try_consume(max_generations, window, now),
                existing.clone(),
            ),
            None => {
                let fresh = QuotaWindow::start(key, window, now);
                windows.insert(key.to_owned(), fresh.clone());
                (true, fresh)
            }
        };

        Ok(QuotaConsumption {
            count: record.count,
            window_reset_at: record.window_reset_at,
            allowed,
        })
    }

    async fn find(&self, key: &str) -> AppResult<Option<QuotaWindow>> {
        Ok(self.windows.read().await.get(key).cloned())
    }

    async fn reset_all(&self) -> AppResult<u64> {
        let mut windows = self.windows.write().await;
        let removed = windows.len() as u64;
        windows.clear();
        Ok(removed)
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, window| window.is_active(now));
        Ok((before - windows.len()) as u64)
    }
}
