use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use moodcap_core::{AppError, AppResult};
use moodcap_domain::{IdentityKey, QuotaWindow};
use tokio::sync::Mutex;

use crate::clock::ManualClock;

use super::{
    MAX_QUOTA_WINDOW_HOURS, QuotaConsumption, QuotaPolicy, QuotaRule, QuotaService,
    QuotaWindowRepository,
};

#[derive(Default)]
struct FakeQuotaRepository {
    windows: Mutex<HashMap<String, QuotaWindow>>,
}

#[async_trait]
impl QuotaWindowRepository for FakeQuotaRepository {
    async fn consume(
        &self,
        key: &str,
        max_generations: i64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<QuotaConsumption> {
        let mut windows = self.windows.lock().await;
        let (allowed, record) = match windows.get_mut(key) {
            Some(existing) => {
                let allowed = existing.try_consume(max_generations, window, now);
                (allowed, existing.clone())
            }
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
        Ok(self.windows.lock().await.get(key).cloned())
    }

    async fn reset_all(&self) -> AppResult<u64> {
        let mut windows = self.windows.lock().await;
        let removed = windows.len() as u64;
        windows.clear();
        Ok(removed)
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, window| window.is_active(now));
        Ok((before - windows.len()) as u64)
    }
}

struct UnavailableQuotaRepository;

#[async_trait]
impl QuotaWindowRepository for UnavailableQuotaRepository {
    async fn consume(
        &self,
        _key: &str,
        _max_generations: i64,
        _window: Duration,
        _now: DateTime<Utc>,
    ) -> AppResult<QuotaConsumption> {
        Err(AppError::Unavailable("timed out".to_owned()))
    }

    async fn find(&self, _key: &str) -> AppResult<Option<QuotaWindow>> {
        Err(AppError::Unavailable("timed out".to_owned()))
    }

    async fn reset_all(&self) -> AppResult<u64> {
        Err(AppError::Unavailable("timed out".to_owned()))
    }

    async fn cleanup_expired(&self, _now: DateTime<Utc>) -> AppResult<u64> {
        Err(AppError::Unavailable("timed out".to_owned()))
    }
}

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 9, 30, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

fn rule(max_generations: i64, window_hours: i64) -> QuotaRule {
    match QuotaRule::new(max_generations, window_hours) {
        Ok(rule) => rule,
        Err(error) => panic!("fixture rule should be valid: {error}"),
    }
}

fn identity(value: &str) -> IdentityKey {
    match value.parse::<IdentityKey>() {
        Ok(identity) => identity,
        Err(error) => panic!("fixture identity should be valid: {error}"),
    }
}

#[tokio::test]
async fn five_checks_count_down_and_the_sixth_is_free_and_denied() {
    let repository = Arc::new(FakeQuotaRepository::default());
    let clock = Arc::new(ManualClock::new(start_time()));
    let service =
        QuotaService::new(repository.clone(), QuotaPolicy::default()).with_clock(clock.clone());
    let user = identity("user:alice");

    let mut remaining = Vec::new();
    for _ in 0..5 {
        let Ok(check) = service.check(&user, rule(5, 720)).await else {
            panic!("check should succeed");
        };
        assert!(check.allowed);
        remaining.push(check.remaining);
    }
    assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

    let stored_before = repository.find("user:alice").await.ok().flatten();

    clock.advance(Duration::hours(1));
    let Ok(denied) = service.check(&user, rule(5, 720)).await else {
        panic!("check should succeed");
    };
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);

    let stored_after = repository.find("user:alice").await.ok().flatten();
    assert_eq!(stored_before, stored_after);
    assert_eq!(stored_after.map(|window| window.count), Some(5));
}

#[tokio::test]
async fn rollover_behaves_like_a_fresh_window() {
    let repository = Arc::new(FakeQuotaRepository::default());
    let clock = Arc::new(ManualClock::new(start_time()));
    let service = QuotaService::new(repository, QuotaPolicy::default()).with_clock(clock.clone());
    let visitor = identity("ip:203.0.113.9");

    for _ in 0..3 {
        let _ = service.check(&visitor, rule(3, 24)).await;
    }
    let exhausted = service.check(&visitor, rule(3, 24)).await.ok();
    assert_eq!(exhausted.map(|check| check.allowed), Some(false));

    clock.advance(Duration::hours(24));
    let Ok(fresh) = service.check(&visitor, rule(3, 24)).await else {
        panic!("check should succeed");
    };
    assert!(fresh.allowed);
    assert_eq!(fresh.remaining, 2);
    assert_eq!(fresh.reset_at, start_time() + Duration::hours(48));
}

#[tokio::test]
async fn policy_gives_anonymous_identities_the_smaller_ceiling() {
    let policy = QuotaPolicy::new(rule(1, 720), rule(3, 720));
    let service = QuotaService::new(Arc::new(FakeQuotaRepository::default()), policy);

    let anonymous = identity("ip:198.51.100.20");
    let first = service.check_identity(&anonymous).await.ok();
    let second = service.check_identity(&anonymous).await.ok();
    assert_eq!(first.map(|check| check.allowed), Some(true));
    assert_eq!(second.map(|check| check.allowed), Some(false));

    let member = identity("user:bob");
    let first = service.check_identity(&member).await.ok();
    assert_eq!(first.map(|check| check.remaining), Some(2));
}

#[tokio::test]
async fn invalid_rules_are_rejected_before_touching_the_store() {
    let service = QuotaService::new(
        Arc::new(UnavailableQuotaRepository),
        QuotaPolicy::default(),
    );
    let user = identity("user:carol");

    let zero_ceiling = QuotaRule {
        max_generations: 0,
        window_hours: 24,
    };
    assert!(matches!(
        service.check(&user, zero_ceiling).await,
        Err(AppError::Validation(_))
    ));

    let zero_window = QuotaRule {
        max_generations: 5,
        window_hours: 0,
    };
    assert!(matches!(
        service.check(&user, zero_window).await,
        Err(AppError::Validation(_))
    ));

    let endless_window = QuotaRule {
        max_generations: 5,
        window_hours: i64::MAX,
    };
    assert!(matches!(
        service.check(&user, endless_window).await,
        Err(AppError::Validation(_))
    ));
    assert!(QuotaRule::new(5, MAX_QUOTA_WINDOW_HOURS + 1).is_err());
    assert_eq!(
        endless_window.window(),
        Duration::hours(MAX_QUOTA_WINDOW_HOURS)
    );
}

#[tokio::test]
async fn store_failure_fails_open() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let service = QuotaService::new(
        Arc::new(UnavailableQuotaRepository),
        QuotaPolicy::default(),
    )
    .with_clock(clock);

    let Ok(check) = service.check(&identity("user:dave"), rule(10, 720)).await else {
        panic!("a failing store must not reject the request");
    };
    assert!(check.allowed);
    assert_eq!(check.remaining, 9);
    assert_eq!(check.reset_at, start_time() + Duration::hours(720));
}

#[tokio::test]
async fn status_reads_without_counting() {
    let repository = Arc::new(FakeQuotaRepository::default());
    let policy = QuotaPolicy::new(rule(2, 720), rule(4, 720));
    let service = QuotaService::new(repository.clone(), policy);
    let user = identity("user:erin");

    let Ok(empty) = service.check_status(&user).await else {
        panic!("status should succeed");
    };
    assert!(!empty.active);
    assert_eq!(empty.remaining, 4);

    let _ = service.check_identity(&user).await;
    for _ in 0..3 {
        let Ok(status) = service.check_status(&user).await else {
            panic!("status should succeed");
        };
        assert!(status.active);
        assert_eq!(status.count, 1);
        assert_eq!(status.remaining, 3);
    }
}

#[tokio::test]
async fn reset_all_clears_every_window() {
    let repository = Arc::new(FakeQuotaRepository::default());
    let service = QuotaService::new(repository.clone(), QuotaPolicy::default());

    let _ = service.check_identity(&identity("user:a")).await;
    let _ = service.check_identity(&identity("ip:10.0.0.1")).await;

    assert_eq!(service.reset_all_windows().await.ok(), Some(2));
    assert!(repository.windows.lock().await.is_empty());
}
