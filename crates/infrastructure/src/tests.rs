use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use moodcap_application::{
    AbuseBlockService, CacheLookup, CacheSearchCriteria, FingerprintService, ManualClock,
    QuotaPolicy, QuotaRule, QuotaService, ResultCacheRepository, ResultCacheService,
};
use moodcap_domain::{BlockEscalation, CacheKey, IdentityKey, ImageSource};

use crate::{
    InMemoryBlockRecordRepository, InMemoryQuotaWindowRepository, InMemoryResultCacheRepository,
};

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

fn key(image: &[u8], prompt: Option<&str>, mood: &str) -> CacheKey {
    let Ok(fingerprint) = FingerprintService::new().fingerprint(&ImageSource::Bytes(image.to_vec()))
    else {
        panic!("fixture image should fingerprint");
    };
    let Ok(key) = CacheKey::new(fingerprint, prompt, mood) else {
        panic!("fixture key should be valid");
    };
    key
}

fn cache_at(
    repository: Arc<InMemoryResultCacheRepository>,
) -> (ResultCacheService, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start_time()));
    (
        ResultCacheService::new(repository).with_clock(clock.clone()),
        clock,
    )
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

#[test]
fn fingerprints_are_stable_for_identical_bytes() {
    let service = FingerprintService::new();
    let image = ImageSource::Bytes(vec![0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a]);

    let first = service.fingerprint(&image).ok();
    let second = FingerprintService::new().fingerprint(&image).ok();
    assert!(first.is_some());
    assert_eq!(first, second);
}

#[tokio::test]
async fn stored_captions_are_served_and_reuse_is_counted() {
    let repository = Arc::new(InMemoryResultCacheRepository::new());
    let (cache, _clock) = cache_at(repository.clone());
    let cache_key = key(b"sunset", Some("beach"), "happy");

    let stored = cache
        .store(
            cache_key.clone(),
            vec!["a".to_owned(), "b".to_owned()],
            Some("alice".to_owned()),
        )
        .await;
    assert_eq!(stored.ok().map(|entry| entry.usage_count), Some(1));

    let lookup = cache.lookup(&cache_key).await;
    assert!(lookup.is_hit());
    assert_eq!(
        lookup.captions(),
        Some(["a".to_owned(), "b".to_owned()].as_slice())
    );

    let Ok(stats) = cache.stats().await else {
        panic!("stats should succeed");
    };
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.total_usage, 2);
    assert_eq!(stats.quota_saved, 1);
    assert!((stats.hit_rate() - 50.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn any_differing_key_component_misses() {
    let (cache, _clock) = cache_at(Arc::new(InMemoryResultCacheRepository::new()));
    let _ = cache
        .store(
            key(b"sunset", Some("beach"), "happy"),
            vec!["a".to_owned()],
            None,
        )
        .await;

    assert_eq!(
        cache.lookup(&key(b"sunset", Some("beach"), "moody")).await,
        CacheLookup::Miss
    );
    assert_eq!(
        cache.lookup(&key(b"sunset", Some("city"), "happy")).await,
        CacheLookup::Miss
    );
    assert_eq!(
        cache.lookup(&key(b"sunrise", Some("beach"), "happy")).await,
        CacheLookup::Miss
    );
    assert!(
        !cache
            .lookup(&key(b"sunset", Some("  Beach "), "HAPPY"))
            .await
            .is_hit()
    );
}

#[tokio::test]
async fn omitted_prompts_share_an_entry() {
    let (cache, _clock) = cache_at(Arc::new(InMemoryResultCacheRepository::new()));
    let _ = cache
        .store(key(b"dog", None, "playful"), vec!["woof".to_owned()], None)
        .await;

    assert!(cache.lookup(&key(b"dog", Some("   "), "playful")).await.is_hit());
    assert!(cache.lookup(&key(b"dog", Some("default"), "Playful")).await.is_hit());
}

#[tokio::test]
async fn cleanup_spares_reused_entries() {
    let repository = Arc::new(InMemoryResultCacheRepository::new());
    let (cache, clock) = cache_at(repository.clone());

    let single_use = key(b"old-once", None, "calm");
    let reused = key(b"old-popular", None, "calm");
    let _ = cache.store(single_use.clone(), vec!["x".to_owned()], None).await;
    let _ = cache.store(reused.clone(), vec!["y".to_owned()], None).await;
    for _ in 0..4 {
        let _ = cache.lookup(&reused).await;
    }

    clock.advance(Duration::days(40));
    let _ = cache
        .store(key(b"fresh", None, "calm"), vec!["z".to_owned()], None)
        .await;

    assert_eq!(cache.clean_older_than(30).await.ok(), Some(1));
    assert_eq!(repository.len().await, 2);
    assert!(cache.lookup(&reused).await.is_hit());
    assert!(!cache.lookup(&single_use).await.is_hit());
}

#[tokio::test]
async fn concurrent_stores_each_count_one_use() {
    let repository = Arc::new(InMemoryResultCacheRepository::new());
    let (cache, _clock) = cache_at(repository.clone());
    let cache_key = key(b"race", None, "calm");

    let mut handles = Vec::new();
    for writer in 0..8 {
        let cache = cache.clone();
        let cache_key = cache_key.clone();
        handles.push(tokio::spawn(async move {
            cache
                .store(cache_key, vec![format!("caption from {writer}")], None)
                .await
        }));
    }
    for handle in handles {
        let Ok(Ok(_)) = handle.await else {
            panic!("concurrent store should succeed");
        };
    }

    let Ok(entries) = repository.search(&CacheSearchCriteria::default(), 10).await else {
        panic!("search should succeed");
    };
    assert_eq!(entries.len(), 1);
    assert_eq!(entries.first().map(|entry| entry.usage_count), Some(8));
}

#[tokio::test]
async fn search_orders_by_recent_use_and_matches_prompt_case_insensitively() {
    let (cache, clock) = cache_at(Arc::new(InMemoryResultCacheRepository::new()));
    let beach = key(b"one", Some("Sunny Beach"), "happy");
    let city = key(b"two", Some("city at night"), "happy");
    let _ = cache.store(beach.clone(), vec!["a".to_owned()], None).await;
    clock.advance(Duration::minutes(1));
    let _ = cache.store(city.clone(), vec!["b".to_owned()], None).await;
    clock.advance(Duration::minutes(1));
    let _ = cache.lookup(&beach).await;

    let Ok(all) = cache.search(&CacheSearchCriteria::default()).await else {
        panic!("search should succeed");
    };
    let prompts: Vec<&str> = all.iter().map(|entry| entry.key.prompt()).collect();
    assert_eq!(prompts, vec!["Sunny Beach", "city at night"]);

    let criteria = CacheSearchCriteria {
        prompt_contains: Some("BEACH".to_owned()),
        ..CacheSearchCriteria::default()
    };
    let found = cache.search(&criteria).await.ok().unwrap_or_default();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn expired_entries_miss_and_are_purged() {
    let repository = Arc::new(InMemoryResultCacheRepository::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let cache = ResultCacheService::new(repository.clone())
        .with_clock(clock.clone())
        .with_entry_ttl(Some(Duration::days(7)));
    let short_lived = key(b"ttl", None, "calm");
    let _ = cache.store(short_lived.clone(), vec!["x".to_owned()], None).await;
    let _ = cache
        .store(key(b"ttl-2", None, "calm"), vec!["y".to_owned()], None)
        .await;

    clock.advance(Duration::days(7));
    assert!(!cache.lookup(&short_lived).await.is_hit());
    assert_eq!(cache.purge_expired().await.ok(), Some(1));
    assert!(repository.is_empty().await);
}

#[tokio::test]
async fn restoring_an_expired_entry_counts_from_one_again() {
    let repository = Arc::new(InMemoryResultCacheRepository::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let cache = ResultCacheService::new(repository)
        .with_clock(clock.clone())
        .with_entry_ttl(Some(Duration::days(7)));
    let cache_key = key(b"ttl-restore", None, "calm");
    let Ok(original) = cache.store(cache_key.clone(), vec!["x".to_owned()], None).await else {
        panic!("store should succeed");
    };

    clock.advance(Duration::days(8));
    let Ok(restored) = cache.store(cache_key, vec!["y".to_owned()], None).await else {
        panic!("restore should succeed");
    };
    assert_eq!(restored.usage_count, 1);
    assert_eq!(restored.created_at, start_time() + Duration::days(8));
    assert_ne!(restored.id, original.id);
}

#[tokio::test]
async fn quota_counts_down_then_denies_without_consuming() {
    let repository = Arc::new(InMemoryQuotaWindowRepository::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let quota = QuotaService::new(repository, QuotaPolicy::default()).with_clock(clock.clone());
    let user = identity("user:42");

    let mut remaining = Vec::new();
    for _ in 0..5 {
        let Ok(check) = quota.check(&user, rule(5, 720)).await else {
            panic!("check should succeed");
        };
        assert!(check.allowed);
        remaining.push(check.remaining);
    }
    assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

    for _ in 0..3 {
        let denied = quota.check(&user, rule(5, 720)).await.ok();
        assert_eq!(denied.map(|check| (check.allowed, check.remaining)), Some((false, 0)));
    }
    let status = quota.check_status(&user).await.ok();
    assert_eq!(status.map(|status| status.count), Some(5));

    clock.advance(Duration::hours(720));
    let Ok(fresh) = quota.check(&user, rule(5, 720)).await else {
        panic!("check should succeed");
    };
    assert!(fresh.allowed);
    assert_eq!(fresh.remaining, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checks_never_exceed_the_ceiling() {
    let repository = Arc::new(InMemoryQuotaWindowRepository::new());
    let quota = QuotaService::new(repository, QuotaPolicy::default());
    let visitor = identity("ip:192.0.2.77");

    let mut handles = Vec::new();
    for _ in 0..40 {
        let quota = quota.clone();
        let visitor = visitor.clone();
        handles.push(tokio::spawn(async move {
            quota.check(&visitor, rule(10, 24)).await
        }));
    }

    let mut allowed = 0;
    for handle in handles {
        let Ok(Ok(check)) = handle.await else {
            panic!("concurrent check should succeed");
        };
        if check.allowed {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 10);
}

#[tokio::test]
async fn blocks_escalate_cap_and_expire() {
    let repository = Arc::new(InMemoryBlockRecordRepository::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let blocks =
        AbuseBlockService::new(repository, BlockEscalation::default()).with_clock(clock.clone());

    let first = blocks.block("x@example.com", "abuse", None, None).await.ok();
    assert_eq!(
        first.map(|record| (record.attempts, record.blocked_until)),
        Some((1, start_time() + Duration::hours(24)))
    );

    let second = blocks.block("x@example.com", "abuse", None, None).await.ok();
    assert_eq!(
        second.map(|record| (record.attempts, record.blocked_until)),
        Some((2, start_time() + Duration::hours(48)))
    );

    let mut latest = None;
    for _ in 0..10 {
        latest = blocks.block("x@example.com", "abuse", None, None).await.ok();
    }
    let Some(latest) = latest else {
        panic!("block should succeed");
    };
    assert_eq!(latest.blocked_until, start_time() + Duration::hours(168));

    clock.advance(Duration::hours(168) + Duration::seconds(1));
    let status = blocks.is_blocked("x@example.com").await.ok();
    assert_eq!(status.map(|status| status.blocked), Some(false));
}
