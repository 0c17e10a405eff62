//! Moodcap maintenance worker.
//!
//! Periodically purges expired cache entries, stale single-use entries,
//! rolled-over quota windows, and lapsed blocks from the durable store.

#![forbid(unsafe_code)]

mod maintenance;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use moodcap_application::{
    AbuseBlockService, QuotaPolicy, QuotaService, QuotaWindowRepository, ResultCacheService,
};
use moodcap_core::{AppError, AppResult};
use moodcap_domain::BlockEscalation;
use moodcap_infrastructure::{
    PostgresBlockRecordRepository, PostgresQuotaWindowRepository, PostgresResultCacheRepository,
    RedisQuotaWindowRepository,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::maintenance::{MaintenanceServices, run_maintenance_pass};

const REDIS_QUOTA_KEY_PREFIX: &str = "moodcap:quota";
const MAX_CACHE_CLEANUP_DAYS: i64 = 36_500;

#[derive(Debug, Clone)]
struct WorkerConfig {
    run_once: bool,
    database_url: String,
    redis_url: Option<String>,
    maintenance_interval_seconds: u64,
    cache_cleanup_days: i64,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let services = build_services(pool, &config)?;

    info!(
        interval_seconds = config.maintenance_interval_seconds,
        cache_cleanup_days = config.cache_cleanup_days,
        redis_quota_store = config.redis_url.is_some(),
        "moodcap-worker started"
    );

    let mut ticker =
        tokio::time::interval(Duration::from_secs(config.maintenance_interval_seconds));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        run_maintenance_pass(&services, config.cache_cleanup_days).await;

        if config.run_once {
            return Ok(());
        }
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn build_services(pool: PgPool, config: &WorkerConfig) -> AppResult<MaintenanceServices> {
    let quota_repository: Arc<dyn QuotaWindowRepository> = match config.redis_url.as_deref() {
        Some(redis_url) => {
            let client = redis::Client::open(redis_url)
                .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;
            Arc::new(RedisQuotaWindowRepository::new(
                client,
                REDIS_QUOTA_KEY_PREFIX,
            ))
        }
        None => Arc::new(PostgresQuotaWindowRepository::new(pool.clone())),
    };

    Ok(MaintenanceServices {
        result_cache: ResultCacheService::new(Arc::new(PostgresResultCacheRepository::new(
            pool.clone(),
        ))),
        quota: QuotaService::new(quota_repository, QuotaPolicy::default()),
        blocks: AbuseBlockService::new(
            Arc::new(PostgresBlockRecordRepository::new(pool)),
            BlockEscalation::default(),
        ),
    })
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let run_once = env::args().nth(1).as_deref() == Some("once");
        let database_url = required_env("DATABASE_URL")?;
        let quota_store = env::var("QUOTA_STORE").unwrap_or_else(|_| "postgres".to_owned());
        let redis_url = match quota_store.trim().to_ascii_lowercase().as_str() {
            "postgres" => None,
            "redis" => Some(required_env("REDIS_URL")?),
            other => {
                return Err(AppError::Validation(format!(
                    "QUOTA_STORE must be either 'postgres' or 'redis', got '{other}'"
                )));
            }
        };
        let maintenance_interval_seconds = parse_env_u64("MAINTENANCE_INTERVAL_SECONDS", 3_600)?;
        let cache_cleanup_days = parse_env_i64("CACHE_CLEANUP_DAYS", 30)?;

        if maintenance_interval_seconds == 0 {
            return Err(AppError::Validation(
                "MAINTENANCE_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        if !(0..=MAX_CACHE_CLEANUP_DAYS).contains(&cache_cleanup_days) {
            return Err(AppError::Validation(format!(
                "CACHE_CLEANUP_DAYS must be between 0 and {MAX_CACHE_CLEANUP_DAYS}"
            )));
        }

        Ok(Self {
            run_once,
            database_url,
            redis_url,
            maintenance_interval_seconds,
            cache_cleanup_days,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_i64(name: &str, default: i64) -> AppResult<i64> {
    match env::var(name) {
        Ok(value) => value.parse::<i64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
