use std::env;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use ipnet::IpNet;
use moodcap_application::{
    DEFAULT_ANONYMOUS_MAX_GENERATIONS, DEFAULT_AUTHENTICATED_MAX_GENERATIONS,
    DEFAULT_QUOTA_WINDOW_HOURS, QuotaPolicy, QuotaRule,
};
use moodcap_core::AppError;
use moodcap_domain::{BlockEscalation, DEFAULT_BLOCK_HOURS_PER_OFFENSE, DEFAULT_BLOCK_MAX_HOURS};
use tracing_subscriber::EnvFilter;
use url::Url;

const ADMIN_API_TOKEN_MIN_LENGTH: usize = 32;
const MAX_CACHE_ENTRY_TTL_DAYS: i64 = 3_650;

/// Backend holding quota windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaStoreKind {
    Postgres,
    Redis,
}

impl FromStr for QuotaStoreKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "redis" => Ok(Self::Redis),
            other => Err(AppError::Validation(format!(
                "QUOTA_STORE must be either 'postgres' or 'redis', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub quota_store: QuotaStoreKind,
    pub api_host: String,
    pub api_port: u16,
    pub admin_api_token: String,
    pub generation_backend_url: Url,
    pub generation_backend_api_key: Option<String>,
    pub generation_backend_timeout_ms: u64,
    pub generation_backend_max_attempts: u8,
    pub quota_policy: QuotaPolicy,
    pub block_escalation: BlockEscalation,
    pub cache_entry_ttl_days: Option<i64>,
    pub store_timeout_ms: u64,
    pub store_retry_after_seconds: u64,
    pub fallback_sweep_interval_seconds: u64,
    pub trusted_proxies: Vec<IpNet>,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");
        let mut config = Self::from_lookup(|name| env::var(name).ok())?;
        config.migrate_only = migrate_only;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let env = EnvReader { lookup };

        let database_url = env.required_non_empty("DATABASE_URL")?;
        let redis_url = env.optional("REDIS_URL");
        let quota_store = env
            .optional("QUOTA_STORE")
            .map(|value| value.parse::<QuotaStoreKind>())
            .transpose()?
            .unwrap_or(QuotaStoreKind::Postgres);
        if quota_store == QuotaStoreKind::Redis && redis_url.is_none() {
            return Err(AppError::Validation(
                "REDIS_URL is required when QUOTA_STORE=redis".to_owned(),
            ));
        }

        let api_host = env
            .optional("API_HOST")
            .unwrap_or_else(|| "127.0.0.1".to_owned());
        let api_port = env.parse_or("API_PORT", 3001_u16)?;

        let admin_api_token = env.required_non_empty("ADMIN_API_TOKEN")?;
        if admin_api_token.len() < ADMIN_API_TOKEN_MIN_LENGTH {
            return Err(AppError::Validation(format!(
                "ADMIN_API_TOKEN must be at least {ADMIN_API_TOKEN_MIN_LENGTH} characters"
            )));
        }

        let generation_backend_url = env.required_non_empty("GENERATION_BACKEND_URL")?;
        let generation_backend_url = Url::parse(generation_backend_url.as_str()).map_err(|error| {
            AppError::Validation(format!("invalid GENERATION_BACKEND_URL: {error}"))
        })?;
        let generation_backend_api_key = env.optional("GENERATION_BACKEND_API_KEY");
        let generation_backend_timeout_ms = env.parse_or("GENERATION_BACKEND_TIMEOUT_MS", 30_000)?;
        let generation_backend_max_attempts =
            env.parse_or("GENERATION_BACKEND_MAX_ATTEMPTS", 2_u8)?;
        if generation_backend_max_attempts == 0 {
            return Err(AppError::Validation(
                "GENERATION_BACKEND_MAX_ATTEMPTS must be greater than zero".to_owned(),
            ));
        }

        let window_hours = env.parse_or("QUOTA_WINDOW_HOURS", DEFAULT_QUOTA_WINDOW_HOURS)?;
        let quota_policy = QuotaPolicy::new(
            QuotaRule::new(
                env.parse_or("QUOTA_ANONYMOUS_MAX", DEFAULT_ANONYMOUS_MAX_GENERATIONS)?,
                window_hours,
            )?,
            QuotaRule::new(
                env.parse_or(
                    "QUOTA_AUTHENTICATED_MAX",
                    DEFAULT_AUTHENTICATED_MAX_GENERATIONS,
                )?,
                window_hours,
            )?,
        );

        let block_escalation = BlockEscalation::new(
            env.parse_or("BLOCK_HOURS_PER_OFFENSE", DEFAULT_BLOCK_HOURS_PER_OFFENSE)?,
            env.parse_or("BLOCK_MAX_HOURS", DEFAULT_BLOCK_MAX_HOURS)?,
        )?;

        let cache_entry_ttl_days = env
            .optional("CACHE_ENTRY_TTL_DAYS")
            .map(|value| parse_value::<i64>("CACHE_ENTRY_TTL_DAYS", value.as_str()))
            .transpose()?;
        if cache_entry_ttl_days
            .is_some_and(|days| !(1..=MAX_CACHE_ENTRY_TTL_DAYS).contains(&days))
        {
            return Err(AppError::Validation(format!(
                "CACHE_ENTRY_TTL_DAYS must be between 1 and {MAX_CACHE_ENTRY_TTL_DAYS}"
            )));
        }

        let store_timeout_ms = env.parse_or("STORE_TIMEOUT_MS", 1_500_u64)?;
        if store_timeout_ms == 0 {
            return Err(AppError::Validation(
                "STORE_TIMEOUT_MS must be greater than zero".to_owned(),
            ));
        }
        let store_retry_after_seconds = env.parse_or("STORE_RETRY_AFTER_SECONDS", 30_u64)?;
        let fallback_sweep_interval_seconds =
            env.parse_or("FALLBACK_SWEEP_INTERVAL_SECONDS", 60_u64)?;
        if fallback_sweep_interval_seconds == 0 {
            return Err(AppError::Validation(
                "FALLBACK_SWEEP_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        let trusted_proxies = env
            .optional("TRUSTED_PROXY_CIDRS")
            .map(|value| parse_trusted_proxies(value.as_str()))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            migrate_only: false,
            database_url,
            redis_url,
            quota_store,
            api_host,
            api_port,
            admin_api_token,
            generation_backend_url,
            generation_backend_api_key,
            generation_backend_timeout_ms,
            generation_backend_max_attempts,
            quota_policy,
            block_escalation,
            cache_entry_ttl_days,
            store_timeout_ms,
            store_retry_after_seconds,
            fallback_sweep_interval_seconds,
            trusted_proxies,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }

    pub fn requires_redis(&self) -> bool {
        self.quota_store == QuotaStoreKind::Redis
    }

    pub fn cache_entry_ttl(&self) -> Option<TimeDelta> {
        self.cache_entry_ttl_days.and_then(TimeDelta::try_days)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn store_retry_after(&self) -> Duration {
        Duration::from_secs(self.store_retry_after_seconds)
    }

    pub fn generation_backend_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_backend_timeout_ms)
    }

    pub fn fallback_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.fallback_sweep_interval_seconds)
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn required_non_empty(&self, name: &str) -> Result<String, AppError> {
        let value =
            (self.lookup)(name).ok_or_else(|| AppError::Validation(format!("{name} is required")))?;
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{name} must not be empty")));
        }

        Ok(value.trim().to_owned())
    }

    fn parse_or<T>(&self, name: &str, default: T) -> Result<T, AppError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(name) {
            Some(value) => parse_value(name, value.as_str()),
            None => Ok(default),
        }
    }
}

fn parse_value<T>(name: &str, value: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse::<T>()
        .map_err(|error| AppError::Validation(format!("invalid {name} value '{value}': {error}")))
}

fn parse_trusted_proxies(value: &str) -> Result<Vec<IpNet>, AppError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<IpNet>()
                .or_else(|_| entry.parse::<IpAddr>().map(IpNet::from))
                .map_err(|error| {
                    AppError::Validation(format!(
                        "invalid TRUSTED_PROXY_CIDRS entry '{entry}': {error}"
                    ))
                })
        })
        .collect()
}
