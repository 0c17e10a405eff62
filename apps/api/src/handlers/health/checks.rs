use std::future::Future;
use std::time::Duration;

use redis::AsyncCommands;

use super::*;

const CHECK_TIMEOUT: Duration = Duration::from_secs(2);

impl HealthDependencyStatus {
    fn ok() -> Self {
        Self {
            status: "ok",
            detail: None,
        }
    }

    fn disabled() -> Self {
        Self {
            status: "disabled",
            detail: None,
        }
    }

    fn error(detail: String) -> Self {
        Self {
            status: "error",
            detail: Some(detail),
        }
    }
}

async fn bounded(
    dependency: &str,
    check: impl Future<Output = HealthDependencyStatus>,
) -> HealthDependencyStatus {
    tokio::time::timeout(CHECK_TIMEOUT, check)
        .await
        .unwrap_or_else(|_| {
            HealthDependencyStatus::error(format!(
                "{dependency} check timed out after {}ms",
                CHECK_TIMEOUT.as_millis()
            ))
        })
}

pub(super) async fn check_postgres(pool: sqlx::PgPool) -> HealthDependencyStatus {
    bounded("postgres", async move {
        match sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&pool)
            .await
        {
            Ok(_) => HealthDependencyStatus::ok(),
            Err(error) => HealthDependencyStatus::error(format!("postgres check failed: {error}")),
        }
    })
    .await
}

pub(super) async fn check_redis(
    redis_client: Option<redis::Client>,
    redis_required: bool,
) -> HealthDependencyStatus {
    let Some(redis_client) = redis_client else {
        return if redis_required {
            HealthDependencyStatus::error("redis client is not configured".to_owned())
        } else {
            HealthDependencyStatus::disabled()
        };
    };

    bounded("redis", async move {
        let mut connection = match redis_client.get_multiplexed_async_connection().await {
            Ok(connection) => connection,
            Err(error) => {
                return HealthDependencyStatus::error(format!("redis connection failed: {error}"));
            }
        };

        match connection.ping::<String>().await {
            Ok(value) if value.eq_ignore_ascii_case("pong") => HealthDependencyStatus::ok(),
            Ok(value) => {
                HealthDependencyStatus::error(format!("unexpected redis ping response: {value}"))
            }
            Err(error) => HealthDependencyStatus::error(format!("redis ping failed: {error}")),
        }
    })
    .await
}
