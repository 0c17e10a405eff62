use moodcap_core::AppError;

/// Maps a Postgres driver error. Connectivity problems become
/// `Unavailable` so callers can fail over; everything else is `Internal`.
pub(crate) fn sqlx_error(action: &str, error: sqlx::Error) -> AppError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => {
            AppError::Unavailable(format!("failed to {action}: {error}"))
        }
        other => AppError::Internal(format!("failed to {action}: {other}")),
    }
}

/// Maps a Redis error with the same split as [`sqlx_error`].
pub(crate) fn redis_error(action: &str, error: redis::RedisError) -> AppError {
    if error.is_io_error()
        || error.is_timeout()
        || error.is_connection_dropped()
        || error.is_connection_refusal()
    {
        return AppError::Unavailable(format!("failed to {action}: {error}"));
    }

    AppError::Internal(format!("failed to {action}: {error}"))
}
