//! Quota identities and window records.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use moodcap_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Rate-limit identity of a caller.
///
/// Authenticated callers are counted by user id, anonymous callers by IP.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityKey {
    /// `user:<id>`
    User(String),
    /// `ip:<address>`
    Ip(String),
}

impl IdentityKey {
    /// Creates an authenticated identity.
    pub fn user(user_id: &str) -> AppResult<Self> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::Validation(
                "identity user id must not be empty".to_owned(),
            ));
        }

        Ok(Self::User(user_id.to_owned()))
    }

    /// Creates an anonymous identity from an IP address.
    pub fn ip(address: &str) -> AppResult<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(AppError::Validation(
                "identity ip address must not be empty".to_owned(),
            ));
        }

        Ok(Self::Ip(address.to_owned()))
    }

    /// Returns whether the identity belongs to an authenticated caller.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::User(_))
    }

    /// Returns the storage key, `user:<id>` or `ip:<address>`.
    #[must_use]
    pub fn storage_key(&self) -> String {
        match self {
            Self::User(user_id) => format!("user:{user_id}"),
            Self::Ip(address) => format!("ip:{address}"),
        }
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.storage_key().as_str())
    }
}

impl FromStr for IdentityKey {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().split_once(':') {
            Some(("user", user_id)) => Self::user(user_id),
            Some(("ip", address)) => Self::ip(address),
            _ => Err(AppError::Validation(format!(
                "identity key '{value}' must start with 'user:' or 'ip:'"
            ))),
        }
    }
}

/// Counter for one identity within the current window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaWindow {
    /// Storage key of the identity.
    pub key: String,
    /// Requests counted in the current window.
    pub count: i64,
    /// Instant at which the window rolls over.
    pub window_reset_at: DateTime<Utc>,
}

impl QuotaWindow {
    /// Returns whether the window is still running at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.window_reset_at
    }

    /// Opens a fresh window holding one request.
    #[must_use]
    pub fn start(key: impl Into<String>, window: Duration, now: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            count: 1,
            window_reset_at: now + window,
        }
    }

    /// Counts one request if the ceiling allows it. An elapsed window is
    /// restarted first. Returns whether the request was counted; denied
    /// requests leave the window untouched.
    pub fn try_consume(
        &mut self,
        max_generations: i64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.is_active(now) {
            *self = Self::start(self.key.clone(), window, now);
            return true;
        }

        if self.count >= max_generations {
            return false;
        }

        self.count = self.count.saturating_add(1);
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{IdentityKey, QuotaWindow};

    #[test]
    fn identity_keys_round_trip_through_storage_format() {
        let user = IdentityKey::user("42");
        assert_eq!(
            user.as_ref().map(IdentityKey::storage_key).ok().as_deref(),
            Some("user:42")
        );

        let parsed = "ip:203.0.113.7".parse::<IdentityKey>();
        assert!(matches!(parsed, Ok(IdentityKey::Ip(ref address)) if address == "203.0.113.7"));
    }

    #[test]
    fn ipv6_addresses_keep_their_colons() {
        let parsed = "ip:2001:db8::1".parse::<IdentityKey>();
        assert!(matches!(parsed, Ok(IdentityKey::Ip(ref address)) if address == "2001:db8::1"));
    }

    #[test]
    fn empty_or_unknown_identities_are_rejected() {
        assert!(IdentityKey::user("  ").is_err());
        assert!("user:".parse::<IdentityKey>().is_err());
        assert!("session:abc".parse::<IdentityKey>().is_err());
    }

    #[test]
    fn window_is_inactive_from_reset_instant() {
        let now = Utc::now();
        let window = QuotaWindow {
            key: "ip:1".to_owned(),
            count: 3,
            window_reset_at: now,
        };

        assert!(!window.is_active(now));
        assert!(window.is_active(now - Duration::seconds(1)));
    }

    #[test]
    fn consuming_stops_at_the_ceiling_and_restarts_after_rollover() {
        let now = Utc::now();
        let window_length = Duration::hours(1);
        let mut window = QuotaWindow::start("user:1", window_length, now);

        assert!(window.try_consume(2, window_length, now));
        assert_eq!(window.count, 2);
        assert!(!window.try_consume(2, window_length, now));
        assert_eq!(window.count, 2);

        let rolled = window.window_reset_at;
        assert!(window.try_consume(2, window_length, rolled));
        assert_eq!(window.count, 1);
        assert_eq!(window.window_reset_at, rolled + window_length);
    }
}
