use std::sync::Arc;

use chrono::{DateTime, Utc};
use moodcap_core::AppResult;
use moodcap_domain::IdentityKey;
use serde::Serialize;
use tracing::{info, warn};

use crate::clock::{Clock, system_clock};

use super::config::{QuotaPolicy, QuotaRule};
use super::ports::QuotaWindowRepository;

/// Result of one quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaCheck {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests left in the current window after this one.
    pub remaining: i64,
    /// When the window rolls over.
    pub reset_at: DateTime<Utc>,
}

/// Read-only view of an identity's quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    /// Storage key of the identity.
    pub key: String,
    /// Requests counted in the live window, zero without one.
    pub count: i64,
    /// Ceiling applied to the identity.
    pub limit: i64,
    /// Requests still available.
    pub remaining: i64,
    /// Rollover instant of the live window.
    pub reset_at: Option<DateTime<Utc>>,
    /// Whether a live window exists.
    pub active: bool,
}

/// Sliding-window generation quota per identity.
#[derive(Clone)]
pub struct QuotaService {
    repository: Arc<dyn QuotaWindowRepository>,
    policy: QuotaPolicy,
    clock: Arc<dyn Clock>,
}

impl QuotaService {
    /// Creates a quota service.
    #[must_use]
    pub fn new(repository: Arc<dyn QuotaWindowRepository>, policy: QuotaPolicy) -> Self {
        Self {
            repository,
            policy,
            clock: system_clock(),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the configured policy.
    #[must_use]
    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    /// Checks and counts one generation for `identity` under `rule`.
    ///
    /// Denied checks are free: they do not count and do not push the reset
    /// back. An invalid rule is rejected. A store failure fails open and
    /// reports the request as the first of a fresh window.
    pub async fn check(&self, identity: &IdentityKey, rule: QuotaRule) -> AppResult<QuotaCheck> {
        rule.validate()?;

        let key = identity.storage_key();
        let now = self.clock.now();

        match self
            .repository
            .consume(key.as_str(), rule.max_generations, rule.window(), now)
            .await
        {
            Ok(consumption) => {
                let remaining = if consumption.allowed {
                    (rule.max_generations - consumption.count).max(0)
                } else {
                    0
                };

                if !consumption.allowed {
                    info!(
                        identity = %key,
                        limit = rule.max_generations,
                        reset_at = %consumption.window_reset_at,
                        "generation quota exhausted"
                    );
                }

                Ok(QuotaCheck {
                    allowed: consumption.allowed,
                    remaining,
                    reset_at: consumption.window_reset_at,
                })
            }
            Err(error) if error.is_validation() => Err(error),
            Err(error) => {
                warn!(
                    identity = %key,
                    error = %error,
                    "quota check failed, allowing request"
                );
                Ok(QuotaCheck {
                    allowed: true,
                    remaining: rule.max_generations - 1,
                    reset_at: now + rule.window(),
                })
            }
        }
    }

    /// Checks `identity` against the anonymous or authenticated rule.
    pub async fn check_identity(&self, identity: &IdentityKey) -> AppResult<QuotaCheck> {
        self.check(identity, self.policy.rule_for(identity)).await
    }

    /// Reports an identity's quota without counting a request.
    pub async fn check_status(&self, identity: &IdentityKey) -> AppResult<QuotaStatus> {
        let key = identity.storage_key();
        let limit = self.policy.rule_for(identity).max_generations;
        let now = self.clock.now();

        let live_window = self
            .repository
            .find(key.as_str())
            .await?
            .filter(|window| window.is_active(now));

        Ok(match live_window {
            Some(window) => QuotaStatus {
                key,
                count: window.count,
                limit,
                remaining: (limit - window.count).max(0),
                reset_at: Some(window.window_reset_at),
                active: true,
            },
            None => QuotaStatus {
                key,
                count: 0,
                limit,
                remaining: limit,
                reset_at: None,
                active: false,
            },
        })
    }

    /// Deletes every quota window. Privileged.
    pub async fn reset_all_windows(&self) -> AppResult<u64> {
        let removed = self.repository.reset_all().await?;
        warn!(removed, "all quota windows reset");
        Ok(removed)
    }

    /// Deletes windows that already rolled over.
    pub async fn cleanup_expired(&self) -> AppResult<u64> {
        self.repository.cleanup_expired(self.clock.now()).await
    }
}
