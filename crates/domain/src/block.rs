//! Abuse block records and the escalation rule.

use chrono::{DateTime, Duration, Utc};
use moodcap_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Block length added per recorded offense, in hours.
pub const DEFAULT_BLOCK_HOURS_PER_OFFENSE: i64 = 24;

/// Upper bound on a single block, in hours (7 days).
pub const DEFAULT_BLOCK_MAX_HOURS: i64 = 168;

/// Largest configurable block cap, in hours (ten years).
pub const BLOCK_MAX_HOURS_LIMIT: i64 = 87_600;

/// Normalised credential a block applies to, typically an email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential(String);

impl Credential {
    /// Trims and lower-cases the credential.
    pub fn new(value: &str) -> AppResult<Self> {
        let normalized = value.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(AppError::Validation(
                "credential must not be empty".to_owned(),
            ));
        }

        Ok(Self(normalized))
    }

    /// Returns the normalised credential.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Deterministic block length as a function of cumulative offenses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEscalation {
    hours_per_offense: i64,
    max_hours: i64,
}

impl BlockEscalation {
    /// Creates an escalation rule. Both values must be positive and the cap
    /// must not be below one step.
    pub fn new(hours_per_offense: i64, max_hours: i64) -> AppResult<Self> {
        if hours_per_offense <= 0 {
            return Err(AppError::Validation(
                "block hours per offense must be greater than zero".to_owned(),
            ));
        }

        if max_hours > BLOCK_MAX_HOURS_LIMIT {
            return Err(AppError::Validation(format!(
                "block max hours must be at most {BLOCK_MAX_HOURS_LIMIT}"
            )));
        }

        if max_hours < hours_per_offense {
            return Err(AppError::Validation(format!(
                "block max hours ({max_hours}) must be at least hours per offense ({hours_per_offense})"
            )));
        }

        Ok(Self {
            hours_per_offense,
            max_hours,
        })
    }

    /// Hours added per offense.
    #[must_use]
    pub fn hours_per_offense(&self) -> i64 {
        self.hours_per_offense
    }

    /// Maximum block length in hours.
    #[must_use]
    pub fn max_hours(&self) -> i64 {
        self.max_hours
    }

    /// `min(attempts * hours_per_offense, max_hours)`, with attempts floored at 1.
    #[must_use]
    pub fn duration_hours(&self, attempts: i64) -> i64 {
        attempts
            .max(1)
            .saturating_mul(self.hours_per_offense)
            .min(self.max_hours)
            .clamp(0, BLOCK_MAX_HOURS_LIMIT)
    }

    /// Block length for the given offense count.
    #[must_use]
    pub fn duration(&self, attempts: i64) -> Duration {
        Duration::hours(self.duration_hours(attempts))
    }
}

impl Default for BlockEscalation {
    fn default() -> Self {
        Self {
            hours_per_offense: DEFAULT_BLOCK_HOURS_PER_OFFENSE,
            max_hours: DEFAULT_BLOCK_MAX_HOURS,
        }
    }
}

/// Escalating deny-list entry for one credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Blocked credential.
    pub credential: Credential,
    /// Block is active until this instant.
    pub blocked_until: DateTime<Utc>,
    /// Cumulative offenses since the record was (re)started.
    pub attempts: i64,
    /// Reason recorded with the latest offense.
    pub reason: String,
    /// Client address seen with the latest offense, for audit.
    pub ip_address: Option<String>,
    /// Client user agent seen with the latest offense, for audit.
    pub user_agent: Option<String>,
}

impl BlockRecord {
    /// A block lapses once `now` is strictly past `blocked_until`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now <= self.blocked_until
    }

    /// Applies one more offense at `now`.
    ///
    /// A lapsed record restarts at one attempt. Reason and audit fields take
    /// the latest offense's values, keeping earlier audit data when absent.
    pub fn escalate(
        &mut self,
        offense: &BlockOffense,
        escalation: &BlockEscalation,
        now: DateTime<Utc>,
    ) {
        self.attempts = if self.is_active(now) {
            self.attempts.saturating_add(1)
        } else {
            1
        };
        self.blocked_until = now + escalation.duration(self.attempts);
        self.reason = offense.reason.clone();
        if offense.ip_address.is_some() {
            self.ip_address = offense.ip_address.clone();
        }
        if offense.user_agent.is_some() {
            self.user_agent = offense.user_agent.clone();
        }
    }

    /// Creates the record for a first offense.
    #[must_use]
    pub fn first_offense(
        offense: &BlockOffense,
        escalation: &BlockEscalation,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            credential: offense.credential.clone(),
            blocked_until: now + escalation.duration(1),
            attempts: 1,
            reason: offense.reason.clone(),
            ip_address: offense.ip_address.clone(),
            user_agent: offense.user_agent.clone(),
        }
    }
}

/// One abuse signal against a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOffense {
    /// Offending credential.
    pub credential: Credential,
    /// Free-form reason, e.g. `quota_evasion`.
    pub reason: String,
    /// Client address, when known.
    pub ip_address: Option<String>,
    /// Client user agent, when known.
    pub user_agent: Option<String>,
}
