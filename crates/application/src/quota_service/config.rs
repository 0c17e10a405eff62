use chrono::Duration;
use moodcap_core::{AppError, AppResult};
use moodcap_domain::IdentityKey;

/// Default generations per window for anonymous (`ip:`) identities.
pub const DEFAULT_ANONYMOUS_MAX_GENERATIONS: i64 = 3;

/// Default generations per window for authenticated (`user:`) identities.
pub const DEFAULT_AUTHENTICATED_MAX_GENERATIONS: i64 = 30;

/// Default window length: thirty days.
pub const DEFAULT_QUOTA_WINDOW_HOURS: i64 = 720;

/// Longest accepted window: ten years.
pub const MAX_QUOTA_WINDOW_HOURS: i64 = 87_600;

/// Ceiling and window length enforced for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaRule {
    /// Maximum generations allowed in one window.
    pub max_generations: i64,
    /// Window length in hours.
    pub window_hours: i64,
}

impl QuotaRule {
    /// Creates a validated rule.
    pub fn new(max_generations: i64, window_hours: i64) -> AppResult<Self> {
        let rule = Self {
            max_generations,
            window_hours,
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Rejects rules that could never admit a request or never roll over.
    pub fn validate(&self) -> AppResult<()> {
        if self.max_generations <= 0 {
            return Err(AppError::Validation(
                "max_generations must be greater than zero".to_owned(),
            ));
        }

        if self.window_hours <= 0 {
            return Err(AppError::Validation(
                "window_hours must be greater than zero".to_owned(),
            ));
        }

        if self.window_hours > MAX_QUOTA_WINDOW_HOURS {
            return Err(AppError::Validation(format!(
                "window_hours must be at most {MAX_QUOTA_WINDOW_HOURS}"
            )));
        }

        Ok(())
    }

    /// Window length, clamped to the accepted range.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::hours(self.window_hours.clamp(1, MAX_QUOTA_WINDOW_HOURS))
    }
}

/// Anonymous and authenticated ceilings. The limiter itself is agnostic;
/// this only picks which rule applies to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    /// Rule for `ip:` identities.
    pub anonymous: QuotaRule,
    /// Rule for `user:` identities.
    pub authenticated: QuotaRule,
}

impl QuotaPolicy {
    /// Creates a policy from two validated rules.
    #[must_use]
    pub fn new(anonymous: QuotaRule, authenticated: QuotaRule) -> Self {
        Self {
            anonymous,
            authenticated,
        }
    }

    /// Returns the rule for an identity.
    #[must_use]
    pub fn rule_for(&self, identity: &IdentityKey) -> QuotaRule {
        if identity.is_authenticated() {
            self.authenticated
        } else {
            self.anonymous
        }
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            anonymous: QuotaRule {
                max_generations: DEFAULT_ANONYMOUS_MAX_GENERATIONS,
                window_hours: DEFAULT_QUOTA_WINDOW_HOURS,
            },
            authenticated: QuotaRule {
                max_generations: DEFAULT_AUTHENTICATED_MAX_GENERATIONS,
                window_hours: DEFAULT_QUOTA_WINDOW_HOURS,
            },
        }
    }
}
