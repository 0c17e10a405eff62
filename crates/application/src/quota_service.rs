//! Generation quota ports and application service.
//!
//! Counts generations per identity in fixed-length windows that restart on
//! the first request after rollover. Anonymous callers are keyed by IP and
//! get a smaller ceiling than authenticated users.

mod config;
mod ports;
mod service;

#[cfg(test)]
mod tests;

pub use config::{
    DEFAULT_ANONYMOUS_MAX_GENERATIONS, DEFAULT_AUTHENTICATED_MAX_GENERATIONS,
    DEFAULT_QUOTA_WINDOW_HOURS, MAX_QUOTA_WINDOW_HOURS, QuotaPolicy, QuotaRule,
};
pub use ports::{QuotaConsumption, QuotaWindowRepository};
pub use service::{QuotaCheck, QuotaService, QuotaStatus};
