//! Abuse block list ports and application service.
//!
//! Credentials that keep triggering abuse signals (for example accounts that
//! are deleted and recreated to reset their quota) are blocked for one day
//! per offense, up to a week. Blocks expire on their own.

mod ports;
mod service;


pub use ports::BlockRecordRepository;
pub use service::{AbuseBlockService, BlockStatus};
