//! Caption generation flow.
//!
//! Order per request: block check, quota check, cache lookup, and only on a
//! miss the generation backend followed by a cache store. Input is validated
//! before any of these so malformed requests never debit quota.

mod ports;
mod service;


pub use ports::CaptionGenerator;
pub use service::{CaptionService, GenerationOutcome, GenerationRequest};
