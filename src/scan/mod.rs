//! Per-scan file observation and eligibility.
//!
//! ## Modules
//! - `candidate` - ephemeral per-scan view of a filesystem entry
//! - `eligibility` - the empty / locked / inaccessible gate

pub mod candidate;
pub mod eligibility;

pub use candidate::CandidateFile;
pub use eligibility::{Eligibility, EligibilityGate, IneligibleReason};
