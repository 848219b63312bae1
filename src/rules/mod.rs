//! Validated rules and single-owner matching.
//!
//! ## Modules
//! - `spec` - `RuleSpec`, extension sets, collision policy
//! - `set` - ordered immutable `RuleSet` snapshots
//! - `matcher` - resolving the one rule allowed to act on a file

pub mod matcher;
pub mod set;
pub mod spec;

pub use matcher::match_rule;
pub use set::RuleSet;
pub use spec::{CollisionPolicy, ExtensionSet, RuleSpec};
