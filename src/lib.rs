//! fileferry: rule-driven folder watching and safe file relocation.
//!
//! The core pipeline, per scan pass: the [`config`] validator turns a raw
//! document into an immutable [`rules::RuleSet`]; the [`scan`] gate decides
//! whether a file may be considered at all; the [`rules`] matcher picks the
//! single rule allowed to act; the [`ledger`] records the attempt durably
//! before the [`fsops`] move primitive runs; [`events`] reports every
//! decision to whoever is listening. [`engine`] schedules the whole thing,
//! one periodic task per active rule.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod filter;
pub mod fsops;
pub mod ledger;
pub mod rules;
pub mod scan;

pub use config::{ConfigValidator, ValidationReport};
pub use engine::Engine;
pub use error::FerryError;
pub use filter::{DateField, DateFilter};
pub use ledger::{TransferLedger, TransferStatus};
pub use rules::{RuleSet, RuleSpec};
