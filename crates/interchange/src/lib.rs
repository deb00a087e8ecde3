//! formwire-interchange: typed documents consumed by the formwire engine.
//!
//! Two document families live here:
//! - rule definitions, read from JSON or YAML (`name`, `condition`,
//!   `actions`, ...), see [`parse_rules`]
//! - form structure, read from JSON (steps holding field declarations),
//!   see [`parse_form`]
//!
//! Nothing in this crate evaluates a rule or tracks a value. Consumers
//! depend on it for the initial parse, then build their own runtime
//! representation.

pub mod deserialize;
pub mod types;

pub use deserialize::{parse_form, parse_rules, InterchangeError};
pub use types::*;
