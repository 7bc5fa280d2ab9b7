//! Configuration module for the playout daemon
//!
//! Resolves the process environment into a single immutable [`Config`] and
//! parses the compound values it carries (bitrates, frame rates, extension lists).

pub mod config;
pub mod values;

pub use config::*;
pub use values::*;
