//! Core policy translation and apply/rollback functionality
//!
//! - [`rules`]: Data structures for policy records and derived types
//! - [`ruleset`]: Translation of records into iptables-restore text
//! - [`counters`]: Parsing traffic counters out of engine state dumps
//! - [`engine`]: The process boundary to the live packet filter
//! - [`service`]: Apply/rollback orchestration
//! - [`error`]: Error types for firewall operations

pub mod counters;
pub mod engine;
pub mod error;
pub mod rules;
pub mod ruleset;
pub mod service;
