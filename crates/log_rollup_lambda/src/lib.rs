//! AWS-oriented adapters and handlers for access-log rollup.
//!
//! This crate owns runtime integration details (Lambda entry points, queue
//! dispatch, role assumption and object storage) and delegates key parsing,
//! grouping, task contracts and archive layout to `log_rollup_core`.

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod logging;
pub mod runtime;
