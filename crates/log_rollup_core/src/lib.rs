//! Shared access-log rollup domain primitives.
//!
//! This crate owns deterministic rollup behavior: key parsing, day grouping,
//! task batching, archive naming and building, and the queue lease model.
//! It intentionally excludes AWS SDK and Lambda runtime concerns.

pub mod archive;
pub mod batching;
pub mod contract;
pub mod error;
pub mod grouping;
pub mod lease;
pub mod log_key;
