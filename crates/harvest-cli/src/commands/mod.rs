//! CLI command implementations.

pub mod backfill;
pub mod common;
pub mod control;
pub mod list;
pub mod serve;
pub mod status;
