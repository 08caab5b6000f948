//! CLI command handlers.

pub mod config;
pub mod simulate;
pub mod storage;
