//! Shared plumbing used across the fairbet core.

pub mod config;
pub mod traits;
pub mod types;
