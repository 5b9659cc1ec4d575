//! Core library for claude-monitor.
//!
//! Polls the claude.ai organization/usage endpoints and exposes the result
//! as a normalized [`usage::UsageSnapshot`] behind a single-flight cache.

pub mod credential;
pub mod usage;
