//! Reliability patterns for job revival
//!
//! This module provides:
//! - [`RevivalPolicy`] - how many times, and how soon, a failed job is revived

mod revival;

pub use revival::RevivalPolicy;
