//! Audit agent
//!
//! Runs the resource audits on a schedule and serves health, metrics and
//! the latest report over HTTP.

pub mod api;
pub mod config;
pub mod scheduler;
