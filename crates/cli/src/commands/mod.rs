//! CLI command implementations

pub mod audits;
pub mod groups;
pub mod recommendations;
pub mod savings;
