//! CLI command implementations

pub mod crosswalk;
pub mod run;
pub mod spec;
