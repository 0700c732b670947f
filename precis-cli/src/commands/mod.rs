//! CLI command implementations

pub mod config;
pub mod input;
pub mod inspect;
pub mod summarize;
