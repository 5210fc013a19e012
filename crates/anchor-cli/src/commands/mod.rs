//! CLI command implementations

pub mod common;
pub mod config;
pub mod link;
pub mod pow;
pub mod recovery;
