//! CLI command implementations.

pub mod common;
pub mod config;
pub mod control;
pub mod fetch;
pub mod init;
pub mod status;
