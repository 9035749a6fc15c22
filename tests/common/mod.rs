//! Common test utilities for ftp-inbound live tests

#[allow(dead_code)]
pub mod config;

pub use config::*;
