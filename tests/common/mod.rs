//! Common test utilities for usenet-speedtest integration tests

#[allow(dead_code)]
pub mod fake_server;

pub use fake_server::*;
