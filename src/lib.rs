//! GitLab token-expiry exporter — library crate for integration testing.
//!
//! Re-exports modules needed by integration tests in `tests/`.

pub mod cli;
pub mod config;
pub mod errors;
pub mod gitlab;
pub mod metrics;
pub mod scraper;
