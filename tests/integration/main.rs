//! Integration tests for listing-tracker
//!
//! Browser and healthcheck tests run against wiremock servers. Full runs are
//! driven through an in-memory fixture browser.

mod browser_tests;
mod evasion_tests;
mod healthcheck_tests;
mod reconcile_tests;
mod run_tests;
mod support;
