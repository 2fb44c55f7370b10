//! Logging infrastructure for the turbo bootstrap.
//!
//! The bootstrap never installs a global subscriber. Instead the entry point
//! builds a [`logging::LogContext`] once, and every startup step runs inside
//! [`logging::LogContext::scope`], so components keep using the plain
//! `tracing` macros while the sinks stay an explicit value.
//!
//! Key components:
//! - **Logging**: a color-coded console sink plus a truncating file sink
//! - **Console**: the per-level console line layout
//! - **Capture**: an in-memory sink for asserting on log output in tests

pub mod capture;
pub mod console;
pub mod logging;
