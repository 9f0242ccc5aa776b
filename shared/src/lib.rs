//! Shared building blocks for the drain acceptance harness
//!
//! Configuration, error types, logging and resource naming used by the
//! `drain-tester` runner and the test apps.

pub mod config;
pub mod errors;
pub mod logging;
pub mod naming;
pub mod types;

pub use config::TestConfig;
pub use errors::*;
pub use naming::{NameGenerator, app_log_line};
pub use types::*;
