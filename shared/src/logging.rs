//! Shared logging utilities for consistent tracing across the harness

use chrono::{DateTime, Utc};
use tracing::{error, info};

/// Build the filter directive for a component at a base level.
pub fn filter_directive(component: &str, level: &str) -> String {
    let component = component.replace('-', "_");
    format!("{component}={level},shared={level},reqwest=warn,hyper=warn")
}

/// Initialize the stdout tracing subscriber for a binary.
///
/// `RUST_LOG`, when set, wins over the computed directive.
pub fn init_tracing(component: &str, log_level: Option<&str>) {
    use tracing_subscriber::{EnvFilter, fmt};

    let base_level = log_level.unwrap_or("info");
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(component, base_level)));

    // try_init: test binaries may initialize more than once
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for scenario-aware info logging
#[macro_export]
macro_rules! scenario_info {
    ($scenario:expr, $($arg:tt)*) => {
        tracing::info!(
            scenario = %$scenario,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for scenario-aware warning logging
#[macro_export]
macro_rules! scenario_warn {
    ($scenario:expr, $($arg:tt)*) => {
        tracing::warn!(
            scenario = %$scenario,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for scenario-aware error logging
#[macro_export]
macro_rules! scenario_error {
    ($scenario:expr, $($arg:tt)*) => {
        tracing::error!(
            scenario = %$scenario,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for scenario-aware debug logging
#[macro_export]
macro_rules! scenario_debug {
    ($scenario:expr, $($arg:tt)*) => {
        tracing::debug!(
            scenario = %$scenario,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for suite start
pub fn log_startup(details: &str) {
    info!(timestamp = format_timestamp(), "🚀 Starting {}", details);
}

/// Contextual logging helper for error conditions
pub fn log_error(context: &str, error: &dyn std::fmt::Display) {
    error!(
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}
