//! Drain Acceptance Harness
//!
//! Drives the `cf` CLI against a live platform to check that application logs
//! reach syslog drains, space drains and the log streaming plugins.
//!
//! ## Main Interface
//!
//! Scenarios are written against a provisioned [`TestContext`] and assert on
//! captured [`Session`] output with the polling helpers in [`probe`].
//!
//! ```rust,ignore
//! use drain_tester::*;
//!
//! let logs = scope.follow(&ctx.listener_app)?;
//! scope.inject(&ctx.log_writer_apps[0], "RANDOM-MESSAGE-A")?;
//! logs.eventually_say(&ctx.delivery_policy(), &literal("RANDOM-MESSAGE-A")).await?;
//! ```

// Core modules
pub mod context;
pub mod error;
pub mod platform;
pub mod runtime;
pub mod scenarios;
pub mod testing;

pub use testing::probe;

// Main interfaces - re-exported at crate root for convenience
pub use context::TestContext;
pub use error::{HarnessError, HarnessResult};
pub use scenarios::{ScenarioScope, TestScenarios};

// Supporting types
pub use platform::drains::literal;
pub use platform::{AppKind, AppSpec, CfCli, DrainOptions};
pub use probe::{PollPolicy, consistently, eventually};
pub use runtime::{CommandRunner, ProcessRunner, ResourceLifecycle, ScenarioRun, Session, Supervisor};
