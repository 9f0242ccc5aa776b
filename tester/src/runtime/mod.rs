//! Runtime Management
//!
//! Child processes and their captured output, background traffic, and the
//! platform resources a run creates and tears down.

pub mod injector;
pub mod lifecycle;
pub mod runner;
pub mod session;
pub mod supervisor;

// Re-export main types
pub use injector::LogInjector;
pub use lifecycle::{ResourceLifecycle, ScenarioPhase, ScenarioRun, TeardownReport};
pub use runner::{CommandRunner, ProcessRunner};
pub use session::{Buffer, Session};
pub use supervisor::{CancelSignal, CancelToken, Supervisor, WorkUnit, WorkerReport};
