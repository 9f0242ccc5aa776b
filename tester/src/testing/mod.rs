//! Testing Framework
//!
//! Polling assertions over asynchronous observations, plus test doubles for
//! the command boundary.

pub mod probe;

pub use probe::{PollPolicy, consistently, consistently_true, eventually, eventually_true};
