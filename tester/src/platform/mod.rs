//! Platform CLI wrapper and drain listing formats

pub mod cf;
pub mod drains;

pub use cf::{AppKind, AppSpec, CfCli, DrainOptions};
pub use drains::DrainRow;
