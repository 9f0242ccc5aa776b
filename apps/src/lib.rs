//! Apps pushed to the platform by the drain acceptance suite
//!
//! Each binary writes its payload lines to stdout, where the platform picks
//! them up as application logs.

pub mod constant;
pub mod env;
pub mod error;
pub mod routes;
pub mod sink;

pub use env::VcapApplication;
pub use error::{AppError, AppResult};
pub use sink::{LineSink, StdoutSink};

use std::net::SocketAddr;

use axum::Router;

/// Serve `router` on all interfaces until the process is stopped.
pub async fn serve(router: Router, port: u16) -> AppResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("🌐 Listening on {}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}
