//! Prints whatever arrives on `GET /log/<message>`

use std::sync::Arc;

use shared::logging;
use test_apps::{AppResult, StdoutSink, env, routes, serve};

#[tokio::main]
async fn main() -> AppResult<()> {
    logging::init_tracing("log-emitter", None);
    serve(routes::emitter_router(Arc::new(StdoutSink)), env::port()?).await
}
