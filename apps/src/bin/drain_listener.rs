//! HTTPS drain target: prints every request body it receives

use std::sync::Arc;

use shared::logging;
use test_apps::{AppResult, StdoutSink, VcapApplication, env, routes, serve};

#[tokio::main]
async fn main() -> AppResult<()> {
    logging::init_tracing("drain-listener", None);

    let port = env::port()?;
    match VcapApplication::from_env() {
        Ok(vcap) => match vcap.address_line() {
            Some(line) => println!("{line}"),
            None => tracing::warn!("⚠️ {} has no route, no address to announce", vcap.application_name),
        },
        Err(e) => tracing::warn!("⚠️ {}", e),
    }

    serve(routes::listener_router(Arc::new(StdoutSink)), port).await
}
