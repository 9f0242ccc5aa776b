//! Logs its own application name every 50 ms

use shared::logging;
use test_apps::constant::{LOG_INTERVAL, log_forever};
use test_apps::{AppResult, StdoutSink, VcapApplication};

#[tokio::main]
async fn main() -> AppResult<()> {
    logging::init_tracing("constant-logger", None);

    let vcap = VcapApplication::from_env()?;
    tracing::info!("🚀 Logging as {}", vcap.application_name);
    log_forever(&vcap.application_name, LOG_INTERVAL, &StdoutSink).await;
    Ok(())
}
