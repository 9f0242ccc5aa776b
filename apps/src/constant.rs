//! The constant logger's loop

use std::time::Duration;

use shared::app_log_line;

use crate::sink::LineSink;

pub const LOG_INTERVAL: Duration = Duration::from_millis(50);

/// Emit `APP_LOG: <app_name>` every `interval`, forever.
pub async fn log_forever(app_name: &str, interval: Duration, sink: &dyn LineSink) {
    let line = app_log_line(app_name);
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        sink.emit(&line);
    }
}
