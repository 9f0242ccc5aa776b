//! Recent logs and platform component logs

use std::time::Duration;

use regex::bytes::Regex;
use shared::app_log_line;

use crate::context::TestContext;
use crate::error::{HarnessError, HarnessResult};
use crate::platform::cf::{AppKind, AppSpec};
use crate::platform::drains::literal;
use crate::scenarios::ScenarioScope;
use crate::testing::probe::{PollPolicy, consistently_true, eventually_true};

const RECENT_LOGS_INTERVAL: Duration = Duration::from_secs(1);
const SHORT_WINDOW: Duration = Duration::from_secs(10);
const SERVICE_LOGS_TIMEOUT: Duration = Duration::from_secs(5);

/// Run `cf logs <app> --recent` to completion and look for `pattern`.
async fn recent_logs_contain(ctx: &TestContext, app: &str, pattern: &Regex) -> HarnessResult<bool> {
    let session = ctx.cf.logs_recent(app)?;
    session.wait_for_exit(ctx.config.default_timeout).await?;
    Ok(session.say(pattern))
}

/// Two apps in one space never see each other's lines in their recent logs.
pub async fn no_crosstalk(ctx: &TestContext) -> HarnessResult<()> {
    let names = ctx.lifecycle.names();
    let app_a = names.prefixed("cfar-lats", "app-A");
    let app_b = names.prefixed("cfar-lats", "app-B");
    let specs = [
        AppSpec::new(AppKind::ConstantLogger, &app_a, &ctx.config.apps_dir),
        AppSpec::new(AppKind::ConstantLogger, &app_b, &ctx.config.apps_dir),
    ];
    ctx.lifecycle.provision_apps(&specs).await?;

    let (app_a, app_b) = (app_a.as_str(), app_b.as_str());
    let line_a = &literal(&app_log_line(app_a));
    let line_b = &literal(&app_log_line(app_b));
    let polling = ctx.default_policy().every(RECENT_LOGS_INTERVAL);

    eventually_true(&format!("{app_a} to log"), &polling, move || {
        recent_logs_contain(ctx, app_a, line_a)
    })
    .await?;
    eventually_true(&format!("{app_b} to log"), &polling, move || {
        recent_logs_contain(ctx, app_b, line_b)
    })
    .await?;

    consistently_true(&format!("{app_a} free of {app_b} lines"), &polling, move || async move {
        Ok::<_, HarnessError>(!recent_logs_contain(ctx, app_a, line_b).await?)
    })
    .await?;
    let short = PollPolicy::with_timeout(SHORT_WINDOW).every(RECENT_LOGS_INTERVAL);
    consistently_true(&format!("{app_b} free of {app_a} lines"), &short, move || async move {
        Ok::<_, HarnessError>(!recent_logs_contain(ctx, app_b, line_a).await?)
    })
    .await?;
    Ok(())
}

/// The firehose carries API component logs.
pub async fn service_logs(ctx: &TestContext, scope: &mut ScenarioScope<'_>) -> HarnessResult<()> {
    let stream = scope.track(ctx.cf.log_stream(&[])?);
    stream
        .eventually_say(&PollPolicy::with_timeout(SERVICE_LOGS_TIMEOUT), &literal("api-service-logs"))
        .await
}
