//! Space-wide drains
//!
//! These need a built `space_drain` binary; without `SPACE_DRAIN_PATH` they are
//! skipped with a warning.

use std::path::Path;
use std::time::Duration;

use shared::{ResourceHandle, scenario_warn};

use crate::context::TestContext;
use crate::error::{HarnessError, HarnessResult};
use crate::platform::cf::{CfCli, DrainOptions};
use crate::platform::drains;
use crate::scenarios::ScenarioScope;
use crate::testing::probe::{consistently, eventually};

/// Budget for `drain-space`, which pushes an app of its own.
const DRAIN_SPACE_TIMEOUT: Duration = Duration::from_secs(60);
const DRAINS_POLL_INTERVAL: Duration = Duration::from_millis(500);

fn space_drain_path<'a>(ctx: &'a TestContext, scenario: &str) -> Option<&'a Path> {
    let path = ctx.config.space_drain_path.as_deref();
    if path.is_none() {
        scenario_warn!(scenario, "⏭️ Skipped: SPACE_DRAIN_PATH is not set");
    }
    path
}

async fn create_space_drain(ctx: &TestContext, url: &str, name: &str, path: &Path) -> HarnessResult<()> {
    let args = CfCli::drain_space_args(url, name, path);
    ctx.cf.run_ok(DRAIN_SPACE_TIMEOUT, &args).await?;
    ctx.lifecycle.record_for_teardown(ResourceHandle::space_drain(name));
    Ok(())
}

/// Stdout and stderr of one `cf drains` run.
async fn drains_output(ctx: &TestContext) -> HarnessResult<String> {
    Ok(ctx.cf.drains().await?.combined_text())
}

/// Every app in the space reaches the listener, and the space-drain app itself is not drained.
pub async fn drain_space(ctx: &TestContext, scope: &mut ScenarioScope<'_>) -> HarnessResult<()> {
    let Some(path) = space_drain_path(ctx, "drain_space") else {
        return Ok(());
    };
    let drain_name = ctx.lifecycle.names().timestamped("some-drain");
    create_space_drain(ctx, &ctx.listener_url(), &drain_name, path).await?;

    let names = ctx.lifecycle.names();
    let message_a = names.prefixed("RANDOM-MESSAGE-A", "LOG");
    let message_b = names.prefixed("RANDOM-MESSAGE-B", "LOG");
    let logs = scope.follow(&ctx.listener_app)?;
    scope.inject(&ctx.log_writer_apps[0], &message_a)?;
    scope.inject(&ctx.log_writer_apps[1], &message_b)?;

    let delivery = ctx.delivery_policy();
    logs.eventually_say(&delivery, &drains::literal(&message_a)).await?;
    logs.eventually_say(&delivery, &drains::literal(&message_b)).await?;

    let drain_name = drain_name.as_str();
    consistently(
        &format!("no drain rows for space-drain app {drain_name}"),
        &ctx.default_policy().every(DRAINS_POLL_INTERVAL),
        move || async move {
            let output = drains_output(ctx).await?;
            Ok::<_, HarnessError>(drains::rows_for_app(&output, drain_name).join("\n"))
        },
        String::is_empty,
    )
    .await?;
    Ok(())
}

/// Deleting a space drain leaves single-app drains alone.
pub async fn delete_space_drain(ctx: &TestContext) -> HarnessResult<()> {
    let Some(path) = space_drain_path(ctx, "delete_space_drain") else {
        return Ok(());
    };
    let names = ctx.lifecycle.names();
    let drain_name = names.timestamped("some-drain");
    let single_name = names.timestamped("single-some-drain");
    let url = ctx.listener_url();

    create_space_drain(ctx, &url, &drain_name, path).await?;
    ctx.cf
        .drain(&ctx.log_writer_apps[0], &url, &DrainOptions::named(&single_name))
        .await?;
    ctx.lifecycle.record_for_teardown(ResourceHandle::drain(&single_name));

    let (drain, single) = (drain_name.as_str(), single_name.as_str());
    let listing_policy = ctx.delivery_policy().every(DRAINS_POLL_INTERVAL);
    eventually(
        "both drains listed",
        &listing_policy,
        move || drains_output(ctx),
        |output| output.contains(drain) && output.contains(single),
    )
    .await?;

    ctx.cf.delete_drain_space(drain).await?;
    ctx.lifecycle.forget(&ResourceHandle::space_drain(drain));

    eventually(
        &format!("{drain} to disappear"),
        &listing_policy,
        move || drains_output(ctx),
        |output| !output.contains(drain),
    )
    .await?;
    consistently(
        &format!("{single} to remain"),
        &ctx.default_policy().every(DRAINS_POLL_INTERVAL),
        move || drains_output(ctx),
        |output| output.contains(single),
    )
    .await?;
    Ok(())
}

/// A second space drain with a taken name is refused.
pub async fn duplicate_space_drain(ctx: &TestContext, scope: &mut ScenarioScope<'_>) -> HarnessResult<()> {
    let Some(path) = space_drain_path(ctx, "duplicate_space_drain") else {
        return Ok(());
    };
    let drain_name = ctx.lifecycle.names().timestamped("some-drain");
    let url = ctx.listener_url();
    create_space_drain(ctx, &url, &drain_name, path).await?;

    let second = scope.track(ctx.cf.start_drain_space(&url, &drain_name, path)?);
    second
        .eventually_say(&ctx.default_policy(), &drains::literal(drains::DUPLICATE_DRAIN_MESSAGE))
        .await
}

/// Space-drain apps are never drained into other space drains.
pub async fn space_drain_no_loop(ctx: &TestContext) -> HarnessResult<()> {
    let Some(path) = space_drain_path(ctx, "space_drain_no_loop") else {
        return Ok(());
    };
    let names = ctx.lifecycle.names();
    let papertrail = names.timestamped("papertrail");
    let splunk = names.timestamped("splunk");

    create_space_drain(ctx, "syslog://space-drain-1.papertrail.com", &papertrail, path).await?;
    create_space_drain(ctx, "syslog://space-drain-2.splunk.com", &splunk, path).await?;

    let papertrail = papertrail.as_str();
    eventually(
        &format!("no drain rows for space-drain app {papertrail}"),
        &ctx.delivery_policy().every(DRAINS_POLL_INTERVAL),
        move || async move {
            let output = drains_output(ctx).await?;
            Ok::<_, HarnessError>(drains::rows_for_app(&output, papertrail).join("\n"))
        },
        String::is_empty,
    )
    .await?;
    Ok(())
}
