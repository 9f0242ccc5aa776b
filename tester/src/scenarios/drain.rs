//! Single-app and shared drains

use std::time::Duration;

use shared::{ResourceHandle, scenario_info};

use crate::context::TestContext;
use crate::error::{HarnessError, HarnessResult};
use crate::platform::cf::DrainOptions;
use crate::platform::drains;
use crate::scenarios::{ScenarioScope, expect_contains};
use crate::testing::probe::{PollPolicy, consistently_true, eventually_true};

/// How long a message from an undrained app must stay away from the listener.
const CROSSTALK_WINDOW: Duration = Duration::from_secs(10);
const DRAINS_POLL_INTERVAL: Duration = Duration::from_millis(500);

fn random_messages(ctx: &TestContext) -> (String, String) {
    let names = ctx.lifecycle.names();
    (
        names.prefixed("RANDOM-MESSAGE-A", "LOG"),
        names.prefixed("RANDOM-MESSAGE-B", "LOG"),
    )
}

/// Drain the first log writer into `url` under a fresh name, recorded for teardown.
async fn named_drain(ctx: &TestContext, url: &str, use_agent: bool) -> HarnessResult<String> {
    let name = ctx.lifecycle.names().timestamped("some-drain");
    let mut options = DrainOptions::named(&name);
    if use_agent {
        options = options.with_agent();
    }
    ctx.cf.drain(&ctx.log_writer_apps[0], url, &options).await?;
    ctx.lifecycle.record_for_teardown(ResourceHandle::drain(&name));
    Ok(name)
}

/// Poll `cf drains` until its listing shows the drain row of a log writer.
async fn await_drain_listing(ctx: &TestContext, timeout: Duration) -> HarnessResult<()> {
    let listing = &drains::drain_listing();
    let policy = PollPolicy::with_timeout(timeout).every(DRAINS_POLL_INTERVAL);
    eventually_true("drain listing", &policy, move || async move {
        let session = ctx.cf.drains().await?;
        Ok::<_, HarnessError>(session.say(listing))
    })
    .await
}

/// A drained app reaches the listener; an undrained one never does.
pub async fn drain_app(ctx: &TestContext, scope: &mut ScenarioScope<'_>) -> HarnessResult<()> {
    let [writer_a, writer_b] = &ctx.log_writer_apps;
    named_drain(ctx, &ctx.listener_url(), false).await?;

    let (message_a, message_b) = random_messages(ctx);
    let logs = scope.follow(&ctx.listener_app)?;
    scope.inject(writer_a, &message_a)?;
    scope.inject(writer_b, &message_b)?;

    logs.eventually_say(&ctx.delivery_policy(), &drains::literal(&message_a)).await?;
    logs.consistently_not_say(&PollPolicy::with_timeout(CROSSTALK_WINDOW), &drains::literal(&message_b))
        .await?;
    Ok(())
}

/// `--use-agent` drains are listed with the v3 scheme and the agent flag.
pub async fn drain_app_with_agent(ctx: &TestContext) -> HarnessResult<()> {
    let address = ctx.config.app_host(&ctx.listener_app);
    let drain_name = named_drain(ctx, &format!("https://{address}"), true).await?;

    let listing = ctx.cf.drains().await?.out().text();
    expect_contains("drains", &listing, "Use Agent")?;
    let expected_url = format!("https-v3://{address}");
    match drains::find_row(&listing, &drain_name) {
        Some(row) if row.url == expected_url && row.use_agent => Ok(()),
        _ => Err(HarnessError::AssertionViolation {
            what: format!("drain {drain_name} listed with {expected_url} and agent enabled"),
            at: Duration::ZERO,
            attempts: 1,
            observed: listing,
        }),
    }
}

/// A second app bound to an existing named drain is delivered too.
pub async fn bind_drain(ctx: &TestContext, scope: &mut ScenarioScope<'_>) -> HarnessResult<()> {
    let [writer_a, writer_b] = &ctx.log_writer_apps;
    let drain_name = named_drain(ctx, &ctx.listener_url(), false).await?;
    ctx.cf.bind_drain(writer_b, &drain_name).await?;
    scenario_info!("bind_drain", "Bound {} to {}", writer_b, drain_name);

    let (message_a, message_b) = random_messages(ctx);
    let logs = scope.follow(&ctx.listener_app)?;
    scope.inject(writer_a, &message_a)?;
    scope.inject(writer_b, &message_b)?;

    let delivery = ctx.delivery_policy();
    logs.eventually_say(&delivery, &drains::literal(&message_a)).await?;
    logs.eventually_say(&delivery, &drains::literal(&message_b)).await?;
    Ok(())
}

pub async fn list_drains(ctx: &TestContext) -> HarnessResult<()> {
    named_drain(ctx, &ctx.listener_url(), false).await?;
    await_drain_listing(ctx, ctx.config.default_timeout).await
}

/// A deleted drain disappears from the listing for good.
pub async fn delete_drain(ctx: &TestContext) -> HarnessResult<()> {
    let drain_name = named_drain(ctx, &ctx.listener_url(), false).await?;
    await_drain_listing(ctx, ctx.config.default_timeout * 2).await?;

    ctx.cf.delete_drain(&drain_name).await?;
    ctx.lifecycle.forget(&ResourceHandle::drain(&drain_name));

    let name = drain_name.as_str();
    consistently_true(
        &format!("{drain_name} to stay deleted"),
        &ctx.default_policy().every(DRAINS_POLL_INTERVAL),
        move || async move {
            let listing = ctx.cf.drains().await?.out().text();
            Ok::<_, HarnessError>(drains::find_row(&listing, name).is_none())
        },
    )
    .await?;
    Ok(())
}
