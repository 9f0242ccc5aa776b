//! `cf log-stream` filtering
//!
//! One table of cases: the filter arguments, an optional message to inject,
//! output that must never appear and output that must eventually appear.

use std::time::Duration;

use shared::scenario_info;

use crate::context::TestContext;
use crate::error::HarnessResult;
use crate::platform::drains::literal;
use crate::scenarios::ScenarioScope;
use crate::testing::probe::PollPolicy;

/// Extra window for negative checks on the firehose.
const ABSENCE_GRACE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStreamCase {
    pub name: &'static str,
    pub filters: Vec<String>,
    /// Message injected into the first log writer for the duration of the case.
    pub inject: Option<String>,
    pub forbidden: Vec<String>,
    /// Checked in order; each match moves the read cursor forward.
    pub expected: Vec<String>,
}

/// The cases exercised against the first log writer.
pub fn cases(writer_app: &str, message_all: &str, message_by_app: &str) -> Vec<LogStreamCase> {
    vec![
        LogStreamCase {
            name: "prints logs",
            filters: vec![],
            inject: Some(message_all.to_string()),
            forbidden: vec![],
            expected: vec![message_all.to_string()],
        },
        LogStreamCase {
            name: "prints logs by app name",
            filters: vec![writer_app.to_string()],
            inject: Some(message_by_app.to_string()),
            forbidden: vec![],
            expected: vec![message_by_app.to_string()],
        },
        LogStreamCase {
            name: "filters on source id",
            filters: vec!["doppler".to_string()],
            inject: None,
            forbidden: vec![r#""source_id":"gorouter""#.to_string()],
            expected: vec![r#""source_id":"doppler""#.to_string()],
        },
        LogStreamCase {
            name: "filters on metric type",
            filters: ["--type", "gauge", "-t", "counter"].map(String::from).to_vec(),
            inject: None,
            forbidden: vec![r#""log":"#.to_string()],
            expected: vec![r#""gauge":"#.to_string(), r#""counter":"#.to_string()],
        },
    ]
}

async fn run_case(ctx: &TestContext, scope: &mut ScenarioScope<'_>, case: &LogStreamCase) -> HarnessResult<()> {
    scenario_info!("log_stream", "▶️ {}", case.name);
    let writer = &ctx.log_writer_apps[0];
    let restarted = ctx.cf.restart(writer).await?;
    scenario_info!("log_stream", "Restarted {} ({:?})", writer, restarted.exit_code());

    if let Some(message) = &case.inject {
        scope.inject(writer, message)?;
    }
    let stream = scope.track(ctx.cf.log_stream(&case.filters)?);

    let absence = PollPolicy::with_timeout(ctx.config.default_timeout + ABSENCE_GRACE);
    for forbidden in &case.forbidden {
        stream.consistently_not_say(&absence, &literal(forbidden)).await?;
    }
    let delivery = ctx.delivery_policy();
    for expected in &case.expected {
        stream.eventually_say(&delivery, &literal(expected)).await?;
    }
    stream.kill();
    Ok(())
}

pub async fn log_stream(ctx: &TestContext, scope: &mut ScenarioScope<'_>) -> HarnessResult<()> {
    let names = ctx.lifecycle.names();
    let message_all = names.prefixed("RANDOM-MESSAGE-A", "LOG");
    let message_by_app = names.prefixed("RANDOM-MESSAGE-B", "LOG");

    for case in cases(&ctx.log_writer_apps[0], &message_all, &message_by_app) {
        run_case(ctx, scope, &case).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cases_cover_every_filter_shape() {
        let cases = cases("LOG-EMITTER-1--abc", "MSG-A", "MSG-B");
        assert_eq!(cases.len(), 4);

        assert!(cases[0].filters.is_empty());
        assert_eq!(cases[0].inject.as_deref(), Some("MSG-A"));
        assert_eq!(cases[1].filters, vec!["LOG-EMITTER-1--abc"]);
        assert_eq!(cases[2].forbidden, vec![r#""source_id":"gorouter""#]);
        assert_eq!(cases[3].filters, vec!["--type", "gauge", "-t", "counter"]);
        assert_eq!(cases[3].expected.len(), 2);
        assert!(cases[2..].iter().all(|case| case.inject.is_none()));
    }
}
