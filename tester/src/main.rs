//! Drain Acceptance Runner
//!
//! Loads the platform configuration, checks the required CLI plugins,
//! provisions the suite's org, space and apps, runs the requested scenarios
//! and always tears the provisioned resources down again.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use shared::{NameGenerator, TestConfig, logging};
use tokio::time::timeout;

use drain_tester::context::SUITE_PREFIX;
use drain_tester::{CfCli, ProcessRunner, ResourceLifecycle, ScenarioRun, TestContext, TestScenarios};

#[derive(Parser)]
#[command(name = "drain-tester")]
#[command(about = "Acceptance tests for platform log drains")]
struct Args {
    /// Test scenario to run, or `all`
    #[arg(long, default_value = "all")]
    scenario: String,

    /// List the available scenarios and exit
    #[arg(long)]
    list: bool,

    /// Whole-suite timeout in seconds, teardown included
    #[arg(long, default_value = "3600")]
    timeout_secs: u64,

    /// Base log level (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Shorthand for --log-level debug
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.list {
        for name in TestScenarios::available_scenarios() {
            println!("{name}");
        }
        return Ok(());
    }

    let level = if args.verbose { Some("debug") } else { args.log_level.as_deref() };
    logging::init_tracing("drain-tester", level);

    let config = match TestConfig::global() {
        Ok(config) => Arc::new(config.clone()),
        Err(e) if e.is_missing() && !shared::config::must_run() => {
            tracing::warn!("⏭️ Drain acceptance suite skipped: {}", e);
            return Ok(());
        }
        Err(e) => return Err(e).context("loading acceptance configuration"),
    };

    logging::log_startup(&format!("drain acceptance suite against {}", config.api_url()));
    tracing::info!("Scenario: {}, Timeout: {}s", args.scenario, args.timeout_secs);

    let cf = CfCli::new(Arc::new(ProcessRunner::new()), Arc::clone(&config));
    cf.require_plugins().await.context("checking cf plugins")?;

    let lifecycle = Arc::new(ResourceLifecycle::new(cf, Arc::new(NameGenerator::new()), SUITE_PREFIX));
    let mut run = ScenarioRun::new(&args.scenario, Arc::clone(&lifecycle));
    let cleanup = Arc::clone(&lifecycle);
    let scenario = args.scenario.as_str();

    let suite = run.execute(TestContext::provision(config, lifecycle), |ctx| async move {
        TestScenarios::new(&ctx).run_scenario(scenario).await
    });

    match timeout(Duration::from_secs(args.timeout_secs), suite).await {
        Ok(Ok(())) => {
            tracing::info!("✅ Scenario '{}' completed successfully", scenario);
        }
        Ok(Err(e)) => {
            logging::log_error(&format!("Scenario '{scenario}'"), &e);
            return Err(e.into());
        }
        Err(_) => {
            tracing::error!("⏰ Scenario '{}' timed out after {}s", scenario, args.timeout_secs);
            let report = cleanup.teardown_all().await;
            tracing::info!(
                "🧹 Removed {} resources, {} left behind",
                report.deleted.len(),
                report.failures.len()
            );
            bail!("suite timed out after {}s", args.timeout_secs);
        }
    }

    if let Some(report) = run.teardown_report() {
        if report.is_clean() {
            tracing::info!("🧹 Removed {} resources", report.deleted.len());
        } else {
            tracing::warn!("⚠️ {} resources could not be removed", report.failures.len());
        }
    }

    tracing::info!("🏁 Drain acceptance suite completed");
    Ok(())
}
