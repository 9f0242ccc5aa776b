//! Test Scenarios
//!
//! Every scenario receives the suite's [`TestContext`] and a fresh
//! [`ScenarioScope`] that owns the injectors and streaming sessions it starts.

pub mod drain;
pub mod log_stream;
pub mod recent_logs;
pub mod space_drain;

use std::sync::Arc;
use std::time::Duration;

use shared::{scenario_error, scenario_info, scenario_warn};
use tokio::time::Instant;

use crate::context::TestContext;
use crate::error::{HarnessError, HarnessResult};
use crate::runtime::injector::{INJECTION_INTERVAL, LogInjector};
use crate::runtime::session::Session;
use crate::runtime::supervisor::Supervisor;

/// Background traffic and log sessions of one scenario, released by [`finish`](Self::finish).
pub struct ScenarioScope<'a> {
    ctx: &'a TestContext,
    supervisor: Supervisor,
    sessions: Vec<Arc<Session>>,
}

impl<'a> ScenarioScope<'a> {
    pub fn new(ctx: &'a TestContext) -> Self {
        Self {
            ctx,
            supervisor: Supervisor::new(),
            sessions: Vec::new(),
        }
    }

    /// Keep asking `app` to log `message` until the scope finishes.
    pub fn inject(&mut self, app: &str, message: &str) -> HarnessResult<()> {
        let injector = LogInjector::new(&self.ctx.config, app, message)?;
        self.supervisor.spawn(format!("inject {message} into {app}"), INJECTION_INTERVAL, injector);
        Ok(())
    }

    /// Track a streaming session so it is killed when the scope finishes.
    pub fn track(&mut self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.sessions.push(Arc::clone(&session));
        session
    }

    /// `cf logs <app>` streaming for the rest of the scenario.
    pub fn follow(&mut self, app: &str) -> HarnessResult<Arc<Session>> {
        let session = self.ctx.cf.logs_follow(app)?;
        Ok(self.track(session))
    }

    /// Stop traffic, kill sessions and optionally restart the suite's apps.
    pub async fn finish(mut self, restart_apps: bool) {
        for report in self.supervisor.shutdown().await {
            scenario_warn!("injection", "{} iteration {} failed: {}", report.worker, report.iteration, report.error);
        }
        for session in self.sessions.drain(..) {
            session.kill();
        }
        if restart_apps {
            self.ctx.restart_apps().await;
        }
    }
}

/// Single-shot containment check with a readable failure.
pub fn expect_contains(what: &str, haystack: &str, needle: &str) -> HarnessResult<()> {
    if haystack.contains(needle) {
        Ok(())
    } else {
        Err(HarnessError::AssertionViolation {
            what: format!("{what} to contain '{needle}'"),
            at: Duration::ZERO,
            attempts: 1,
            observed: haystack.to_string(),
        })
    }
}

pub struct TestScenarios<'a> {
    ctx: &'a TestContext,
}

impl<'a> TestScenarios<'a> {
    pub fn new(ctx: &'a TestContext) -> Self {
        Self { ctx }
    }

    /// Run one scenario by name, or `all` of them.
    pub async fn run_scenario(&self, name: &str) -> HarnessResult<()> {
        if name == "all" {
            return self.run_all().await;
        }
        if !Self::available_scenarios().contains(&name) {
            return Err(Self::unknown(name));
        }

        scenario_info!(name, "🧪 Starting");
        let started = Instant::now();
        let mut scope = ScenarioScope::new(self.ctx);
        let ctx = self.ctx;

        let result = match name {
            // Single-app and shared drains
            "drain_app" => drain::drain_app(ctx, &mut scope).await,
            "drain_app_with_agent" => drain::drain_app_with_agent(ctx).await,
            "bind_drain" => drain::bind_drain(ctx, &mut scope).await,
            "list_drains" => drain::list_drains(ctx).await,
            "delete_drain" => drain::delete_drain(ctx).await,

            // Space drains
            "drain_space" => space_drain::drain_space(ctx, &mut scope).await,
            "delete_space_drain" => space_drain::delete_space_drain(ctx).await,
            "duplicate_space_drain" => space_drain::duplicate_space_drain(ctx, &mut scope).await,
            "space_drain_no_loop" => space_drain::space_drain_no_loop(ctx).await,

            // Streaming and recent logs
            "log_stream" => log_stream::log_stream(ctx, &mut scope).await,
            "recent_logs_no_crosstalk" => recent_logs::no_crosstalk(ctx).await,
            "service_logs" => recent_logs::service_logs(ctx, &mut scope).await,

            _ => Err(Self::unknown(name)),
        };

        scope.finish(Self::restarts_apps(name)).await;

        match &result {
            Ok(()) => scenario_info!(name, "✅ Passed in {:?}", started.elapsed()),
            Err(e) => scenario_error!(name, "❌ Failed after {:?}: {}", started.elapsed(), e),
        }
        result
    }

    /// Run every scenario, continuing past failures.
    async fn run_all(&self) -> HarnessResult<()> {
        tracing::info!("🧪 Running full drain acceptance suite");
        let mut failed = Vec::new();
        for name in Self::available_scenarios() {
            if let Err(e) = Box::pin(self.run_scenario(name)).await {
                failed.push(format!("{name}: {e}"));
            }
        }

        if failed.is_empty() {
            tracing::info!("🏆 All scenarios passed");
            Ok(())
        } else {
            Err(HarnessError::ScenariosFailed { failures: failed })
        }
    }

    fn unknown(name: &str) -> HarnessError {
        HarnessError::UnknownScenario {
            name: name.to_string(),
            available: Self::available_scenarios().join(", "),
        }
    }

    /// Whether the suite's apps are restarted once `name` finishes.
    fn restarts_apps(name: &str) -> bool {
        !matches!(name, "log_stream" | "recent_logs_no_crosstalk" | "service_logs")
    }

    pub fn available_scenarios() -> Vec<&'static str> {
        vec![
            "drain_app",
            "drain_app_with_agent",
            "bind_drain",
            "drain_space",
            "delete_space_drain",
            "list_drains",
            "delete_drain",
            "duplicate_space_drain",
            "space_drain_no_loop",
            "log_stream",
            "recent_logs_no_crosstalk",
            "service_logs",
        ]
    }
}
