//! Suite-wide state shared by every scenario

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use shared::TestConfig;
use tracing::{info, warn};

use crate::error::HarnessResult;
use crate::platform::cf::{AppKind, AppSpec, CfCli};
use crate::runtime::lifecycle::ResourceLifecycle;
use crate::testing::probe::PollPolicy;

/// Prefix of the org and space names created by the suite.
pub const SUITE_PREFIX: &str = "CFDRAIN";

/// Extra time allowed for a message to travel through a freshly created drain.
const DELIVERY_GRACE: Duration = Duration::from_secs(3 * 60);

/// Handles to everything provisioned once for the whole suite.
pub struct TestContext {
    pub config: Arc<TestConfig>,
    pub cf: CfCli,
    pub lifecycle: Arc<ResourceLifecycle>,
    pub org: String,
    pub space: String,
    pub listener_app: String,
    pub log_writer_apps: [String; 2],
}

impl TestContext {
    /// Create the org and space, then push the listener and two log writers concurrently.
    pub async fn provision(config: Arc<TestConfig>, lifecycle: Arc<ResourceLifecycle>) -> HarnessResult<Self> {
        let (org, space) = lifecycle.provision_org_and_space().await?;

        let names = lifecycle.names();
        let listener_app = names.prefixed("SYSLOG-SERVER", "");
        let log_writer_apps = [names.prefixed("LOG-EMITTER", ""), names.prefixed("LOG-EMITTER", "")];

        let specs = [
            AppSpec::new(AppKind::DrainListener, &listener_app, &config.apps_dir),
            AppSpec::new(AppKind::LogEmitter, &log_writer_apps[0], &config.apps_dir),
            AppSpec::new(AppKind::LogEmitter, &log_writer_apps[1], &config.apps_dir),
        ];
        lifecycle.provision_apps(&specs).await?;
        info!("✅ Provisioned {}/{} with listener {}", org, space, listener_app);

        Ok(Self {
            cf: lifecycle.cf().clone(),
            config,
            lifecycle,
            org,
            space,
            listener_app,
            log_writer_apps,
        })
    }

    /// `https://<listener>.<domain>`
    pub fn listener_url(&self) -> String {
        format!("https://{}", self.config.app_host(&self.listener_app))
    }

    pub fn default_policy(&self) -> PollPolicy {
        PollPolicy::with_timeout(self.config.default_timeout)
    }

    /// Budget for a message to arrive through a drain.
    pub fn delivery_policy(&self) -> PollPolicy {
        PollPolicy::with_timeout(self.config.default_timeout + DELIVERY_GRACE)
    }

    /// Restart the listener and both log writers concurrently. Failures are only logged.
    pub async fn restart_apps(&self) {
        let apps = [&self.listener_app, &self.log_writer_apps[0], &self.log_writer_apps[1]];
        let outcomes = join_all(apps.iter().map(|app| self.cf.restart(app))).await;
        for (app, outcome) in apps.iter().zip(outcomes) {
            match outcome {
                Ok(session) if session.exit_code() == Some(0) => {}
                Ok(session) => warn!("⚠️ Restart of {} exited with {:?}", app, session.exit_code()),
                Err(e) => warn!("⚠️ Restart of {} failed: {}", app, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::runner::CommandRunner;
    use crate::testing::doubles::RecordingRunner;
    use shared::NameGenerator;

    fn config() -> Arc<TestConfig> {
        Arc::new(
            TestConfig::from_lookup(|key| match key {
                "CF_ADMIN_USER" => Some("admin".to_string()),
                "CF_ADMIN_PASSWORD" => Some("secret".to_string()),
                "CF_DOMAIN" => Some("example.com".to_string()),
                "DEFAULT_TIMEOUT" => Some("30s".to_string()),
                _ => None,
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_provision_pushes_three_apps_after_target() {
        let runner = RecordingRunner::new();
        let dyn_runner: Arc<dyn CommandRunner> = runner.clone();
        let config = config();
        let lifecycle = Arc::new(ResourceLifecycle::new(
            CfCli::new(dyn_runner, Arc::clone(&config)),
            Arc::new(NameGenerator::new()),
            SUITE_PREFIX,
        ));

        let ctx = TestContext::provision(config, Arc::clone(&lifecycle)).await.unwrap();

        let lines = runner.lines();
        assert_eq!(lines.len(), 8);
        assert!(lines[4].starts_with("target -o CFDRAIN-1-ORG-"));
        assert!(lines[5..].iter().all(|line| line.starts_with("push ")));
        assert!(ctx.listener_app.starts_with("SYSLOG-SERVER-1--"));
        assert!(ctx.log_writer_apps.iter().all(|app| app.starts_with("LOG-EMITTER-1--")));
        assert_ne!(ctx.log_writer_apps[0], ctx.log_writer_apps[1]);
        assert_eq!(ctx.listener_url(), format!("https://{}.example.com", ctx.listener_app));
        assert_eq!(ctx.delivery_policy().timeout(), Duration::from_secs(210));
        assert_eq!(lifecycle.resources().len(), 5);
    }

    #[tokio::test]
    async fn test_restart_apps_restarts_all_three() {
        let runner = RecordingRunner::new();
        runner.fail_on("restart", 1);
        let dyn_runner: Arc<dyn CommandRunner> = runner.clone();
        let config = config();
        let lifecycle = Arc::new(ResourceLifecycle::new(
            CfCli::new(dyn_runner, Arc::clone(&config)),
            Arc::new(NameGenerator::new()),
            SUITE_PREFIX,
        ));
        let ctx = TestContext::provision(config, lifecycle).await.unwrap();

        ctx.restart_apps().await;
        let restarts = runner.lines().into_iter().filter(|line| line.starts_with("restart ")).count();
        assert_eq!(restarts, 3);
    }
}
