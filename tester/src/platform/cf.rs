//! Platform operations as `cf` invocations
//!
//! [`CfCli`] turns every platform operation into an argument vector and runs it
//! through a [`CommandRunner`]. Credentials are masked in session labels so
//! they never reach logs or error messages.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use shared::TestConfig;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};
use crate::platform::drains;
use crate::runtime::runner::CommandRunner;
use crate::runtime::session::{Session, describe};
use crate::testing::probe::{PollPolicy, eventually};

const REDACTED: &str = "[PRIVATE DATA HIDDEN]";
const APP_MEMORY: &str = "64M";

/// `cf plugins` commands the suite drives, with the plugin providing each.
pub const REQUIRED_PLUGINS: [(&str, &str); 2] = [("drains", "cf-drain-cli"), ("log-stream", "log-stream-cli")];

/// Which test app a directory holds, and how it must be pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppKind {
    /// Prints `/log/<message>` requests to stdout.
    LogEmitter,
    /// Receives drained logs and prints them.
    DrainListener,
    /// Prints its own name on a fixed cadence.
    ConstantLogger,
}

impl AppKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            AppKind::LogEmitter => "log-emitter",
            AppKind::DrainListener => "drain-listener",
            AppKind::ConstantLogger => "constant-logger",
        }
    }
}

/// An app to push: name, source directory, kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSpec {
    pub name: String,
    pub path: PathBuf,
    pub kind: AppKind,
}

impl AppSpec {
    pub fn new(kind: AppKind, name: impl Into<String>, apps_dir: &Path) -> Self {
        Self {
            name: name.into(),
            path: apps_dir.join(kind.dir_name()),
            kind,
        }
    }

    /// Arguments of the `push` call for this app.
    pub fn push_args(&self) -> Vec<String> {
        let path = self.path.display().to_string();
        let mut args = vec!["push".to_string(), self.name.clone()];
        if self.kind == AppKind::DrainListener {
            args.extend(["--health-check-type".to_string(), "port".to_string()]);
        }
        args.extend(["-p".to_string(), path, "-m".to_string(), APP_MEMORY.to_string()]);
        if self.kind == AppKind::DrainListener {
            let manifest = self.path.join("manifest.yml");
            args.extend(["-f".to_string(), manifest.display().to_string()]);
        }
        args
    }
}

/// Optional flags of `cf drain`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainOptions {
    pub name: Option<String>,
    pub drain_type: Option<String>,
    pub use_agent: bool,
}

impl DrainOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_agent(mut self) -> Self {
        self.use_agent = true;
        self
    }
}

fn to_args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

/// `cf` front-end bound to one configuration.
#[derive(Clone)]
pub struct CfCli {
    runner: Arc<dyn CommandRunner>,
    config: Arc<TestConfig>,
}

impl CfCli {
    pub fn new(runner: Arc<dyn CommandRunner>, config: Arc<TestConfig>) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    pub fn default_policy(&self) -> PollPolicy {
        PollPolicy::with_timeout(self.config.default_timeout)
    }

    /// Start `cf <args>` and return immediately.
    pub fn start(&self, args: &[String]) -> HarnessResult<Session> {
        let label = self.redact(&describe(&self.config.cf_binary, args));
        debug!("$ {}", label);
        let session = self.runner.run(&self.config.cf_binary, args)?;
        Ok(session.relabel(label))
    }

    /// Run `cf <args>` and require exit 0 within `timeout`.
    pub async fn run_ok(&self, timeout: Duration, args: &[String]) -> HarnessResult<Session> {
        let session = self.start(args)?;
        session.expect_exit(timeout, 0).await?;
        Ok(session)
    }

    /// [`run_ok`](Self::run_ok) under the default timeout.
    pub async fn run(&self, args: &[String]) -> HarnessResult<Session> {
        self.run_ok(self.config.default_timeout, args).await
    }

    /// Run `cf <args>` to completion within the default timeout, whatever the exit code.
    pub async fn completed(&self, args: &[String]) -> HarnessResult<Session> {
        let session = self.start(args)?;
        session.wait_for_exit(self.config.default_timeout).await?;
        Ok(session)
    }

    fn redact(&self, line: &str) -> String {
        if self.config.admin_password.is_empty() {
            line.to_string()
        } else {
            line.replace(&self.config.admin_password, REDACTED)
        }
    }

    pub fn api_args(&self) -> Vec<String> {
        let mut args = vec!["api".to_string(), self.config.api_url()];
        if self.config.skip_cert_verify {
            args.push("--skip-ssl-validation".to_string());
        }
        args
    }

    pub async fn api(&self) -> HarnessResult<()> {
        self.run(&self.api_args()).await.map(drop)
    }

    pub async fn auth(&self) -> HarnessResult<()> {
        let args = to_args(&["auth", &self.config.admin_user, &self.config.admin_password]);
        self.run(&args).await.map(drop)
    }

    pub async fn create_org(&self, org: &str) -> HarnessResult<()> {
        self.run(&to_args(&["create-org", org])).await.map(drop)
    }

    pub async fn create_space(&self, org: &str, space: &str) -> HarnessResult<()> {
        self.run(&to_args(&["create-space", space, "-o", org])).await.map(drop)
    }

    pub async fn target(&self, org: &str, space: &str) -> HarnessResult<()> {
        self.run(&to_args(&["target", "-o", org, "-s", space])).await.map(drop)
    }

    pub async fn push(&self, app: &AppSpec) -> HarnessResult<()> {
        self.run_ok(self.config.app_push_timeout, &app.push_args()).await.map(drop)
    }

    pub async fn restart(&self, app: &str) -> HarnessResult<Session> {
        self.completed(&to_args(&["restart", app])).await
    }

    pub async fn plugins(&self) -> HarnessResult<Session> {
        self.completed(&to_args(&["plugins"])).await
    }

    /// Fail unless every plugin in [`REQUIRED_PLUGINS`] is installed.
    pub async fn require_plugins(&self) -> HarnessResult<()> {
        let listing = self.plugins().await?.out().text();
        match REQUIRED_PLUGINS.iter().find(|(command, _)| !listing.contains(command)) {
            Some((_, plugin)) => Err(HarnessError::MissingPlugin {
                plugin: plugin.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// `cf drains`, waited for but not required to succeed.
    pub async fn drains(&self) -> HarnessResult<Session> {
        self.completed(&to_args(&["drains"])).await
    }

    pub fn drain_args(app: &str, url: &str, options: &DrainOptions) -> Vec<String> {
        let mut args = to_args(&["drain", app, url]);
        if let Some(name) = &options.name {
            args.extend(["--drain-name".to_string(), name.clone()]);
        }
        if let Some(drain_type) = &options.drain_type {
            args.extend(["--type".to_string(), drain_type.clone()]);
        }
        if options.use_agent {
            args.push("--use-agent".to_string());
        }
        args
    }

    pub async fn drain(&self, app: &str, url: &str, options: &DrainOptions) -> HarnessResult<()> {
        self.run(&Self::drain_args(app, url, options)).await.map(drop)
    }

    pub async fn bind_drain(&self, app: &str, drain: &str) -> HarnessResult<()> {
        self.run(&to_args(&["bind-drain", app, drain])).await.map(drop)
    }

    pub fn drain_space_args(url: &str, name: &str, path: &Path) -> Vec<String> {
        let path = path.display().to_string();
        to_args(&["drain-space", url, "--drain-name", name, "--path", &path])
    }

    /// Start `drain-space` without judging its outcome.
    pub fn start_drain_space(&self, url: &str, name: &str, path: &Path) -> HarnessResult<Session> {
        self.start(&Self::drain_space_args(url, name, path))
    }

    pub async fn drain_space(&self, url: &str, name: &str, path: &Path) -> HarnessResult<()> {
        self.run(&Self::drain_space_args(url, name, path)).await.map(drop)
    }

    pub async fn delete_drain(&self, name: &str) -> HarnessResult<()> {
        self.run(&to_args(&["delete-drain", name, "--force"])).await.map(drop)
    }

    pub async fn delete_drain_space(&self, name: &str) -> HarnessResult<()> {
        self.run(&to_args(&["delete-drain-space", name, "--force"])).await.map(drop)
    }

    pub async fn delete_app(&self, name: &str) -> HarnessResult<()> {
        self.run(&to_args(&["delete", name, "-r", "-f"])).await.map(drop)
    }

    pub async fn delete_space(&self, name: &str) -> HarnessResult<()> {
        self.run(&to_args(&["delete-space", name, "-f"])).await.map(drop)
    }

    pub async fn delete_org(&self, name: &str) -> HarnessResult<()> {
        self.run(&to_args(&["delete-org", name, "-f"])).await.map(drop)
    }

    /// `cf logs <app> --recent`, started but not awaited.
    pub fn logs_recent(&self, app: &str) -> HarnessResult<Session> {
        self.start(&to_args(&["logs", app, "--recent"]))
    }

    /// `cf logs <app>`, streaming until killed.
    pub fn logs_follow(&self, app: &str) -> HarnessResult<Session> {
        self.start(&to_args(&["logs", app]))
    }

    /// `cf log-stream [filters]`, streaming until killed.
    pub fn log_stream(&self, filters: &[String]) -> HarnessResult<Session> {
        let mut args = vec!["log-stream".to_string()];
        args.extend_from_slice(filters);
        self.start(&args)
    }

    /// Poll the recent logs of `app` until the listener prints its address.
    pub async fn extract_drain_address(&self, app: &str) -> HarnessResult<String> {
        let timeout = self.config.default_timeout;
        let address = eventually(
            &format!("drain address of {app}"),
            &self.default_policy(),
            move || async move {
                let logs = self.logs_recent(app)?;
                logs.wait_for_exit(timeout).await?;
                Ok::<_, HarnessError>(drains::extract_address(&logs.contents()))
            },
            Option::is_some,
        )
        .await?;
        Ok(address.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::doubles::RecordingRunner;
    use assert_matches::assert_matches;

    fn config(skip_cert_verify: bool) -> Arc<TestConfig> {
        Arc::new(
            TestConfig::from_lookup(|key| match key {
                "CF_ADMIN_USER" => Some("admin".to_string()),
                "CF_ADMIN_PASSWORD" => Some("hunter2".to_string()),
                "CF_DOMAIN" => Some("example.com".to_string()),
                "SKIP_CERT_VERIFY" => Some(skip_cert_verify.to_string()),
                "APPS_DIR" => Some("/opt/apps".to_string()),
                _ => None,
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_api_args_honor_skip_ssl_validation() {
        let runner = RecordingRunner::new();
        let secure = CfCli::new(runner.clone(), config(false));
        let insecure = CfCli::new(runner, config(true));

        assert_eq!(secure.api_args(), vec!["api", "https://api.example.com"]);
        assert_eq!(
            insecure.api_args(),
            vec!["api", "https://api.example.com", "--skip-ssl-validation"]
        );
    }

    #[test]
    fn test_push_args_per_app_kind() {
        let apps_dir = Path::new("/opt/apps");

        let emitter = AppSpec::new(AppKind::LogEmitter, "LOG-EMITTER-1--abc", apps_dir);
        assert_eq!(
            emitter.push_args(),
            vec!["push", "LOG-EMITTER-1--abc", "-p", "/opt/apps/log-emitter", "-m", "64M"]
        );

        let listener = AppSpec::new(AppKind::DrainListener, "SYSLOG-SERVER-1--abc", apps_dir);
        assert_eq!(
            listener.push_args(),
            vec![
                "push",
                "SYSLOG-SERVER-1--abc",
                "--health-check-type",
                "port",
                "-p",
                "/opt/apps/drain-listener",
                "-m",
                "64M",
                "-f",
                "/opt/apps/drain-listener/manifest.yml",
            ]
        );
    }

    #[test]
    fn test_drain_args() {
        assert_eq!(
            CfCli::drain_args("app", "https://l.example.com", &DrainOptions::default()),
            vec!["drain", "app", "https://l.example.com"]
        );
        assert_eq!(
            CfCli::drain_args("app", "https://l.example.com", &DrainOptions::named("d1").with_agent()),
            vec!["drain", "app", "https://l.example.com", "--drain-name", "d1", "--use-agent"]
        );
        assert_eq!(
            CfCli::drain_space_args("https://l", "sd", Path::new("/bin/space_drain")),
            vec!["drain-space", "https://l", "--drain-name", "sd", "--path", "/bin/space_drain"]
        );
    }

    #[tokio::test]
    async fn test_auth_label_hides_password() {
        let runner = RecordingRunner::new();
        let cf = CfCli::new(runner.clone(), config(false));
        runner.fail_on("auth", 1);

        let err = cf.auth().await.unwrap_err();
        assert_matches!(&err, HarnessError::CommandFailed { command, code: 1, .. } if command == "cf auth admin [PRIVATE DATA HIDDEN]");
        assert!(!err.to_string().contains("hunter2"));
        assert_eq!(runner.lines(), vec!["auth admin hunter2"]);
    }

    #[tokio::test]
    async fn test_require_plugins() {
        let runner = RecordingRunner::new();
        let cf = CfCli::new(runner.clone(), config(false));

        runner.respond("plugins", "plugin   version   command name\ndrains   1.0.0     drains\n");
        assert_matches!(
            cf.require_plugins().await,
            Err(HarnessError::MissingPlugin { plugin }) if plugin == "log-stream-cli"
        );

        runner.respond("plugins", "drains   1.0.0   drains\nlog-stream   0.7.0   log-stream\n");
        assert!(cf.require_plugins().await.is_ok());
    }

    #[tokio::test]
    async fn test_drains_tolerates_non_zero_exit() {
        let runner = RecordingRunner::new();
        runner.fail_on("drains", 1);
        let cf = CfCli::new(runner, config(false));

        let session = cf.drains().await.unwrap();
        assert_eq!(session.exit_code(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_extract_drain_address_from_recent_logs() {
        let runner = RecordingRunner::new();
        runner.respond(
            "logs SYSLOG-SERVER-1--abc --recent",
            "Retrieving logs...\n   OUT ADDRESS: |https://listener.example.com|\n",
        );
        let cf = CfCli::new(runner.clone(), config(false));

        let address = cf.extract_drain_address("SYSLOG-SERVER-1--abc").await.unwrap();
        assert_eq!(address, "https://listener.example.com");
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extract_drain_address_times_out() {
        let runner = RecordingRunner::new();
        let cf = CfCli::new(runner.clone(), config(false));

        let result = cf.extract_drain_address("quiet-app").await;
        assert_matches!(result, Err(HarnessError::Timeout { last_observed: Some(last), .. }) if last == "None");
        // one evaluation per 100ms over the 60s default, plus the deadline
        assert_eq!(runner.calls().len(), 601);
    }
}
