//! Process launching abstraction
//!
//! Everything that shells out goes through [`CommandRunner`] so platform
//! operations can be exercised against a scripted double in unit tests.

use crate::error::HarnessResult;
use crate::runtime::session::Session;

/// Launches an external command and hands back its live [`Session`].
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    /// Start `command` with `args`. Returns as soon as the process is running.
    fn run(&self, command: &str, args: &[String]) -> HarnessResult<Session>;
}

/// Runs real processes on the local machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &str, args: &[String]) -> HarnessResult<Session> {
        Session::start(command, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_process_runner_starts_real_process() {
        let runner = ProcessRunner::new();
        let session = runner.run("echo", &["drain".to_string(), "ok".to_string()]).unwrap();

        assert_eq!(session.wait_for_exit(Duration::from_secs(5)).await.unwrap(), 0);
        assert_eq!(session.out().text(), "drain ok\n");
        assert_eq!(session.label(), "echo drain ok");
    }

    #[test]
    fn test_mock_runner_returns_scripted_session() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|command, args| command == "cf" && args == ["apps".to_string()])
            .times(1)
            .returning(|_, _| Ok(Session::finished("cf apps", "No apps found\n", "", 0)));

        let session = runner.run("cf", &["apps".to_string()]).unwrap();
        assert_eq!(session.exit_code(), Some(0));
        assert!(session.out().text().contains("No apps found"));
    }
}
