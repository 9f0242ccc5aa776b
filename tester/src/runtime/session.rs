//! Output Stream Capture
//!
//! A [`Session`] owns a running external process. Reader tasks drain its stdout
//! and stderr into growing [`Buffer`]s while the caller keeps going; a waiter
//! task owns the child handle, applies termination requests and publishes the
//! exit code exactly once.

use std::convert::Infallible;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex::bytes::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{HarnessError, HarnessResult};
use crate::testing::probe::{PollPolicy, consistently, eventually_true};

/// Exit code reported for a process terminated by a signal.
pub const SIGNALED_EXIT_CODE: i32 = -1;

/// Time allowed for the readers to drain the pipes once the process has exited.
const READER_DRAIN_GRACE: Duration = Duration::from_secs(1);
const READ_CHUNK: usize = 8 * 1024;
const DIAGNOSTIC_TAIL: usize = 2 * 1024;

#[derive(Debug, Default)]
struct BufferState {
    data: Vec<u8>,
    cursor: usize,
    closed: bool,
}

/// Append-only capture of one output stream.
///
/// Single writer (the reader task), many readers. Every read is a snapshot, so
/// callers must expect the buffer to have grown by the time they look again.
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    state: Arc<Mutex<BufferState>>,
}

impl Buffer {
    fn with_contents(data: impl Into<Vec<u8>>) -> Self {
        let buffer = Self::default();
        buffer.append(&data.into());
        buffer.close();
        buffer
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BufferState> {
        // a poisoned buffer still holds valid bytes
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn append(&self, bytes: &[u8]) {
        self.lock().data.extend_from_slice(bytes);
    }

    fn close(&self) {
        self.lock().closed = true;
    }

    /// Everything captured so far.
    pub fn contents(&self) -> Vec<u8> {
        self.lock().data.clone()
    }

    /// Lossy UTF-8 view of [`contents`](Self::contents).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.lock().data).into_owned()
    }

    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the stream has reached end-of-file.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Search the unread part of the buffer; on a match the read cursor moves
    /// past it, so consecutive calls assert ordered output.
    pub fn say(&self, pattern: &Regex) -> bool {
        let mut state = self.lock();
        let cursor = state.cursor;
        match pattern.find(&state.data[cursor..]) {
            Some(found) => {
                state.cursor = cursor + found.end();
                true
            }
            None => false,
        }
    }

    fn tail(&self, max: usize) -> String {
        let state = self.lock();
        let start = state.data.len().saturating_sub(max);
        String::from_utf8_lossy(&state.data[start..]).into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Terminate,
    Kill,
}

/// Live handle to an external process and its captured output.
///
/// Dropping a session kills the process if it is still running.
#[derive(Debug)]
pub struct Session {
    label: String,
    pid: Option<u32>,
    out: Buffer,
    err: Buffer,
    exit_rx: watch::Receiver<Option<i32>>,
    termination_tx: watch::Sender<Option<Termination>>,
}

impl Session {
    /// Launch `command` with `args` and start capturing its output.
    ///
    /// Must be called from within a Tokio runtime. A process that cannot be
    /// spawned is reported as [`HarnessError::LaunchFailure`].
    pub fn start(command: &str, args: &[String]) -> HarnessResult<Self> {
        let label = describe(command, args);

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HarnessError::LaunchFailure {
                command: label.clone(),
                source,
            })?;

        let pid = child.id();
        let out = Buffer::default();
        let err = Buffer::default();
        let readers = [
            spawn_reader(child.stdout.take(), out.clone()),
            spawn_reader(child.stderr.take(), err.clone()),
        ];

        let (exit_tx, exit_rx) = watch::channel(None);
        let (termination_tx, termination_rx) = watch::channel(None);
        tokio::spawn(supervise(child, termination_rx, readers, exit_tx, label.clone()));

        tracing::debug!("▶️ Started '{}' (pid {:?})", label, pid);

        Ok(Self {
            label,
            pid,
            out,
            err,
            exit_rx,
            termination_tx,
        })
    }

    /// A session for a process that has already exited with the given output.
    pub fn finished(label: impl Into<String>, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>, code: i32) -> Self {
        let (_, exit_rx) = watch::channel(Some(code));
        let (termination_tx, _) = watch::channel(None);
        Self {
            label: label.into(),
            pid: None,
            out: Buffer::with_contents(stdout),
            err: Buffer::with_contents(stderr),
            exit_rx,
            termination_tx,
        }
    }

    /// Replace the label used in logs and errors (e.g. to hide credentials).
    pub fn relabel(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn out(&self) -> &Buffer {
        &self.out
    }

    pub fn err(&self) -> &Buffer {
        &self.err
    }

    /// Snapshot of stdout captured so far.
    pub fn contents(&self) -> Vec<u8> {
        self.out.contents()
    }

    /// Snapshot of stderr captured so far.
    pub fn err_contents(&self) -> Vec<u8> {
        self.err.contents()
    }

    /// Stdout followed by stderr, lossily decoded.
    pub fn combined_text(&self) -> String {
        let mut text = self.out.text();
        text.push_str(&self.err.text());
        text
    }

    /// `say` against stdout.
    pub fn say(&self, pattern: &Regex) -> bool {
        self.out.say(pattern)
    }

    /// `say` against stderr.
    pub fn say_err(&self, pattern: &Regex) -> bool {
        self.err.say(pattern)
    }

    /// Exit code if the process has terminated.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_rx.borrow()
    }

    /// Wait for the process to terminate, at most `timeout`.
    pub async fn wait_for_exit(&self, timeout: Duration) -> HarnessResult<i32> {
        let started = Instant::now();
        let mut exit_rx = self.exit_rx.clone();

        match tokio::time::timeout(timeout, exit_rx.wait_for(Option::is_some)).await {
            Ok(Ok(code)) => Ok((*code).unwrap_or(SIGNALED_EXIT_CODE)),
            // the waiter task is gone without publishing: nothing left to wait for
            Ok(Err(_)) => Ok(self.exit_code().unwrap_or(SIGNALED_EXIT_CODE)),
            Err(_) => Err(HarnessError::timeout(
                format!("'{}' to exit", self.label),
                started.elapsed(),
                1,
                Some(self.output_tail()),
            )),
        }
    }

    /// Wait for exit and require `expected` as the exit code.
    pub async fn expect_exit(&self, timeout: Duration, expected: i32) -> HarnessResult<()> {
        let code = self.wait_for_exit(timeout).await?;
        if code == expected {
            Ok(())
        } else {
            Err(HarnessError::CommandFailed {
                command: self.label.clone(),
                code,
                output: self.output_tail(),
            })
        }
    }

    /// Force-terminate (SIGKILL). No-op once the process has exited.
    pub fn kill(&self) {
        self.termination_tx.send_replace(Some(Termination::Kill));
    }

    /// Ask the process to stop (SIGTERM). No-op once the process has exited.
    pub fn terminate(&self) {
        self.termination_tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(Termination::Terminate);
                true
            } else {
                false
            }
        });
    }

    /// Poll stdout until `pattern` appears past the read cursor.
    pub async fn eventually_say(&self, policy: &PollPolicy, pattern: &Regex) -> HarnessResult<()> {
        let what = format!("output of '{}' to match /{}/", self.label, pattern.as_str());
        let out = &self.out;
        eventually_true(&what, policy, move || async move { Ok::<_, Infallible>(out.say(pattern)) })
            .await
            .map_err(|e| self.attach_output(e))
    }

    /// Require that `pattern` never appears past the read cursor for the whole window.
    pub async fn consistently_not_say(&self, policy: &PollPolicy, pattern: &Regex) -> HarnessResult<u32> {
        let what = format!("output of '{}' to never match /{}/", self.label, pattern.as_str());
        let out = &self.out;
        consistently(
            &what,
            policy,
            move || async move { Ok::<_, Infallible>(out.say(pattern)) },
            |matched| !*matched,
        )
        .await
        .map_err(|e| self.attach_output(e))
    }

    fn output_tail(&self) -> String {
        let out = self.out.tail(DIAGNOSTIC_TAIL);
        let err = self.err.tail(DIAGNOSTIC_TAIL);
        if err.is_empty() {
            out
        } else {
            format!("{out}\n[stderr]\n{err}")
        }
    }

    fn attach_output(&self, error: HarnessError) -> HarnessError {
        match error {
            HarnessError::Timeout { what, elapsed, attempts, .. } => HarnessError::Timeout {
                what,
                elapsed,
                attempts,
                last_observed: Some(self.output_tail()),
            },
            HarnessError::AssertionViolation { what, at, attempts, .. } => HarnessError::AssertionViolation {
                what,
                at,
                attempts,
                observed: self.output_tail(),
            },
            other => other,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.exit_code().is_none() {
            self.kill();
        }
    }
}

/// Human-readable command line, used as the session label.
pub fn describe(command: &str, args: &[String]) -> String {
    std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

fn spawn_reader<R>(stream: Option<R>, buffer: Buffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Some(mut stream) = stream {
            let mut chunk = vec![0u8; READ_CHUNK];
            loop {
                match stream.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => buffer.append(&chunk[..n]),
                    Err(e) => {
                        tracing::debug!("Output stream read failed: {}", e);
                        break;
                    }
                }
            }
        }
        buffer.close();
    })
}

async fn supervise(
    mut child: Child,
    mut termination_rx: watch::Receiver<Option<Termination>>,
    readers: [JoinHandle<()>; 2],
    exit_tx: watch::Sender<Option<i32>>,
    label: String,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            changed = termination_rx.changed() => {
                if changed.is_err() {
                    // session dropped while running
                    let _ = child.start_kill();
                    break child.wait().await;
                }
                let requested = *termination_rx.borrow_and_update();
                match requested {
                    Some(Termination::Kill) => {
                        let _ = child.start_kill();
                    }
                    Some(Termination::Terminate) => send_terminate(&mut child),
                    None => {}
                }
            }
        }
    };

    for reader in readers {
        if tokio::time::timeout(READER_DRAIN_GRACE, reader).await.is_err() {
            tracing::debug!("Output of '{}' still open after exit; abandoning reader", label);
        }
    }

    let code = match status {
        Ok(status) => status.code().unwrap_or(SIGNALED_EXIT_CODE),
        Err(e) => {
            tracing::warn!("⚠️ Failed to wait for '{}': {}", label, e);
            SIGNALED_EXIT_CODE
        }
    };
    tracing::debug!("⏹️ '{}' exited with {}", label, code);
    exit_tx.send_replace(Some(code));
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::debug!("SIGTERM to {} failed: {}", pid, e);
        }
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sh(script: &str) -> HarnessResult<Session> {
        Session::start("sh", &["-c".to_string(), script.to_string()])
    }

    fn pattern(re: &str) -> Regex {
        Regex::new(re).unwrap()
    }

    #[tokio::test]
    async fn test_captures_stdout_stderr_and_exit_code() {
        let session = sh("echo hello; echo oops >&2; exit 3").unwrap();
        let code = session.wait_for_exit(Duration::from_secs(5)).await.unwrap();

        assert_eq!(code, 3);
        assert_eq!(session.exit_code(), Some(3));
        assert_eq!(session.out().text(), "hello\n");
        assert_eq!(session.err().text(), "oops\n");
        assert!(session.say_err(&pattern("oops")));
        assert!(session.out().is_closed());
    }

    #[tokio::test]
    async fn test_partial_output_visible_while_running() {
        let session = sh("echo first; sleep 30").unwrap();
        let policy = PollPolicy::new(Duration::from_secs(5), Duration::from_millis(20)).unwrap();

        session.eventually_say(&policy, &pattern("first")).await.unwrap();
        assert_eq!(session.exit_code(), None);

        session.kill();
        let code = session.wait_for_exit(Duration::from_secs(5)).await.unwrap();
        assert_eq!(code, SIGNALED_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_launch_failure() {
        let result = Session::start("definitely-not-a-real-binary-1234", &[]);
        assert_matches!(result, Err(HarnessError::LaunchFailure { command, .. }) if command == "definitely-not-a-real-binary-1234");
    }

    #[tokio::test]
    async fn test_kill_is_idempotent_after_exit() {
        let session = sh("exit 0").unwrap();
        assert_eq!(session.wait_for_exit(Duration::from_secs(5)).await.unwrap(), 0);

        session.kill();
        session.kill();
        session.terminate();
        assert_eq!(session.exit_code(), Some(0));
    }

    #[tokio::test]
    async fn test_terminate_sends_sigterm() {
        let session = sh("trap 'echo stopping; exit 7' TERM; echo ready; while true; do sleep 0.05; done").unwrap();
        let policy = PollPolicy::new(Duration::from_secs(5), Duration::from_millis(20)).unwrap();
        session.eventually_say(&policy, &pattern("ready")).await.unwrap();

        session.terminate();
        assert_eq!(session.wait_for_exit(Duration::from_secs(5)).await.unwrap(), 7);
        assert!(session.out().text().contains("stopping"));
    }

    #[tokio::test]
    async fn test_wait_for_exit_times_out_with_output() {
        let session = sh("echo still-going; sleep 30").unwrap();
        let policy = PollPolicy::new(Duration::from_secs(5), Duration::from_millis(20)).unwrap();
        session.eventually_say(&policy, &pattern("still-going")).await.unwrap();

        let result = session.wait_for_exit(Duration::from_millis(50)).await;
        assert_matches!(
            result,
            Err(HarnessError::Timeout { last_observed: Some(output), .. }) if output.contains("still-going")
        );
    }

    #[test]
    fn test_say_advances_the_cursor() {
        let session = Session::finished("cf logs", "MSG-A\nMSG-B\nMSG-A\n", "", 0);

        assert!(session.say(&pattern("MSG-B")));
        assert!(session.say(&pattern("MSG-A")));
        // both A lines consumed now
        assert!(!session.say(&pattern("MSG-A")));
        assert!(!session.say(&pattern("MSG-B")));
        assert_eq!(session.contents(), b"MSG-A\nMSG-B\nMSG-A\n".to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn test_consistently_not_say_reports_output_on_violation() {
        let session = Session::finished("cf logs listener", "RANDOM-MESSAGE-B\n", "", 0);
        let policy = PollPolicy::new(Duration::from_secs(10), Duration::from_millis(100)).unwrap();

        let result = session.consistently_not_say(&policy, &pattern("RANDOM-MESSAGE-B")).await;
        assert_matches!(
            result,
            Err(HarnessError::AssertionViolation { attempts: 1, observed, .. }) if observed.contains("RANDOM-MESSAGE-B")
        );
    }

    #[test]
    fn test_describe_joins_arguments() {
        assert_eq!(describe("cf", &["logs".to_string(), "app".to_string()]), "cf logs app");
        assert_eq!(describe("cf", &[]), "cf");
    }
}
