// src/resize/process.rs
//
// Subprocess execution for resize batches.

use super::builder::ResizeCommand;
use crate::error::ResizeServerError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

/// Time a terminated process gets to exit before it is killed outright.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// How a batch process ended.
#[derive(Debug)]
pub enum ProcessExit {
    Exited(i32),
    /// Ended after a terminate request or by a signal
    Terminated,
    SpawnFailed(ResizeServerError),
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        matches!(self, ProcessExit::Exited(0))
    }
}

/// Starts a command and resolves once it has exited.
///
/// `terminate` fires when the scheduler wants the process gone; the runner
/// keeps waiting for the actual exit afterwards.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: ResizeCommand, terminate: oneshot::Receiver<()>) -> ProcessExit;
}

/// Runs commands directly (argument vector, no shell) through
/// `tokio::process`.
#[derive(Clone, Debug)]
pub struct SystemProcessRunner {
    grace: Duration,
}

impl Default for SystemProcessRunner {
    fn default() -> Self {
        Self {
            grace: TERMINATE_GRACE,
        }
    }
}

impl SystemProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, command: ResizeCommand, mut terminate: oneshot::Receiver<()>) -> ProcessExit {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                let err = ResizeServerError::process_spawn_failed(command.program, err.to_string());
                tracing::error!(error = %err, "failed to start resize process");
                return ProcessExit::SpawnFailed(err);
            }
        };

        let status = tokio::select! {
            status = child.wait() => status,
            Ok(()) = &mut terminate => {
                send_terminate(&child);
                match tokio::time::timeout(self.grace, child.wait()).await {
                    Ok(status) => status,
                    Err(_) => {
                        tracing::warn!(program = %command.program, "resize process ignored terminate, killing");
                        let _ = child.start_kill();
                        child.wait().await
                    }
                }
            }
        };

        match status {
            Ok(status) => match status.code() {
                Some(code) => ProcessExit::Exited(code),
                None => ProcessExit::Terminated,
            },
            Err(err) => {
                tracing::error!(program = %command.program, error = %err, "failed to wait for resize process");
                ProcessExit::Terminated
            }
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &Child) {
    let Some(pid) = child.id() else {
        return;
    };
    // SAFETY: kill(2) with a pid we spawned and have not reaped yet
    let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if result != 0 {
        tracing::debug!(pid, "SIGTERM delivery failed");
    }
}

#[cfg(not(unix))]
fn send_terminate(_child: &Child) {
    // no soft signal; the grace timeout escalates to a hard kill
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ResizeCommand {
        ResizeCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: None,
        }
    }

    #[tokio::test]
    async fn reports_exit_code() {
        let (_tx, rx) = oneshot::channel();
        assert!(matches!(
            SystemProcessRunner::new().run(sh("exit 0"), rx).await,
            ProcessExit::Exited(0)
        ));

        let (_tx, rx) = oneshot::channel();
        let exit = SystemProcessRunner::new().run(sh("exit 3"), rx).await;
        assert!(matches!(exit, ProcessExit::Exited(3)));
        assert!(!exit.success());
    }

    #[tokio::test]
    async fn dropped_terminate_sender_does_not_stop_process() {
        let (tx, rx) = oneshot::channel::<()>();
        drop(tx);
        assert!(matches!(
            SystemProcessRunner::new().run(sh("sleep 0.1; exit 0"), rx).await,
            ProcessExit::Exited(0)
        ));
    }

    #[tokio::test]
    async fn terminate_stops_long_running_process() {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move { SystemProcessRunner::new().run(sh("sleep 30"), rx).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(()).unwrap();

        let exit = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!exit.success());
    }

    #[tokio::test]
    async fn runs_inside_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut command = sh("touch marker");
        command.working_dir = Some(dir.path().to_path_buf());
        let (_tx, rx) = oneshot::channel();

        assert!(SystemProcessRunner::new().run(command, rx).await.success());
        assert!(dir.path().join("marker").is_file());
    }

    #[tokio::test]
    async fn missing_program_reports_spawn_failure() {
        let command = ResizeCommand {
            program: "/nonexistent/resize-tool".to_string(),
            args: Vec::new(),
            working_dir: None,
        };
        let (_tx, rx) = oneshot::channel();
        match SystemProcessRunner::new().run(command, rx).await {
            ProcessExit::SpawnFailed(err) => {
                assert!(matches!(err, ResizeServerError::ProcessSpawnFailed { .. }));
                assert!(err.to_string().contains("/nonexistent/resize-tool"));
            }
            other => panic!("expected spawn failure, got {other:?}"),
        }
    }
}
