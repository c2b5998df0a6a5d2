//! External diagnostic-command boundary
//!
//! Every hardware fact in this harness comes from an external tool (`lscpu`,
//! `dmidecode`, `nvme`, `lspci`, `ipmitool`, `nvidia-smi`, `nvbandwidth`,
//! plus the mount lifecycle commands). This module is the only place that
//! spawns processes: collectors and the mount manager go through the
//! [`CommandRunner`] trait so they can run against captured fixture output in
//! tests without touching real hardware.

use crate::error::{Result, ServerCheckError};
use std::collections::HashMap;
use std::process::Command;
use std::sync::mpsc;
use std::sync::Mutex;
use std::time::Duration;

/// Default bound on any single external tool invocation.
///
/// The GPU bandwidth benchmark dominates; everything else finishes in
/// well under a second.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 300;

/// Captured output of one external command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit status code (-1 when terminated by signal)
    pub status: i32,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited zero
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Abstraction over external command execution
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output.
    ///
    /// Errors distinguish a missing binary ([`ServerCheckError::ToolMissing`])
    /// from a hung one ([`ServerCheckError::ToolTimeout`]); a non-zero exit
    /// is NOT an error at this layer since some callers inspect partial
    /// output.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Run a command and require a zero exit status.
    fn run_checked(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run(program, args)?;
        if output.success() {
            Ok(output)
        } else {
            Err(ServerCheckError::ToolFailed {
                command: render_command(program, args),
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
    }
}

fn render_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Live command runner with a watchdog bound on every invocation
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    /// Create a runner with the given per-command timeout
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS))
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let rendered = render_command(program, args);
        tracing::debug!(command = %rendered, "running external tool");

        // The command runs on a helper thread; if it exceeds the bound the
        // thread is abandoned and the run continues. A hung diagnostic tool
        // must not hang the whole harness.
        let program_owned = program.to_string();
        let args_owned: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let result = Command::new(&program_owned).args(&args_owned).output();
            // Receiver may have timed out and dropped
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(output)) => Ok(CommandOutput {
                status: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ServerCheckError::ToolMissing(program.to_string()))
            }
            Ok(Err(e)) => Err(ServerCheckError::io(program, e)),
            Err(_) => Err(ServerCheckError::ToolTimeout {
                command: rendered,
                seconds: self.timeout.as_secs(),
            }),
        }
    }
}

/// Scripted runner replaying canned output, keyed by rendered command line.
///
/// Used by unit tests and available for dry runs against captured tool
/// output from another host.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: HashMap<String, CommandOutput>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    /// Create an empty scripted runner
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful invocation with the given stdout
    pub fn on_success(mut self, command: &str, stdout: &str) -> Self {
        self.responses.insert(
            command.to_string(),
            CommandOutput {
                status: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
        self
    }

    /// Script a failing invocation
    pub fn on_failure(mut self, command: &str, status: i32, stderr: &str) -> Self {
        self.responses.insert(
            command.to_string(),
            CommandOutput {
                status,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        );
        self
    }

    /// Commands invoked so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let rendered = render_command(program, args);
        self.calls.lock().unwrap().push(rendered.clone());
        match self.responses.get(&rendered) {
            Some(output) => Ok(output.clone()),
            None => Err(ServerCheckError::ToolMissing(rendered)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_runner_replays_output() {
        let runner = ScriptedRunner::new().on_success("lscpu", "Model name: AMD EPYC 7402\n");
        let output = runner.run("lscpu", &[]).unwrap();
        assert!(output.success());
        assert!(output.stdout.contains("EPYC"));
        assert_eq!(runner.calls(), vec!["lscpu".to_string()]);
    }

    #[test]
    fn test_scripted_runner_unknown_command_is_missing_tool() {
        let runner = ScriptedRunner::new();
        let err = runner.run("nvme", &["list"]).unwrap_err();
        assert!(matches!(err, ServerCheckError::ToolMissing(_)));
    }

    #[test]
    fn test_run_checked_surfaces_tool_failure() {
        let runner = ScriptedRunner::new().on_failure("nvme list", 1, "NVMe device not found");
        let err = runner.run_checked("nvme", &["list"]).unwrap_err();
        match err {
            ServerCheckError::ToolFailed { status, stderr, .. } => {
                assert_eq!(status, 1);
                assert!(stderr.contains("not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_system_runner_captures_stdout() {
        let runner = SystemRunner::default();
        let output = runner.run("echo", &["hello"]).unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn test_system_runner_missing_binary() {
        let runner = SystemRunner::default();
        let err = runner
            .run("definitely-not-a-real-binary-xyz", &[])
            .unwrap_err();
        assert!(matches!(err, ServerCheckError::ToolMissing(_)));
    }

    #[test]
    fn test_system_runner_timeout() {
        let runner = SystemRunner::new(Duration::from_millis(50));
        let err = runner.run("sleep", &["5"]).unwrap_err();
        assert!(matches!(err, ServerCheckError::ToolTimeout { .. }));
    }
}
