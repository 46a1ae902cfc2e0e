//! External command execution -- the one place child processes are spawned
//! synchronously (the concurrent batch coordinator spawns its own).

use anyhow::{Context, Result};
use tracing::debug;

pub mod diag;

/// A fully-formed external command invocation: program plus argument list.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Wrap a whole shell line.
    pub fn shell(line: impl Into<String>) -> Self {
        Self::new("/bin/sh", vec!["-c".into(), line.into()])
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of one completed child process.
#[derive(Debug)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a command to completion, capturing both output streams as text.
/// No retry, no timeout -- any duration bound must be baked into the
/// invocation's own arguments.
pub async fn run_capture(inv: &Invocation) -> Result<CommandOutput> {
    debug!(cmd = %inv, "spawning");
    let output = tokio::process::Command::new(&inv.program)
        .args(&inv.args)
        .output()
        .await
        .with_context(|| format!("failed to execute {}", inv.program))?;

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a command with the child inheriting our output streams.
/// Both captured strings are empty by contract.
pub async fn run_inherit(inv: &Invocation) -> Result<CommandOutput> {
    debug!(cmd = %inv, "spawning (inherit)");
    let status = tokio::process::Command::new(&inv.program)
        .args(&inv.args)
        .status()
        .await
        .with_context(|| format!("failed to execute {}", inv.program))?;

    Ok(CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout: String::new(),
        stderr: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn capture_returns_stdout_and_exit_code() {
        let inv = Invocation::new("/bin/sh", vec!["-c".into(), "printf hello; exit 3".into()]);
        let out = run_capture(&inv).await.unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout, "hello");
        assert!(!out.success());
    }

    #[tokio::test]
    async fn capture_fails_for_missing_program() {
        let inv = Invocation::new("/nonexistent/definitely-not-a-binary", vec![]);
        assert!(run_capture(&inv).await.is_err());
    }

    #[tokio::test]
    async fn inherit_reports_the_exit_code_with_empty_streams() {
        let out = run_inherit(&Invocation::shell("exit 5")).await.unwrap();
        assert_eq!(out.exit_code, 5);
        assert!(out.stdout.is_empty());
        assert!(out.stderr.is_empty());
    }

    #[test]
    fn display_renders_a_shell_like_line() {
        let inv = Invocation::new("iperf3", vec!["-c".into(), "10.0.0.2".into(), "-J".into()]);
        assert_eq!(inv.to_string(), "iperf3 -c 10.0.0.2 -J");
    }
}
