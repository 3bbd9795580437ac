//! Subprocess execution.
//!
//! Two entry points: [`run_program`] spawns a binary with an explicit
//! argument vector (no shell involved), [`run_shell`] hands a whole command
//! line to the platform shell. Both capture output, trim trailing whitespace
//! from stdout on success, and turn a non-zero exit into
//! [`BridgeError::Action`] carrying stderr.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::{BridgeError, Result};

/// Run `program` with `args`, optionally in `cwd`, bounded by `timeout`.
pub async fn run_program(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<String> {
    debug!(program, args = ?args, "Running program");

    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let label = if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    };
    execute(command, &label, timeout).await
}

/// Run a full command line through `sh -c` (`cmd /C` on Windows).
pub async fn run_shell(
    command_line: &str,
    cwd: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<String> {
    debug!(command = command_line, "Running shell command");

    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command_line);
        c
    };
    command.kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    execute(command, command_line, timeout).await
}

/// Platform-specific name for tools that ship as `.cmd` shims on Windows
/// (`npm`, `npx`).
pub fn script_program(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.cmd", name)
    } else {
        name.to_string()
    }
}

/// Quote `value` for safe inclusion in a POSIX shell line.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

async fn execute(mut command: Command, label: &str, timeout: Option<Duration>) -> Result<String> {
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, command.output())
            .await
            .map_err(|_| {
                BridgeError::Timeout(format!(
                    "Command '{}' timed out after {}s",
                    label,
                    limit.as_secs()
                ))
            })?,
        None => command.output().await,
    }
    .map_err(|e| BridgeError::action(format!("Failed to run '{}': {}", label, e)))?;

    into_result(output, label)
}

fn into_result(output: Output, label: &str) -> Result<String> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        Err(BridgeError::action(format!(
            "Command failed: {} ({})",
            label, output.status
        )))
    } else {
        Err(BridgeError::action(stderr))
    }
}
