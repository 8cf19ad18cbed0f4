//! External command execution.
//!
//! Every backend, installer, and host probe goes through [`CommandRunner`] so
//! a run can be replayed against scripted responses.
use crate::error::{BootstrapError, Result};
use std::process::Command;
use std::time::Instant;

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// One-line failure description: first stderr line, else first stdout
    /// line, else the exit status.
    pub fn detail(&self) -> String {
        let first_line = |text: &str| {
            text.trim()
                .lines()
                .next()
                .map(str::to_string)
                .filter(|line| !line.is_empty())
        };
        first_line(&self.stderr)
            .or_else(|| first_line(&self.stdout))
            .unwrap_or_else(|| match self.status {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            })
    }
}

/// Runs an argv vector and captures its output.
pub trait CommandRunner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput>;
}

/// Runs commands on the local host.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| BootstrapError::Config("empty command line".to_string()))?;
        let start = Instant::now();
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| BootstrapError::Spawn {
                program: program.clone(),
                source,
            })?;
        let elapsed_ms = start.elapsed().as_millis();

        tracing::debug!(
            elapsed_ms,
            command = %argv.join(" "),
            status = ?output.status.code(),
            stdout_bytes = output.stdout.len(),
            "command complete"
        );

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Split a configured command template and append call-specific arguments.
pub fn command_line<I, S>(template: &str, extra: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut argv = shell_words::split(template)
        .map_err(|err| BootstrapError::Config(format!("parse command {template:?}: {err}")))?;
    if argv.is_empty() {
        return Err(BootstrapError::Config("command template is empty".to_string()));
    }
    argv.extend(extra.into_iter().map(Into::into));
    Ok(argv)
}

/// Program name of a command template, used for PATH lookups.
pub fn template_program(template: &str) -> Result<String> {
    command_line(template, std::iter::empty::<String>()).map(|mut argv| argv.swap_remove(0))
}
