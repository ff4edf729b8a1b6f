use std::collections::VecDeque;
use std::process::Stdio;

use kind_defs::BackendError;
use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

/// Only the tail of stderr is kept for error reporting.
const MAX_STDERR_LINES: usize = 50;

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn stdout_lines(&self) -> Vec<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect()
    }
}

pub enum Input {
    Null,
    Bytes(Vec<u8>),
    File(std::fs::File),
}

pub fn command(program: &str, args: &[&str]) -> Command {
    let mut exec = Command::new(program);
    exec.args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    exec
}

pub fn describe(exec: &Command) -> String {
    let inner = exec.as_std();
    std::iter::once(inner.get_program())
        .chain(inner.get_args())
        .map(|s| s.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs `exec` to completion. A non-zero exit becomes
/// [`BackendError::CommandFailed`] carrying the tail of stderr.
pub async fn run_command(exec: &mut Command, input: Input) -> Result<CommandOutput, BackendError> {
    let description = describe(exec);
    debug!("Running `{}`", description);

    let payload = match input {
        Input::Null => {
            exec.stdin(Stdio::null());
            None
        }
        Input::Bytes(bytes) => {
            exec.stdin(Stdio::piped());
            Some(bytes)
        }
        Input::File(file) => {
            exec.stdin(Stdio::from(file));
            None
        }
    };

    let mut child = exec.spawn()?;

    // Fed from its own task so a full stdout pipe cannot stall the write.
    let writer = match (payload, child.stdin.take()) {
        (Some(bytes), Some(mut stdin)) => Some(tokio::spawn(async move {
            let result = stdin.write_all(&bytes).await;
            drop(stdin);
            result
        })),
        _ => None,
    };

    let stdout = child.stdout.take().ok_or_else(|| BackendError::UnexpectedOutput {
        command: description.clone(),
        detail: "stdout was not captured".to_string(),
    })?;
    let stderr = child.stderr.take().ok_or_else(|| BackendError::UnexpectedOutput {
        command: description.clone(),
        detail: "stderr was not captured".to_string(),
    })?;

    let mut stdout_reader = BufReader::new(stdout).lines();
    let mut stderr_reader = BufReader::new(stderr).lines();

    let mut stdout_lines = Vec::new();
    let mut last_stderr_lines = VecDeque::new();

    let mut stdout_done = false;
    let mut stderr_done = false;

    while !stdout_done || !stderr_done {
        tokio::select! {
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => stdout_lines.push(line),
                    Ok(None) => stdout_done = true,
                    Err(e) => {
                        warn!("Error reading stdout of `{}`: {}", description, e);
                        stdout_done = true;
                    }
                }
            },
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        last_stderr_lines.push_back(line);
                        if last_stderr_lines.len() > MAX_STDERR_LINES {
                            last_stderr_lines.pop_front();
                        }
                    }
                    Ok(None) => stderr_done = true,
                    Err(e) => {
                        warn!("Error reading stderr of `{}`: {}", description, e);
                        stderr_done = true;
                    }
                }
            },
        }
    }

    let status = child.wait().await?;

    if let Some(writer) = writer {
        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to write stdin of `{}`: {}", description, e),
            Err(e) => warn!("Stdin writer of `{}` did not complete: {}", description, e),
        }
    }

    let stderr_text = last_stderr_lines
        .iter()
        .fold(String::new(), |acc, line| acc + line.as_str() + "\n");
    let stdout_text = stdout_lines
        .iter()
        .fold(String::new(), |acc, line| acc + line.as_str() + "\n");

    if !status.success() {
        return Err(BackendError::CommandFailed {
            command: description,
            code: status.code(),
            stderr: stderr_text.trim().to_string(),
        });
    }

    Ok(CommandOutput {
        stdout: stdout_text,
        stderr: stderr_text,
    })
}
