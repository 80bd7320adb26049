//! Timeout-bounded execution of external programs.
//!
//! Every converter, compiler and OCR call goes through [`ExternalCommand`]
//! so that each one has an explicit wall-clock limit. The child is spawned
//! with `kill_on_drop`, so when the timeout fires the dropped future takes
//! the process down with it instead of leaving it running.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("I/O error while running '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of a finished process.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// An external program invocation with a hard timeout.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: String,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    stdin: Option<Vec<u8>>,
    timeout: Duration,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            stdin: None,
            timeout,
        }
    }

    /// Build from an argv-style list (`["python3", "ocr.py"]`).
    /// Returns `None` for an empty list.
    pub fn from_argv(argv: &[String], timeout: Duration) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        Some(Self::new(program.clone(), timeout).args(rest))
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn stdin(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(bytes.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run to completion or until the timeout expires.
    ///
    /// A non-zero exit is *not* an error here; callers inspect
    /// [`CommandOutput::success`] and decide.
    pub async fn run(self) -> Result<CommandOutput, CommandError> {
        let start = Instant::now();
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Feed stdin from a separate task so a chatty child cannot deadlock
        // on a full stdout pipe while we are still writing.
        let writer = match (child.stdin.take(), self.stdin) {
            (Some(mut pipe), Some(bytes)) => Some(tokio::spawn(async move {
                let res = pipe.write_all(&bytes).await;
                drop(pipe);
                res
            })),
            _ => None,
        };

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CommandError::Timeout {
                program: self.program.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| CommandError::Io {
                program: self.program.clone(),
                source,
            })?;

        if let Some(handle) = writer {
            // A child that exits without draining stdin yields a broken
            // pipe here; its exit status already says what happened.
            if let Ok(Err(e)) = handle.await {
                debug!("stdin write to '{}' ended early: {}", self.program, e);
            }
        }

        debug!(
            "'{}' exited with {} after {}ms",
            self.program,
            output.status,
            start.elapsed().as_millis()
        );

        Ok(CommandOutput {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Last `n` lines of `text`, joined with newlines.
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
