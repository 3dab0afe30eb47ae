//! Child process execution with captured diagnostics.
//!
//! duplicity runs synchronously to completion. stderr is always drained
//! line-by-line into an in-memory buffer so a failing run can be
//! reported with everything it printed; stdout is either forwarded to
//! the terminal (interactive operations) or captured (read-style
//! operations such as collection status).

use bon::Builder;
use getset::Getters;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use tracing::warn;

/// Program name resolved through PATH unless overridden
pub static DEFAULT_PROGRAM: &str = "duplicity";

/// Outcome of one child process invocation.
///
/// Callers must handle all three variants; failure is data, not
/// control flow.
#[derive(Debug)]
pub enum ExecutionResult {
    Success {
        stdout: String,
    },
    /// Non-zero exit: drained stderr plus the exact argument vector used,
    /// so the invocation can be reproduced from the report alone.
    Failure {
        stderr: String,
        argv: Vec<String>,
    },
    /// The executable could not be launched at all
    StartFailure {
        program: PathBuf,
        source: std::io::Error,
    },
}

/// Where the child's standard output goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StdoutMode {
    Inherit,
    Capture,
}

pub trait Runner {
    fn run(&self, argv: &[String], stdout: StdoutMode) -> ExecutionResult;
}

#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct DuplicityRunner {
    #[builder(into, default = PathBuf::from(DEFAULT_PROGRAM))]
    program: PathBuf,
}

impl Default for DuplicityRunner {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Runner for DuplicityRunner {
    fn run(&self, argv: &[String], stdout: StdoutMode) -> ExecutionResult {
        let mut command = Command::new(&self.program);
        command
            .args(argv)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .stdout(match stdout {
                StdoutMode::Inherit => Stdio::inherit(),
                StdoutMode::Capture => Stdio::piped(),
            });

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                return ExecutionResult::StartFailure {
                    program: self.program.clone(),
                    source,
                }
            }
        };

        let stderr_thread = child.stderr.take().map(|pipe| {
            thread::spawn(move || {
                let mut captured = String::new();
                for line in BufReader::new(pipe).lines() {
                    match line {
                        Ok(line) => {
                            captured.push_str(&line);
                            captured.push('\n');
                        }
                        Err(_) => break,
                    }
                }
                captured
            })
        });

        let mut captured_stdout = String::new();
        if let Some(mut pipe) = child.stdout.take() {
            if let Err(e) = pipe.read_to_string(&mut captured_stdout) {
                warn!("could not read child stdout: {e}");
            }
        }

        let status = match child.wait() {
            Ok(status) => status,
            Err(source) => {
                return ExecutionResult::StartFailure {
                    program: self.program.clone(),
                    source,
                }
            }
        };
        let stderr = stderr_thread
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if status.success() {
            ExecutionResult::Success {
                stdout: captured_stdout,
            }
        } else {
            ExecutionResult::Failure {
                stderr,
                argv: argv.to_vec(),
            }
        }
    }
}
