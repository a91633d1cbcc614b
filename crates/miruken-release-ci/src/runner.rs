//! External command execution.

use async_trait::async_trait;
use miruken_release_core::domain::secret::redact_all;
use miruken_release_core::{CommandFailure, ReleaseError, Result, SecretValue};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lines of stderr kept in a `CommandFailed` report.
pub const STDERR_TAIL_LINES: usize = 20;

/// A command line plus the context it runs in.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,

    pub args: Vec<String>,

    /// Working directory; inherits the caller's when unset.
    pub cwd: Option<PathBuf>,

    /// Extra environment variables.
    pub env: Vec<(String, String)>,

    /// Environment variables whose values are redacted from all output.
    pub secret_env: Vec<(String, SecretValue)>,

    /// Further values redacted from all output.
    pub redactions: Vec<SecretValue>,

    /// Kill the process after this long.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Run `script` through `sh -c`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn secret_env(mut self, key: impl Into<String>, value: SecretValue) -> Self {
        self.secret_env.push((key.into(), value));
        self
    }

    /// Redact `secret` from output and errors without passing it to the process.
    pub fn redact(mut self, secret: SecretValue) -> Self {
        self.redactions.push(secret);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Human-readable command line. Environment values are never included.
    pub fn render(&self) -> String {
        if self.program == "sh" && self.args.len() == 2 && self.args[0] == "-c" {
            return self.args[1].trim().to_string();
        }
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn secrets(&self) -> Vec<SecretValue> {
        self.secret_env
            .iter()
            .map(|(_, v)| v.clone())
            .chain(self.redactions.iter().cloned())
            .collect()
    }
}

/// Captured result of a process that ran to completion.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn passed(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last [`STDERR_TAIL_LINES`] lines of stderr.
    pub fn stderr_tail(&self) -> String {
        stderr_tail(&self.stderr)
    }
}

pub(crate) fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Runs external commands for the release steps.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run to completion and return stdout with trailing whitespace trimmed.
    ///
    /// A launch failure, timeout or non-zero exit is `CommandFailed`.
    async fn run(&self, spec: &CommandSpec) -> Result<String>;
}

/// Output collected from a child pipe as it arrives, so a timed out
/// command still reports what it wrote.
#[derive(Clone, Default)]
struct OutputBuffer(Arc<Mutex<Vec<u8>>>);

impl OutputBuffer {
    fn drain<R>(&self, mut pipe: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = self.0.clone();
        tokio::spawn(async move {
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buffer
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]),
                }
            }
        })
    }

    fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Executes commands as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Spawn the command and wait for it, honouring the timeout.
    pub async fn execute(spec: &CommandSpec) -> Result<CommandOutput> {
        let start = Instant::now();
        let rendered = spec.render();
        let secrets = spec.secrets();

        let failed = |failure: CommandFailure, stderr: &str| ReleaseError::CommandFailed {
            command: redact_all(&secrets, &rendered),
            failure,
            stderr_tail: redact_all(&secrets, &stderr_tail(stderr)),
        };

        if spec.program.is_empty() {
            return Err(failed(
                CommandFailure::Launch("empty command".to_string()),
                "",
            ));
        }

        debug!(command = %redact_all(&secrets, &rendered), "Running command");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        for (key, value) in &spec.secret_env {
            command.env(key, value.expose());
        }

        let mut child = command
            .spawn()
            .map_err(|e| failed(CommandFailure::Launch(e.to_string()), ""))?;

        let stdout = OutputBuffer::default();
        let stderr = OutputBuffer::default();
        let readers = [
            child.stdout.take().map(|pipe| stdout.drain(pipe)),
            child.stderr.take().map(|pipe| stderr.drain(pipe)),
        ];

        let waited = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "Failed to kill timed out command");
                    }
                    // Descendants may still hold the pipes open.
                    for reader in readers.iter().flatten() {
                        reader.abort();
                    }
                    return Err(failed(
                        CommandFailure::TimedOut { after: limit },
                        &stderr.contents(),
                    ));
                }
            },
            None => child.wait().await,
        };
        let status = waited.map_err(|e| failed(CommandFailure::Launch(e.to_string()), ""))?;

        for reader in readers.into_iter().flatten() {
            let _ = reader.await;
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        Ok(CommandOutput {
            exit_code: status.code(),
            stdout: redact_all(&secrets, &stdout.contents()),
            stderr: redact_all(&secrets, &stderr.contents()),
            duration_ms,
        })
    }
}

#[async_trait]
impl CommandExecutor for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<String> {
        let output = Self::execute(spec).await?;
        let rendered = redact_all(&spec.secrets(), &spec.render());

        if !output.passed() {
            let failure = match output.exit_code {
                Some(code) => CommandFailure::ExitCode(code),
                None => CommandFailure::Terminated,
            };
            return Err(ReleaseError::CommandFailed {
                command: rendered,
                failure,
                stderr_tail: output.stderr_tail(),
            });
        }

        info!(
            command = %rendered,
            duration_ms = output.duration_ms,
            "Command completed"
        );
        if !output.stdout.trim().is_empty() {
            debug!(stdout = %output.stdout.trim_end(), "Command output");
        }

        Ok(output.stdout.trim_end().to_string())
    }
}
