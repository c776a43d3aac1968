use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use indexmap::IndexMap;
use log::{debug, error, info};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::auth::Token;
use crate::error::{MigrafixError, Result};

/// A fully described external command.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: IndexMap<String, String>,
    secrets: Vec<Token>,
    label: Option<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: IndexMap::new(),
            secrets: Vec::new(),
            label: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn envs(mut self, overlay: &IndexMap<String, String>) -> Self {
        self.env
            .extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Marks a secret that must never appear in logs or error messages.
    #[must_use]
    pub fn masking(mut self, secret: Option<&Token>) -> Self {
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            self.secrets.push(secret.clone());
        }
        self
    }

    /// Names the operation explicitly when the leading arguments are options.
    #[must_use]
    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Short label naming the operation, e.g. `git clone`.
    pub fn operation(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match self.args.first() {
            Some(first) => format!("{} {}", self.program, first),
            None => self.program.clone(),
        }
    }

    fn masked(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| secret.mask(&acc))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        f.write_str(&self.masked(&line))
    }
}

/// Structured result of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was terminated by a signal
    pub code: Option<i32>,
    /// Captured stdout followed by captured stderr
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The last `lines` lines of captured output.
    pub fn tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.output.lines().collect();
        all[all.len().saturating_sub(lines)..].join("\n")
    }
}

/// Runs external commands to completion, one at a time.
///
/// Environment changes travel on the [`Invocation`] as an overlay; the
/// process environment is never mutated.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Runs the invocation and waits for it to exit.
    ///
    /// Returns an error only when the command could not be started; a
    /// non-zero exit is reported through [`CommandOutput::code`].
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;

    /// Runs the invocation and treats a non-zero exit as fatal.
    async fn run_checked(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let output = self.run(invocation).await?;
        if output.success() {
            Ok(output)
        } else {
            error!(
                "{} failed; last output:\n{}",
                invocation.operation(),
                output.tail(20)
            );
            Err(MigrafixError::CommandFailed {
                operation: invocation.operation(),
                code: output.code,
            })
        }
    }
}

/// Spawns real processes and forwards their output live.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        info!("Running: {invocation}");
        if !invocation.env.is_empty() {
            debug!(
                "Environment overlay: {}",
                invocation.masked(&format!("{:?}", invocation.env))
            );
        }

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|source| MigrafixError::CommandSpawn {
            operation: invocation.operation(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (stdout, stderr, status) = futures::try_join!(
            forward_lines(stdout, invocation, false),
            forward_lines(stderr, invocation, true),
            child.wait(),
        )?;

        debug!("{} exited with {status}", invocation.operation());

        Ok(CommandOutput {
            code: status.code(),
            output: stdout + &stderr,
        })
    }
}

/// Echoes each line as soon as it is produced and returns everything read.
async fn forward_lines<R>(
    stream: Option<R>,
    invocation: &Invocation,
    to_stderr: bool,
) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return Ok(String::new());
    };

    let mut captured = String::new();
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let raw = String::from_utf8_lossy(&buf);
        let line = invocation.masked(raw.trim_end_matches(['\n', '\r']));
        if to_stderr {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
        captured.push_str(&line);
        captured.push('\n');
    }
    Ok(captured)
}
