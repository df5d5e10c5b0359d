use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use connector_core::EngineError;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// One `pulumi` invocation, run to completion.
pub(crate) struct Invocation<'a> {
    pub binary: &'a Path,
    pub args: Vec<String>,
    pub cwd: &'a Path,
    pub env: &'a BTreeMap<String, String>,
    /// Stack name attached to every forwarded output line.
    pub stack: &'a str,
}

impl Invocation<'_> {
    /// The command line as shown in errors, with the binary reduced to its
    /// file name.
    pub fn display(&self) -> String {
        let program = self
            .binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.binary.display().to_string());
        let mut line = program;
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Spawn, forward stdout to the log line by line, and fail with the
    /// captured stderr on a non-zero exit.
    pub async fn run(self) -> Result<(), EngineError> {
        let command = self.display();
        debug!(stack = self.stack, %command, "running");

        let mut cmd = Command::new(self.binary);
        cmd.args(&self.args)
            .current_dir(self.cwd)
            .envs(self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        let stderr_buf = Arc::new(Mutex::new(String::new()));
        let stderr_task = child.stderr.take().map(|stderr| {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    if let Ok(mut b) = buf.lock() {
                        if !b.is_empty() {
                            b.push('\n');
                        }
                        b.push_str(&line);
                    }
                }
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if !line.trim().is_empty() {
                    info!(stack = self.stack, "{line}");
                }
            }
        }

        let status = child.wait().await?;
        if let Some(task) = stderr_task {
            let _ = task.await;
        }
        if status.success() {
            return Ok(());
        }

        let stderr = stderr_buf
            .lock()
            .map(|b| b.trim().to_string())
            .unwrap_or_default();
        let status = match status.code() {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        Err(EngineError::CommandFailed {
            command,
            status,
            stderr,
        })
    }
}
