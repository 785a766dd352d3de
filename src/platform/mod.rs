use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use wait_timeout::ChildExt;

#[derive(Debug, Clone)]
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

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("プロセス起動に失敗しました: {cmd}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },
    #[error("タイムアウトしました（{timeout:?}）: {cmd}")]
    Timeout { cmd: String, timeout: Duration },
    /// The process started, but waiting on it or reading its output failed.
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Runs `cmd args...` with stdin closed, collecting stdout/stderr.
///
/// Both pipes are drained on background threads while waiting, so a child
/// that writes more than the pipe buffer cannot stall until the timeout.
pub fn run_command(
    cmd: &str,
    args: &[&str],
    timeout: Duration,
) -> std::result::Result<CommandOutput, CommandError> {
    let mut command = Command::new(cmd);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|source| CommandError::Spawn {
        cmd: cmd.to_string(),
        source,
    })?;

    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let status = match child
        .wait_timeout(timeout)
        .with_context(|| format!("プロセス待機に失敗しました: {cmd}"))?
    {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            // Grandchildren may still hold the pipes open; the readers are
            // left detached and exit once the last writer goes away.
            drop(stdout_reader);
            drop(stderr_reader);
            return Err(CommandError::Timeout {
                cmd: cmd.to_string(),
                timeout,
            });
        }
    };

    let stdout = join_reader(stdout_reader)
        .with_context(|| format!("標準出力の読み取りに失敗しました: {cmd}"))?;
    let stderr = join_reader(stderr_reader).unwrap_or_default();

    Ok(CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<std::io::Result<String>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

fn join_reader(handle: Option<thread::JoinHandle<std::io::Result<String>>>) -> Result<String> {
    let Some(handle) = handle else {
        return Ok(String::new());
    };
    handle
        .join()
        .map_err(|_| anyhow!("出力読み取りスレッドが異常終了しました"))?
        .map_err(Into::into)
}
