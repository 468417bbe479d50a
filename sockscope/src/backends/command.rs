// External command execution bounded by a cancellation token
//
// lsof and nettop can stall (NFS mounts, TCC prompts). Output is drained on
// reader threads so a chatty child never blocks on a full pipe while we poll.

use crate::cancel::CancelToken;
use crate::error::Error;
use anyhow::{Context, Result};
use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Check if a command exists on PATH
pub fn command_exists(program: &str) -> bool {
    Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Run `program args...` to completion unless `cancel` fires first.
///
/// On cancellation the child is killed and `Error::Cancelled` is returned.
/// A non-zero exit status is not an error here; callers decide.
pub fn run_command(program: &str, args: &[&str], cancel: &CancelToken) -> Result<Output> {
    cancel.check()?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to execute {}", program))?;

    let stdout_reader = child.stdout.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    });
    let stderr_reader = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    });

    let status = loop {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("Failed to wait for {}", program))?
        {
            break status;
        }

        if cancel.is_cancelled() {
            log::debug!("Killing {} (cancelled)", program);
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Cancelled.into());
        }

        thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    let stderr = stderr_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();

    Ok(Output {
        status,
        stdout,
        stderr,
    })
}
